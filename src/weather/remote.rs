//! OpenWeatherMap client.
//!
//! Wraps the 2.5 `weather` and `forecast` endpoints with rate limiting and
//! retry, and exposes them through the `RemoteWeatherSource` trait so the
//! resolver can be driven by any source.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::config::WeatherApiConfig;
use crate::weather::models::{CurrentConditions, ForecastSeries, WeatherQuery};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Source of live weather. `Ok(None)` means the API had nothing for the location.
#[async_trait]
pub trait RemoteWeatherSource: Send + Sync {
    async fn current_weather(&self, query: &WeatherQuery) -> Result<Option<CurrentConditions>>;

    async fn forecast_weather(&self, query: &WeatherQuery) -> Result<Option<ForecastSeries>>;
}

pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    limiter: Arc<Limiter>,
    max_retries: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

/// Failure of a single HTTP attempt, tagged with whether another attempt may help.
struct AttemptError {
    error: anyhow::Error,
    retryable: bool,
}

impl OpenWeatherClient {
    pub fn new(config: &WeatherApiConfig, api_key: SecretString) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("skycast/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            limiter: create_rate_limiter(config),
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, query), fields(lat = query.coord.lat, lon = query.coord.lon))]
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &WeatherQuery,
    ) -> Result<Option<T>> {
        let url = format!("{}/data/2.5/{endpoint}", self.base_url);
        let mut attempt = 0u32;

        loop {
            self.limiter.until_ready().await;

            match self.attempt::<T>(&url, query).await {
                Ok(value) => return Ok(value),
                Err(AttemptError { error, retryable }) => {
                    attempt += 1;

                    if !retryable {
                        return Err(error.context(format!("{endpoint} request failed, not retrying")));
                    }
                    if attempt > self.max_retries {
                        return Err(error.context(format!(
                            "{endpoint} request failed after {} retries",
                            self.max_retries
                        )));
                    }

                    let backoff_ms = std::cmp::min(
                        self.backoff_base_ms.saturating_mul(2u64.saturating_pow(attempt - 1)),
                        self.backoff_max_ms,
                    );
                    warn!(
                        endpoint,
                        attempt,
                        backoff_ms,
                        error = %error,
                        "Weather API request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &WeatherQuery,
    ) -> std::result::Result<Option<T>, AttemptError> {
        let resp = self
            .http
            .get(url)
            .query(&[
                ("lat", query.coord.lat.to_string()),
                ("lon", query.coord.lon.to_string()),
                ("appid", self.api_key.expose_secret().to_string()),
                ("units", query.units.as_query().to_string()),
                ("lang", query.language.clone()),
            ])
            .send()
            .await
            .map_err(|e| AttemptError {
                // The request URL carries the API key.
                error: anyhow::anyhow!("HTTP error: {}", e.without_url()),
                retryable: true,
            })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url, "Weather API has no data for location");
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError {
                error: anyhow::anyhow!("Weather API {status}: {body}"),
                retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            });
        }

        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| AttemptError {
                error: anyhow::anyhow!("Deserialization error: {}", e.without_url()),
                retryable: false,
            })
    }
}

#[async_trait]
impl RemoteWeatherSource for OpenWeatherClient {
    async fn current_weather(&self, query: &WeatherQuery) -> Result<Option<CurrentConditions>> {
        self.get_json("weather", query).await
    }

    async fn forecast_weather(&self, query: &WeatherQuery) -> Result<Option<ForecastSeries>> {
        self.get_json("forecast", query).await
    }
}

fn create_rate_limiter(config: &WeatherApiConfig) -> Arc<Limiter> {
    let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);

    let quota = Quota::per_minute(per_minute).allow_burst(burst);
    Arc::new(RateLimiter::direct(quota))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::models::{Coordinates, UnitSystem};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> WeatherApiConfig {
        WeatherApiConfig {
            base_url: base_url.to_string(),
            timeout_seconds: 5,
            max_retries: 1,
            requests_per_minute: 600,
            burst_size: 50,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        }
    }

    fn client(server: &MockServer) -> OpenWeatherClient {
        OpenWeatherClient::new(&test_config(&server.uri()), SecretString::from("test-key".to_string()))
            .expect("client should build")
    }

    fn query() -> WeatherQuery {
        WeatherQuery::new(Coordinates::new(30.5, 32.25), "ar", UnitSystem::Imperial)
    }

    #[tokio::test]
    async fn test_current_weather_sends_query_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("lat", "30.5"))
            .and(query_param("lon", "32.25"))
            .and(query_param("appid", "test-key"))
            .and(query_param("units", "imperial"))
            .and(query_param("lang", "ar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "coord": {"lat": 30.5, "lon": 32.25},
                "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
                "main": {"temp": 71.2, "humidity": 80, "pressure": 1009},
                "clouds": {"all": 75},
                "wind": {"speed": 9.1, "deg": 220},
                "name": "Ismailia"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let current = client(&server)
            .current_weather(&query())
            .await
            .expect("request should succeed")
            .expect("payload should be present");

        assert_eq!(current.name, "Ismailia");
        assert_eq!(current.description(), Some("light rain"));
        assert_eq!(current.clouds.all, 75);
    }

    #[tokio::test]
    async fn test_forecast_weather_parses_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cod": "200",
                "cnt": 2,
                "list": [
                    {"dt": 1743465600, "main": {"temp": 20.1}, "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01n"}], "dt_txt": "2025-04-01 00:00:00"},
                    {"dt": 1743476400, "main": {"temp": 19.4}, "weather": [], "dt_txt": "2025-04-01 03:00:00"}
                ],
                "city": {"id": 361055, "name": "Ismailia", "coord": {"lat": 30.5, "lon": 32.25}, "country": "EG"}
            })))
            .mount(&server)
            .await;

        let series = client(&server)
            .forecast_weather(&query())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(series.list.len(), 2);
        assert_eq!(series.city.name, "Ismailia");
        assert_eq!(series.list[1].dt_txt, "2025-04-01 03:00:00");
    }

    #[tokio::test]
    async fn test_not_found_is_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(&server).current_weather(&query()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_server_error_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server).current_weather(&query()).await.unwrap_err();
        assert!(format!("{err:#}").contains("503"));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = test_config(&format!("http://127.0.0.1:{port}"));
        config.max_retries = 0;
        let client =
            OpenWeatherClient::new(&config, SecretString::from("SUPERSECRETKEY".to_string()))
                .unwrap();

        let err = client.current_weather(&query()).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("HTTP error"));
        assert!(!message.contains("SUPERSECRETKEY"));
        assert!(!message.contains("appid"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).forecast_weather(&query()).await.unwrap_err();
        assert!(format!("{err:#}").contains("not retrying"));
    }
}
