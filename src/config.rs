use std::path::Path;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;

use crate::weather::models::Coordinates;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub weather: WeatherApiConfig,
    pub connectivity: ConnectivityConfig,
    pub database: DatabaseConfig,
    pub location: LocationConfig,
    pub notifications: NotificationConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub requests_per_minute: u32,
    pub burst_size: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    /// How many home snapshots to keep; only the newest is ever read.
    pub home_history_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    pub default_lat: f64,
    pub default_lon: f64,
}

impl LocationConfig {
    /// Fallback used when no fix is available or location access is denied.
    pub fn default_coordinates(&self) -> Coordinates {
        Coordinates::new(self.default_lat, self.default_lon)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub webhook_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Secrets loaded exclusively from environment variables.
/// Not serializable, not stored in config files.
pub struct Secrets {
    pub openweather_api_key: Option<SecretString>,
    pub notify_webhook_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            openweather_api_key: std::env::var("OPENWEATHER_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::from),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config/default.toml, overlaying environment variables for secrets.
    pub fn load() -> Result<(Self, Secrets)> {
        Self::load_from(Path::new("config/default.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<(Self, Secrets)> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        let secrets = Secrets::from_env();

        Ok((config, secrets))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.weather.base_url.starts_with("http://")
            && !self.weather.base_url.starts_with("https://")
        {
            anyhow::bail!("weather.base_url must be an HTTP or HTTPS URL");
        }
        if self.weather.requests_per_minute == 0 {
            anyhow::bail!("weather.requests_per_minute must be greater than zero");
        }
        if !(-90.0..=90.0).contains(&self.location.default_lat)
            || !(-180.0..=180.0).contains(&self.location.default_lon)
        {
            anyhow::bail!("location default coordinates are out of range");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let contents = std::fs::read_to_string("config/default.toml")
            .expect("config/default.toml should exist");
        let config = AppConfig::from_toml_str(&contents).expect("should parse");
        assert_eq!(config.weather.base_url, "https://api.openweathermap.org");
        assert_eq!(config.weather.requests_per_minute, 60);
        assert_eq!(config.database.home_history_limit, 5);
        assert_eq!(config.monitoring.log_format, LogFormat::Json);
        assert_eq!(
            config.location.default_coordinates(),
            Coordinates::new(30.6118656, 32.2895872)
        );
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let contents = std::fs::read_to_string("config/default.toml")
            .expect("config/default.toml should exist")
            .replace("https://api.openweathermap.org", "ftp://example.com");
        let err = AppConfig::from_toml_str(&contents).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }
}
