//! Weather domain types.
//!
//! Field names follow the OpenWeatherMap 2.5 JSON schema so API payloads
//! deserialize directly, and the same shapes are stored as JSON snapshots.

use serde::{Deserialize, Serialize};

/// Two coordinates closer than this on both axes are the same place.
pub const COORDINATE_TOLERANCE: f64 = 0.0001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Approximate equality used for every cache lookup. Repeated GPS reads
    /// and round-tripped storage drift slightly, so exact equality is never used.
    pub fn matches(&self, other: &Coordinates) -> bool {
        self.matches_within(other, COORDINATE_TOLERANCE)
    }

    pub fn matches_within(&self, other: &Coordinates, tolerance: f64) -> bool {
        (self.lat - other.lat).abs() < tolerance && (self.lon - other.lon).abs() < tolerance
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Unit system understood by the API. `Standard` means Kelvin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl UnitSystem {
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Standard => "standard",
        }
    }
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_query())
    }
}

impl std::str::FromStr for UnitSystem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metric" => Ok(Self::Metric),
            "imperial" => Ok(Self::Imperial),
            "standard" | "kelvin" => Ok(Self::Standard),
            other => Err(anyhow::anyhow!("Unknown unit system: {other}")),
        }
    }
}

/// Everything a resolution call needs to know about the request.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherQuery {
    pub coord: Coordinates,
    /// ISO language code, empty for the API default.
    pub language: String,
    pub units: UnitSystem,
}

impl WeatherQuery {
    pub fn new(coord: Coordinates, language: impl Into<String>, units: UnitSystem) -> Self {
        Self {
            coord,
            language: language.into(),
            units,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    #[serde(default)]
    pub feels_like: f64,
    #[serde(default)]
    pub temp_min: f64,
    #[serde(default)]
    pub temp_max: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub humidity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clouds {
    /// Cloud cover percentage.
    pub all: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default)]
    pub deg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub main: String,
    pub description: String,
    pub icon: String,
}

/// A single-point-in-time observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub coord: Coordinates,
    pub main: MainReadings,
    #[serde(default)]
    pub clouds: Clouds,
    #[serde(default)]
    pub wind: Wind,
    pub weather: Vec<WeatherCondition>,
    /// Display name for the location.
    #[serde(default)]
    pub name: String,
}

impl CurrentConditions {
    pub fn description(&self) -> Option<&str> {
        self.weather.first().map(|w| w.description.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// Unix seconds.
    #[serde(default)]
    pub dt: i64,
    pub main: MainReadings,
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
    #[serde(default)]
    pub clouds: Clouds,
    #[serde(default)]
    pub wind: Wind,
    /// `YYYY-MM-DD HH:MM:SS`
    #[serde(default)]
    pub dt_txt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub coord: Coordinates,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub list: Vec<ForecastEntry>,
    pub city: City,
}

/// Cached copy of one place's weather, as persisted for offline use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub coord: Coordinates,
    pub main: MainReadings,
    pub clouds: Clouds,
    pub wind: Wind,
    pub weather: Vec<WeatherCondition>,
    pub forecast: Vec<ForecastEntry>,
    pub city: City,
}

impl WeatherSnapshot {
    pub fn from_parts(current: &CurrentConditions, forecast: &ForecastSeries) -> Self {
        Self {
            coord: current.coord,
            main: current.main.clone(),
            clouds: current.clouds.clone(),
            wind: current.wind.clone(),
            weather: current.weather.clone(),
            forecast: forecast.list.clone(),
            city: forecast.city.clone(),
        }
    }

    pub fn current_conditions(&self, name: &str) -> CurrentConditions {
        CurrentConditions {
            coord: self.coord,
            main: self.main.clone(),
            clouds: self.clouds.clone(),
            wind: self.wind.clone(),
            weather: self.weather.clone(),
            name: name.to_string(),
        }
    }

    pub fn forecast_series(&self) -> ForecastSeries {
        ForecastSeries {
            list: self.forecast.clone(),
            city: self.city.clone(),
        }
    }
}

/// User-bookmarked place. `city_name` is unique; saving again replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoritePlace {
    pub city_name: String,
    pub snapshot: WeatherSnapshot,
}

impl FavoritePlace {
    pub fn new(
        city_name: impl Into<String>,
        current: &CurrentConditions,
        forecast: &ForecastSeries,
    ) -> Self {
        Self {
            city_name: city_name.into(),
            snapshot: WeatherSnapshot::from_parts(current, forecast),
        }
    }

    pub fn coord(&self) -> Coordinates {
        self.snapshot.coord
    }

    pub fn to_current(&self) -> CurrentConditions {
        self.snapshot.current_conditions(&self.city_name)
    }

    pub fn to_forecast(&self) -> ForecastSeries {
        self.snapshot.forecast_series()
    }
}

/// The most recently displayed location's weather, kept for offline fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeSnapshot {
    pub city_name: String,
    pub snapshot: WeatherSnapshot,
}

impl HomeSnapshot {
    pub fn new(current: &CurrentConditions, forecast: &ForecastSeries) -> Self {
        let city_name = if current.name.is_empty() {
            forecast.city.name.clone()
        } else {
            current.name.clone()
        };
        Self {
            city_name,
            snapshot: WeatherSnapshot::from_parts(current, forecast),
        }
    }

    pub fn coord(&self) -> Coordinates {
        self.snapshot.coord
    }

    pub fn to_current(&self) -> CurrentConditions {
        self.snapshot.current_conditions(&self.city_name)
    }

    pub fn to_forecast(&self) -> ForecastSeries {
        self.snapshot.forecast_series()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn condition(description: &str) -> WeatherCondition {
        WeatherCondition {
            id: 800,
            main: "Clear".to_string(),
            description: description.to_string(),
            icon: "01d".to_string(),
        }
    }

    pub fn current(name: &str, lat: f64, lon: f64, temp: f64) -> CurrentConditions {
        CurrentConditions {
            coord: Coordinates::new(lat, lon),
            main: MainReadings {
                temp,
                humidity: 40.0,
                pressure: 1012.0,
                ..Default::default()
            },
            clouds: Clouds { all: 10 },
            wind: Wind {
                speed: 3.5,
                deg: 180.0,
                gust: None,
            },
            weather: vec![condition("clear sky")],
            name: name.to_string(),
        }
    }

    pub fn entry(dt_txt: &str, temp: f64) -> ForecastEntry {
        ForecastEntry {
            dt: 0,
            main: MainReadings {
                temp,
                ..Default::default()
            },
            weather: vec![condition("few clouds")],
            clouds: Clouds::default(),
            wind: Wind::default(),
            dt_txt: dt_txt.to_string(),
        }
    }

    pub fn forecast(name: &str, lat: f64, lon: f64, stamps: &[&str]) -> ForecastSeries {
        ForecastSeries {
            list: stamps
                .iter()
                .enumerate()
                .map(|(i, s)| entry(s, 20.0 + i as f64))
                .collect(),
            city: City {
                id: 1,
                name: name.to_string(),
                coord: Coordinates::new(lat, lon),
                country: "EG".to_string(),
            },
        }
    }

    pub fn favorite(name: &str, lat: f64, lon: f64, temp: f64) -> FavoritePlace {
        FavoritePlace::new(
            name,
            &current(name, lat, lon, temp),
            &forecast(name, lat, lon, &["2025-04-01 00:00:00"]),
        )
    }

    pub fn home(name: &str, lat: f64, lon: f64, temp: f64) -> HomeSnapshot {
        HomeSnapshot::new(
            &current(name, lat, lon, temp),
            &forecast(name, lat, lon, &["2025-04-01 00:00:00"]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn test_matches_within_tolerance() {
        let a = Coordinates::new(30.0, 31.0);
        let b = Coordinates::new(30.00005, 30.99995);
        assert!(a.matches(&b));
        assert!(b.matches(&a));
    }

    #[test]
    fn test_matches_boundary_is_exclusive() {
        let a = Coordinates::new(0.0, 0.0);
        assert!(!a.matches(&Coordinates::new(0.0001, 0.0)));
        assert!(!a.matches(&Coordinates::new(0.0, 0.0001)));
        assert!(!a.matches(&Coordinates::new(0.0, -0.0002)));
    }

    #[test]
    fn test_matches_requires_both_axes() {
        let a = Coordinates::new(45.0, 7.0);
        assert!(!a.matches(&Coordinates::new(45.00001, 7.5)));
        assert!(!a.matches(&Coordinates::new(45.5, 7.00001)));
    }

    #[test]
    fn test_unit_system_parsing() {
        assert_eq!("metric".parse::<UnitSystem>().unwrap(), UnitSystem::Metric);
        assert_eq!("Imperial".parse::<UnitSystem>().unwrap(), UnitSystem::Imperial);
        assert_eq!("kelvin".parse::<UnitSystem>().unwrap(), UnitSystem::Standard);
        assert!("furlongs".parse::<UnitSystem>().is_err());
        assert_eq!(UnitSystem::Standard.as_query(), "standard");
    }

    #[test]
    fn test_current_conditions_deserializes_api_payload() {
        let json = r#"{
            "coord": {"lon": 32.2896, "lat": 30.6119},
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
            "base": "stations",
            "main": {"temp": 24.3, "feels_like": 24.1, "temp_min": 24.3, "temp_max": 24.3, "pressure": 1014, "humidity": 45},
            "visibility": 10000,
            "wind": {"speed": 4.12, "deg": 340},
            "clouds": {"all": 0},
            "dt": 1743501600,
            "name": "Ismailia",
            "cod": 200
        }"#;
        let current: CurrentConditions = serde_json::from_str(json).unwrap();
        assert_eq!(current.name, "Ismailia");
        assert_eq!(current.description(), Some("clear sky"));
        assert_eq!(current.main.humidity, 45.0);
        assert_eq!(current.wind.gust, None);
    }

    #[test]
    fn test_favorite_round_trips_through_snapshot() {
        let current = fixtures::current("Cairo", 30.04, 31.24, 28.0);
        let forecast = fixtures::forecast("Cairo", 30.04, 31.24, &["2025-04-01 00:00:00"]);
        let place = FavoritePlace::new("My Cairo", &current, &forecast);

        let restored = place.to_current();
        assert_eq!(restored.name, "My Cairo");
        assert_eq!(restored.main, current.main);
        assert_eq!(place.to_forecast(), forecast);
        assert_eq!(place.coord(), current.coord);
    }

    #[test]
    fn test_home_snapshot_falls_back_to_city_name() {
        let current = fixtures::current("", 1.0, 2.0, 10.0);
        let forecast = fixtures::forecast("Somewhere", 1.0, 2.0, &[]);
        let home = HomeSnapshot::new(&current, &forecast);
        assert_eq!(home.city_name, "Somewhere");
    }
}
