//! User preferences persisted as key/value rows in the local store.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::LocalDataSource;
use crate::weather::models::{Coordinates, UnitSystem, WeatherQuery};

const TEMPERATURE_UNIT_KEY: &str = "temperature_unit";
const WIND_SPEED_UNIT_KEY: &str = "wind_speed_unit";
const LANGUAGE_KEY: &str = "language";
const LAST_LAT_KEY: &str = "last_lat";
const LAST_LON_KEY: &str = "last_lon";
const LOCATION_METHOD_KEY: &str = "location_method";

const MPS_TO_MPH: f64 = 2.23694;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    /// The API unit system that returns temperatures in this unit.
    pub fn unit_system(&self) -> UnitSystem {
        match self {
            Self::Celsius => UnitSystem::Metric,
            Self::Fahrenheit => UnitSystem::Imperial,
            Self::Kelvin => UnitSystem::Standard,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => " K",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Celsius => "celsius",
            Self::Fahrenheit => "fahrenheit",
            Self::Kelvin => "kelvin",
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "celsius" | "c" => Ok(Self::Celsius),
            "fahrenheit" | "f" => Ok(Self::Fahrenheit),
            "kelvin" | "k" => Ok(Self::Kelvin),
            other => anyhow::bail!("Unknown temperature unit: {other}"),
        }
    }
}

impl std::fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindSpeedUnit {
    #[default]
    MetersPerSecond,
    MilesPerHour,
}

impl WindSpeedUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetersPerSecond => "m/s",
            Self::MilesPerHour => "mph",
        }
    }
}

impl FromStr for WindSpeedUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m/s" | "mps" => Ok(Self::MetersPerSecond),
            "mph" => Ok(Self::MilesPerHour),
            other => anyhow::bail!("Unknown wind speed unit: {other}"),
        }
    }
}

impl std::fmt::Display for WindSpeedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the home location is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LocationMethod {
    #[default]
    Gps,
    Map,
}

impl LocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Map => "map",
        }
    }
}

impl FromStr for LocationMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gps" => Ok(Self::Gps),
            "map" => Ok(Self::Map),
            other => anyhow::bail!("Unknown location method: {other}"),
        }
    }
}

impl std::fmt::Display for LocationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub temperature_unit: TemperatureUnit,
    pub wind_speed_unit: WindSpeedUnit,
    pub language: String,
    pub last_coordinates: Option<Coordinates>,
    pub location_method: LocationMethod,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            temperature_unit: TemperatureUnit::default(),
            wind_speed_unit: WindSpeedUnit::default(),
            language: "en".to_string(),
            last_coordinates: None,
            location_method: LocationMethod::default(),
        }
    }
}

impl Preferences {
    pub fn weather_query(&self, coord: Coordinates) -> WeatherQuery {
        WeatherQuery::new(coord, self.language.clone(), self.temperature_unit.unit_system())
    }

    /// Temperatures arrive already in the preferred unit; only the symbol is added.
    pub fn format_temperature(&self, temp: f64) -> String {
        format!("{}{}", temp.round(), self.temperature_unit.symbol())
    }

    /// `speed` is in the unit the API used for the preferred unit system
    /// (mph for imperial, m/s otherwise).
    pub fn format_wind_speed(&self, speed: f64) -> String {
        let api_mph = self.temperature_unit.unit_system() == UnitSystem::Imperial;
        let value = match (api_mph, self.wind_speed_unit) {
            (false, WindSpeedUnit::MilesPerHour) => speed * MPS_TO_MPH,
            (true, WindSpeedUnit::MetersPerSecond) => speed / MPS_TO_MPH,
            _ => speed,
        };
        format!("{value:.1} {}", self.wind_speed_unit)
    }
}

/// Reads and writes `Preferences` through the local store.
#[derive(Clone)]
pub struct SettingsStore {
    local: Arc<dyn LocalDataSource>,
}

impl SettingsStore {
    pub fn new(local: Arc<dyn LocalDataSource>) -> Self {
        Self { local }
    }

    /// Missing keys take defaults; unreadable values are logged and defaulted.
    pub async fn load(&self) -> Result<Preferences> {
        let mut prefs = Preferences::default();

        if let Some(unit) = self.parsed(TEMPERATURE_UNIT_KEY).await? {
            prefs.temperature_unit = unit;
        }
        if let Some(unit) = self.parsed(WIND_SPEED_UNIT_KEY).await? {
            prefs.wind_speed_unit = unit;
        }
        if let Some(language) = self.local.get_preference(LANGUAGE_KEY).await? {
            prefs.language = language;
        }
        if let Some(method) = self.parsed(LOCATION_METHOD_KEY).await? {
            prefs.location_method = method;
        }

        let lat: Option<f64> = self.parsed(LAST_LAT_KEY).await?;
        let lon: Option<f64> = self.parsed(LAST_LON_KEY).await?;
        if let (Some(lat), Some(lon)) = (lat, lon) {
            prefs.last_coordinates = Some(Coordinates::new(lat, lon));
        }

        debug!(?prefs, "Preferences loaded");
        Ok(prefs)
    }

    pub async fn save(&self, prefs: &Preferences) -> Result<()> {
        self.set_temperature_unit(prefs.temperature_unit).await?;
        self.set_wind_speed_unit(prefs.wind_speed_unit).await?;
        self.set_language(&prefs.language).await?;
        self.set_location_method(prefs.location_method).await?;
        if let Some(coord) = prefs.last_coordinates {
            self.set_last_coordinates(coord).await?;
        }
        Ok(())
    }

    pub async fn set_temperature_unit(&self, unit: TemperatureUnit) -> Result<()> {
        self.put(TEMPERATURE_UNIT_KEY, unit.as_str()).await
    }

    pub async fn set_wind_speed_unit(&self, unit: WindSpeedUnit) -> Result<()> {
        self.put(WIND_SPEED_UNIT_KEY, unit.as_str()).await
    }

    pub async fn set_language(&self, language: &str) -> Result<()> {
        self.put(LANGUAGE_KEY, language).await
    }

    pub async fn set_location_method(&self, method: LocationMethod) -> Result<()> {
        self.put(LOCATION_METHOD_KEY, method.as_str()).await
    }

    pub async fn set_last_coordinates(&self, coord: Coordinates) -> Result<()> {
        self.put(LAST_LAT_KEY, &coord.lat.to_string()).await?;
        self.put(LAST_LON_KEY, &coord.lon.to_string()).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.local
            .set_preference(key, value)
            .await
            .with_context(|| format!("Failed to save preference {key}"))
    }

    async fn parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self
            .local
            .get_preference(key)
            .await
            .with_context(|| format!("Failed to read preference {key}"))?
        else {
            return Ok(None);
        };

        match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unreadable preference");
                Ok(None)
            }
        }
    }
}
