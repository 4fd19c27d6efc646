pub mod preferences;

pub use preferences::{
    LocationMethod, Preferences, SettingsStore, TemperatureUnit, WindSpeedUnit,
};
