//! Offline-first weather client.
//!
//! Live data comes from OpenWeatherMap when the network is reachable; otherwise
//! answers are rebuilt from favorite places and the last home snapshot kept in
//! a local SQLite store.

pub mod app;
pub mod config;
pub mod db;
pub mod monitoring;
pub mod notifications;
pub mod platform;
pub mod settings;
pub mod weather;
