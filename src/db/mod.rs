pub mod store;

use anyhow::Result;
use async_trait::async_trait;

use crate::weather::models::{FavoritePlace, HomeSnapshot};
pub use store::{ScheduledNotification, Store};

/// Local persistence consumed by the resolver, the scheduler and preferences.
///
/// Writes are upserts keyed by the natural key (city name, preference key),
/// so concurrent writers resolve to last-write-wins inside the storage engine.
#[async_trait]
pub trait LocalDataSource: Send + Sync {
    async fn favorite_places(&self) -> Result<Vec<FavoritePlace>>;

    async fn find_favorite_place(&self, city_name: &str) -> Result<Option<FavoritePlace>>;

    async fn upsert_favorite_place(&self, place: &FavoritePlace) -> Result<()>;

    /// Returns whether a row was removed.
    async fn delete_favorite_place(&self, city_name: &str) -> Result<bool>;

    async fn latest_home_snapshot(&self) -> Result<Option<HomeSnapshot>>;

    async fn upsert_home_snapshot(&self, home: &HomeSnapshot) -> Result<()>;

    async fn clear_home_snapshots(&self) -> Result<u64>;

    async fn insert_notification(&self, date: &str, time: &str) -> Result<ScheduledNotification>;

    /// Newest first.
    async fn notifications(&self) -> Result<Vec<ScheduledNotification>>;

    async fn find_notifications_by_time(&self, time: &str) -> Result<Vec<ScheduledNotification>>;

    async fn delete_notifications_by_time(&self, time: &str) -> Result<u64>;

    async fn delete_notification(&self, id: i64) -> Result<bool>;

    /// Removes every notification whose `date time` sorts before `now` (`YYYY-MM-DD HH:MM`).
    async fn delete_expired_notifications(&self, now: &str) -> Result<u64>;

    async fn get_preference(&self, key: &str) -> Result<Option<String>>;

    async fn set_preference(&self, key: &str, value: &str) -> Result<()>;
}
