use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::warn;

use crate::db::LocalDataSource;
use crate::weather::models::{FavoritePlace, HomeSnapshot, WeatherSnapshot};

const IN_MEMORY: &str = ":memory:";
const DEFAULT_HOME_HISTORY: u32 = 5;

pub struct Store {
    pool: SqlitePool,
    home_history_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ScheduledNotification {
    pub id: i64,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    city_name: String,
    snapshot: String,
}

impl SnapshotRow {
    fn decode(self) -> Result<(String, WeatherSnapshot)> {
        let snapshot = serde_json::from_str(&self.snapshot)
            .with_context(|| format!("Corrupt snapshot stored for '{}'", self.city_name))?;
        Ok((self.city_name, snapshot))
    }
}

impl Store {
    /// Create a Store from an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            home_history_limit: DEFAULT_HOME_HISTORY,
        }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every in-memory connection is its own database, so keep exactly one alive.
        let pool_options = if database_path == IN_MEMORY {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self::from_pool(pool);
        store.migrate().await?;

        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(IN_MEMORY).await
    }

    pub fn with_home_history_limit(mut self, limit: u32) -> Self {
        self.home_history_limit = limit.max(1);
        self
    }

    async fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../../migrations/001_init.sql");
        // Execute each statement separately (sqlx doesn't support multiple statements in one call)
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }

    // --- Home snapshot history ---

    /// All stored home snapshots, oldest first.
    pub async fn home_snapshots(&self) -> Result<Vec<HomeSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT city_name, snapshot FROM home_snapshots ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch home snapshots")?;

        rows.into_iter()
            .map(|row| {
                let (city_name, snapshot) = row.decode()?;
                Ok(HomeSnapshot {
                    city_name,
                    snapshot,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LocalDataSource for Store {
    // --- Favorite places ---

    async fn favorite_places(&self) -> Result<Vec<FavoritePlace>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT city_name, snapshot FROM favorite_places ORDER BY city_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch favorite places")?;

        // An unreadable row must not hide the others from offline matching.
        let places = rows
            .into_iter()
            .filter_map(|row| match row.decode() {
                Ok((city_name, snapshot)) => Some(FavoritePlace {
                    city_name,
                    snapshot,
                }),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable favorite place");
                    None
                }
            })
            .collect();
        Ok(places)
    }

    async fn find_favorite_place(&self, city_name: &str) -> Result<Option<FavoritePlace>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT city_name, snapshot FROM favorite_places WHERE city_name = ?",
        )
        .bind(city_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch favorite place")?;

        match row {
            Some(row) => {
                let (city_name, snapshot) = row.decode()?;
                Ok(Some(FavoritePlace {
                    city_name,
                    snapshot,
                }))
            }
            None => Ok(None),
        }
    }

    async fn upsert_favorite_place(&self, place: &FavoritePlace) -> Result<()> {
        let snapshot =
            serde_json::to_string(&place.snapshot).context("Failed to encode favorite place")?;

        sqlx::query(
            "INSERT INTO favorite_places (city_name, lat, lon, snapshot)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(city_name) DO UPDATE SET
                lat = excluded.lat,
                lon = excluded.lon,
                snapshot = excluded.snapshot,
                updated_at = datetime('now')",
        )
        .bind(&place.city_name)
        .bind(place.coord().lat)
        .bind(place.coord().lon)
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .context("Failed to upsert favorite place")?;

        Ok(())
    }

    async fn delete_favorite_place(&self, city_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM favorite_places WHERE city_name = ?")
            .bind(city_name)
            .execute(&self.pool)
            .await
            .context("Failed to delete favorite place")?;
        Ok(result.rows_affected() > 0)
    }

    // --- Home snapshot ---

    async fn latest_home_snapshot(&self) -> Result<Option<HomeSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT city_name, snapshot FROM home_snapshots ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest home snapshot")?;

        match row {
            Some(row) => {
                let (city_name, snapshot) = row.decode()?;
                Ok(Some(HomeSnapshot {
                    city_name,
                    snapshot,
                }))
            }
            None => Ok(None),
        }
    }

    async fn upsert_home_snapshot(&self, home: &HomeSnapshot) -> Result<()> {
        let snapshot =
            serde_json::to_string(&home.snapshot).context("Failed to encode home snapshot")?;

        // REPLACE re-inserts with a fresh id, so the newest write always sorts last.
        sqlx::query(
            "INSERT OR REPLACE INTO home_snapshots (city_name, lat, lon, snapshot)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&home.city_name)
        .bind(home.coord().lat)
        .bind(home.coord().lon)
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .context("Failed to upsert home snapshot")?;

        sqlx::query(
            "DELETE FROM home_snapshots WHERE id NOT IN
             (SELECT id FROM home_snapshots ORDER BY id DESC LIMIT ?)",
        )
        .bind(i64::from(self.home_history_limit))
        .execute(&self.pool)
        .await
        .context("Failed to prune home snapshot history")?;

        Ok(())
    }

    async fn clear_home_snapshots(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM home_snapshots")
            .execute(&self.pool)
            .await
            .context("Failed to clear home snapshots")?;
        Ok(result.rows_affected())
    }

    // --- Notifications ---

    async fn insert_notification(&self, date: &str, time: &str) -> Result<ScheduledNotification> {
        let result = sqlx::query("INSERT INTO notifications (date, time) VALUES (?, ?)")
            .bind(date)
            .bind(time)
            .execute(&self.pool)
            .await
            .context("Failed to insert notification")?;

        Ok(ScheduledNotification {
            id: result.last_insert_rowid(),
            date: date.to_string(),
            time: time.to_string(),
        })
    }

    async fn notifications(&self) -> Result<Vec<ScheduledNotification>> {
        let rows = sqlx::query_as::<_, ScheduledNotification>(
            "SELECT id, date, time FROM notifications ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch notifications")?;
        Ok(rows)
    }

    async fn find_notifications_by_time(&self, time: &str) -> Result<Vec<ScheduledNotification>> {
        let rows = sqlx::query_as::<_, ScheduledNotification>(
            "SELECT id, date, time FROM notifications WHERE time = ? ORDER BY id",
        )
        .bind(time)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch notifications by time")?;
        Ok(rows)
    }

    async fn delete_notifications_by_time(&self, time: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE time = ?")
            .bind(time)
            .execute(&self.pool)
            .await
            .context("Failed to delete notifications by time")?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete notification")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_notifications(&self, now: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE (date || ' ' || time) < ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to delete expired notifications")?;
        Ok(result.rows_affected())
    }

    // --- Preferences ---

    async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read preference")?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO preferences (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to write preference")?;
        Ok(())
    }
}
