//! Durable one-shot notification scheduling.
//!
//! Each record is persisted before it is armed, and `restore` re-arms
//! whatever is still pending after a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{LocalDataSource, ScheduledNotification};
use crate::notifications::notifier::Notifier;
use crate::platform::{last_known_or_default, LocationProvider};
use crate::settings::{Preferences, SettingsStore};
use crate::weather::models::Coordinates;
use crate::weather::resolver::WeatherResolver;

pub const NOTIFICATION_TITLE: &str = "Weather Update";
pub const UNKNOWN_WEATHER: &str = "Unknown Weather";
pub const NO_NETWORK: &str = "No network to get data";

const MOMENT_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid date/time '{0}', expected YYYY-MM-DD HH:MM")]
    InvalidMoment(String),
    #[error("'{0}' does not exist in the local time zone")]
    NonexistentLocalTime(String),
    #[error("'{0}' is not in the future")]
    NotInFuture(String),
}

/// Parse a local wall-clock `date` + `time` pair.
pub fn parse_moment(date: &str, time: &str) -> std::result::Result<DateTime<Local>, ScheduleError> {
    let raw = format!("{} {}", date.trim(), time.trim());
    let naive = NaiveDateTime::parse_from_str(&raw, MOMENT_FORMAT)
        .map_err(|_| ScheduleError::InvalidMoment(raw.clone()))?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .ok_or(ScheduleError::NonexistentLocalTime(raw))
}

/// Time left until `trigger`, or `None` when it is not in the future.
pub fn delay_until(trigger: DateTime<Local>, now: DateTime<Local>) -> Option<Duration> {
    (trigger - now).to_std().ok().filter(|d| !d.is_zero())
}

impl ScheduledNotification {
    pub fn trigger_at(&self) -> std::result::Result<DateTime<Local>, ScheduleError> {
        parse_moment(&self.date, &self.time)
    }
}

pub struct NotificationScheduler {
    local: Arc<dyn LocalDataSource>,
    resolver: WeatherResolver,
    settings: SettingsStore,
    location: Arc<dyn LocationProvider>,
    default_location: Coordinates,
    notifier: Arc<dyn Notifier>,
    tasks: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl NotificationScheduler {
    pub fn new(
        resolver: WeatherResolver,
        location: Arc<dyn LocationProvider>,
        default_location: Coordinates,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let local = resolver.local().clone();
        Arc::new(Self {
            settings: SettingsStore::new(local.clone()),
            local,
            resolver,
            location,
            default_location,
            notifier,
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Validate, persist and arm a notification for `date` `time` local time.
    pub async fn schedule(self: &Arc<Self>, date: &str, time: &str) -> Result<ScheduledNotification> {
        let trigger = parse_moment(date, time)?;
        let delay = delay_until(trigger, Local::now())
            .ok_or_else(|| ScheduleError::NotInFuture(format!("{date} {time}")))?;

        // Stored normalized so expiry comparisons on the text columns hold.
        let notification = self
            .local
            .insert_notification(
                &trigger.format("%Y-%m-%d").to_string(),
                &trigger.format("%H:%M").to_string(),
            )
            .await
            .context("Failed to persist notification")?;

        info!(
            id = notification.id,
            date = %notification.date,
            time = %notification.time,
            delay_s = delay.as_secs(),
            "Notification scheduled"
        );
        self.arm_after(notification.clone(), delay);
        Ok(notification)
    }

    /// Purge expired records and re-arm the rest. Returns how many were armed.
    pub async fn restore(self: &Arc<Self>) -> Result<usize> {
        let now = Local::now().format(MOMENT_FORMAT).to_string();
        let purged = self.local.delete_expired_notifications(&now).await?;
        if purged > 0 {
            info!(purged, "Expired notifications removed");
        }

        let pending = self.local.notifications().await?;
        let mut armed = 0;
        for notification in pending {
            match notification.trigger_at() {
                Ok(trigger) => {
                    let delay = delay_until(trigger, Local::now()).unwrap_or(Duration::ZERO);
                    self.arm_after(notification, delay);
                    armed += 1;
                }
                Err(e) => {
                    warn!(id = notification.id, error = %e, "Dropping unreadable notification");
                    self.local.delete_notification(notification.id).await?;
                }
            }
        }

        info!(armed, "Notifications restored");
        Ok(armed)
    }

    pub async fn pending(&self) -> Result<Vec<ScheduledNotification>> {
        self.local.notifications().await
    }

    pub async fn cancel(&self, id: i64) -> Result<bool> {
        self.disarm(id);
        let removed = self.local.delete_notification(id).await?;
        debug!(id, removed, "Notification cancelled");
        Ok(removed)
    }

    pub async fn cancel_by_time(&self, time: &str) -> Result<u64> {
        for notification in self.local.find_notifications_by_time(time).await? {
            self.disarm(notification.id);
        }
        let removed = self.local.delete_notifications_by_time(time).await?;
        debug!(time, removed, "Notifications cancelled by time");
        Ok(removed)
    }

    /// Number of armed timers that have not fired yet.
    pub fn armed(&self) -> usize {
        self.lock_tasks()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Build and deliver the message for `notification`, then drop its record.
    /// Returns the delivered text.
    pub async fn fire(&self, notification: &ScheduledNotification) -> String {
        let message = if self.resolver.is_online().await {
            self.describe_weather().await
        } else {
            NO_NETWORK.to_string()
        };

        if let Err(e) = self.notifier.notify(NOTIFICATION_TITLE, &message).await {
            warn!(id = notification.id, error = %e, "Failed to deliver notification");
        } else {
            info!(id = notification.id, message = %message, "Notification delivered");
        }

        // By id: other dates may share the same time of day and must stay pending.
        if let Err(e) = self.local.delete_notification(notification.id).await {
            warn!(id = notification.id, error = %e, "Failed to remove fired notification");
        }

        message
    }

    async fn describe_weather(&self) -> String {
        let prefs = self.settings.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Using default preferences for notification");
            Preferences::default()
        });

        let coord = match prefs.last_coordinates {
            Some(coord) => coord,
            None => last_known_or_default(self.location.as_ref(), self.default_location).await,
        };

        self.resolver
            .resolve_current(&prefs.weather_query(coord))
            .await
            .into_value()
            .and_then(|current| current.description().map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_WEATHER.to_string())
    }

    pub(crate) fn arm_after(self: &Arc<Self>, notification: ScheduledNotification, delay: Duration) {
        let id = notification.id;
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(&notification).await;
            scheduler.lock_tasks().remove(&notification.id);
        });

        let mut tasks = self.lock_tasks();
        tasks.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = tasks.insert(id, handle) {
            previous.abort();
        }
    }

    fn disarm(&self, id: i64) {
        if let Some(handle) = self.lock_tasks().remove(&id) {
            handle.abort();
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<i64, JoinHandle<()>>> {
        // A panic while holding the lock leaves the map itself intact.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
