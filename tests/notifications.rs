//! Scheduled notifications persist across a restart of the scheduler.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, TimeDelta};

use skycast::db::{LocalDataSource, Store};
use skycast::notifications::{LogNotifier, NotificationScheduler, ScheduleError};
use skycast::platform::{ManualLocationProvider, StaticConnectivity};
use skycast::weather::{CurrentConditions, ForecastSeries, RemoteWeatherSource, WeatherQuery, WeatherResolver};

struct NoRemote;

#[async_trait]
impl RemoteWeatherSource for NoRemote {
    async fn current_weather(&self, _: &WeatherQuery) -> Result<Option<CurrentConditions>> {
        Ok(None)
    }

    async fn forecast_weather(&self, _: &WeatherQuery) -> Result<Option<ForecastSeries>> {
        Ok(None)
    }
}

fn scratch_db(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("skycast-{label}-{}-{nanos}.db", std::process::id()))
}

async fn scheduler(store: Arc<Store>) -> Arc<NotificationScheduler> {
    let resolver = WeatherResolver::new(
        Arc::new(NoRemote),
        store,
        Arc::new(StaticConnectivity::new(false)),
    );
    NotificationScheduler::new(
        resolver,
        Arc::new(ManualLocationProvider::new(None)),
        skycast::weather::Coordinates::new(30.6118656, 32.2895872),
        Arc::new(LogNotifier),
    )
}

fn moment(offset: TimeDelta) -> (String, String) {
    let at = Local::now() + offset;
    (at.format("%Y-%m-%d").to_string(), at.format("%H:%M").to_string())
}

#[tokio::test]
async fn pending_notifications_survive_restart() {
    let db = scratch_db("restart");
    let db_path = db.to_string_lossy().to_string();
    let (date, time) = moment(TimeDelta::hours(6));
    let (old_date, old_time) = moment(-TimeDelta::hours(6));

    let scheduled = {
        let store = Arc::new(Store::new(&db_path).await.unwrap());
        let first = scheduler(store.clone()).await;
        let scheduled = first.schedule(&date, &time).await.unwrap();
        store.insert_notification(&old_date, &old_time).await.unwrap();
        store.pool().close().await;
        scheduled
    };

    let store = Arc::new(Store::new(&db_path).await.unwrap());
    let second = scheduler(store.clone()).await;

    assert_eq!(second.restore().await.unwrap(), 1);
    assert_eq!(second.pending().await.unwrap(), vec![scheduled]);
    assert_eq!(second.armed(), 1);

    assert!(second.cancel(second.pending().await.unwrap()[0].id).await.unwrap());
    assert!(store.notifications().await.unwrap().is_empty());

    store.pool().close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{db_path}{suffix}"));
    }
}

#[tokio::test]
async fn invalid_moments_are_rejected_without_persisting() {
    let store = Arc::new(Store::in_memory().await.unwrap());
    let scheduler = scheduler(store.clone()).await;

    let err = scheduler.schedule("2025-02-30", "10:00").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScheduleError>(),
        Some(ScheduleError::InvalidMoment(_))
    ));

    let (date, time) = moment(-TimeDelta::minutes(5));
    assert!(scheduler.schedule(&date, &time).await.is_err());

    assert!(store.notifications().await.unwrap().is_empty());
}

#[tokio::test]
async fn offline_fire_still_removes_the_record() {
    let store = Arc::new(Store::in_memory().await.unwrap());
    let scheduler = scheduler(store.clone()).await;
    let notification = store.insert_notification("2031-05-01", "06:45").await.unwrap();

    let message = scheduler.fire(&notification).await;

    assert_eq!(message, "No network to get data");
    assert!(store.notifications().await.unwrap().is_empty());
}
