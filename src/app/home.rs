//! Home screen state: the current location's weather as observable values.
//!
//! Consumers hold `watch` receivers and always see the latest published state.
//! Every refresh takes a new generation number; a response whose generation
//! is no longer the newest is discarded instead of published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::platform::{last_known_or_default, LocationProvider};
use crate::settings::{LocationMethod, Preferences, SettingsStore};
use crate::weather::aggregate::daily_aggregate;
use crate::weather::models::{Coordinates, CurrentConditions, ForecastSeries, HomeSnapshot};
use crate::weather::resolver::WeatherResolver;
use crate::weather::state::{Resolved, WeatherState};

pub type CurrentState = WeatherState<CurrentConditions>;
pub type ForecastState = WeatherState<ForecastSeries>;

pub struct HomeController {
    inner: Arc<Inner>,
    follower: Mutex<Option<JoinHandle<()>>>,
    provider: Mutex<Option<Arc<dyn LocationProvider>>>,
}

struct Inner {
    resolver: WeatherResolver,
    settings: SettingsStore,
    default_location: Coordinates,
    current_tx: watch::Sender<CurrentState>,
    forecast_tx: watch::Sender<ForecastState>,
    /// Newest refresh generation. Held while publishing so a stale result
    /// can never land after a newer `Loading`.
    generation: Mutex<u64>,
    /// Serializes home snapshot writes so the newest generation is written last.
    save_lock: tokio::sync::Mutex<()>,
    user_selected: AtomicBool,
}

impl HomeController {
    pub fn new(resolver: WeatherResolver, default_location: Coordinates) -> Self {
        let settings = SettingsStore::new(resolver.local().clone());
        let (current_tx, _) = watch::channel(WeatherState::Loading);
        let (forecast_tx, _) = watch::channel(WeatherState::Loading);

        Self {
            inner: Arc::new(Inner {
                resolver,
                settings,
                default_location,
                current_tx,
                forecast_tx,
                generation: Mutex::new(0),
                save_lock: tokio::sync::Mutex::new(()),
                user_selected: AtomicBool::new(false),
            }),
            follower: Mutex::new(None),
            provider: Mutex::new(None),
        }
    }

    pub fn current(&self) -> watch::Receiver<CurrentState> {
        self.inner.current_tx.subscribe()
    }

    pub fn forecast(&self) -> watch::Receiver<ForecastState> {
        self.inner.forecast_tx.subscribe()
    }

    pub fn is_user_selected(&self) -> bool {
        self.inner.user_selected.load(Ordering::SeqCst)
    }

    /// Fetch weather for `coord` and publish it. Returns `false` when a newer
    /// refresh started in the meantime and this result was dropped.
    pub async fn refresh(&self, coord: Coordinates) -> bool {
        self.inner.refresh(coord).await
    }

    /// Pin the home location to a user-chosen point.
    pub async fn select_location(&self, coord: Coordinates) -> bool {
        self.inner.user_selected.store(true, Ordering::SeqCst);

        if let Err(e) = self.inner.settings.set_last_coordinates(coord).await {
            warn!(error = %e, "Failed to save selected location");
        }
        if let Err(e) = self.inner.settings.set_location_method(LocationMethod::Map).await {
            warn!(error = %e, "Failed to save location method");
        }

        info!(%coord, "Home location selected");
        self.inner.refresh(coord).await
    }

    /// Go back to following the device. Refreshes right away when a fix is known.
    pub async fn use_device_location(&self) {
        self.inner.user_selected.store(false, Ordering::SeqCst);

        if let Err(e) = self.inner.settings.set_location_method(LocationMethod::Gps).await {
            warn!(error = %e, "Failed to save location method");
        }

        let provider = self.lock_provider().clone();
        if let Some(provider) = provider {
            if let Some(fix) = provider.last_known().await {
                self.inner.refresh(fix).await;
            }
        }
    }

    /// Refresh on every distinct device fix while the location is not user-selected.
    /// Replaces any previous follower.
    pub fn follow(&self, provider: Arc<dyn LocationProvider>) {
        let inner = Arc::clone(&self.inner);
        let mut rx = provider.subscribe();
        *self.lock_provider() = Some(provider);

        let handle = tokio::spawn(async move {
            let mut last: Option<Coordinates> = None;
            loop {
                let fix = *rx.borrow_and_update();
                if let Some(coord) = fix {
                    let distinct = last.map_or(true, |prev| !prev.matches(&coord));
                    if distinct && !inner.user_selected.load(Ordering::SeqCst) {
                        debug!(%coord, "Device location changed");
                        last = Some(coord);
                        inner.refresh(coord).await;
                    }
                }
                if rx.changed().await.is_err() {
                    debug!("Location provider closed");
                    break;
                }
            }
        });

        let mut follower = self.follower.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = follower.replace(handle) {
            previous.abort();
        }
    }

    /// Start-up: reuse a saved map selection, otherwise follow the device
    /// (showing the default location until a fix arrives).
    pub async fn restore(&self, provider: Arc<dyn LocationProvider>) {
        let prefs = self.inner.settings.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Using default preferences");
            Preferences::default()
        });

        match (prefs.location_method, prefs.last_coordinates) {
            (LocationMethod::Map, Some(coord)) => {
                self.select_location(coord).await;
            }
            _ => {
                if provider.last_known().await.is_none() {
                    let coord =
                        last_known_or_default(provider.as_ref(), self.inner.default_location).await;
                    self.inner.refresh(coord).await;
                }
            }
        }

        self.follow(provider);
    }

    fn lock_provider(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn LocationProvider>>> {
        self.provider.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for HomeController {
    fn drop(&mut self) {
        let follower = self.follower.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = follower.take() {
            handle.abort();
        }
    }
}

impl Inner {
    async fn refresh(&self, coord: Coordinates) -> bool {
        let generation = {
            let mut latest = self.lock_generation();
            *latest += 1;
            self.current_tx.send_replace(WeatherState::Loading);
            self.forecast_tx.send_replace(WeatherState::Loading);
            *latest
        };

        let prefs = self.settings.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Using default preferences");
            Preferences::default()
        });
        let query = prefs.weather_query(coord);

        let (current, forecast) = tokio::join!(
            self.resolver.resolve_current(&query),
            self.resolver.resolve_forecast(&query)
        );

        let snapshot = match (&current, &forecast) {
            (Resolved::Found { value: c, origin: oc }, Resolved::Found { value: f, origin: of })
                if oc.is_live() && of.is_live() =>
            {
                Some(HomeSnapshot::new(c, f))
            }
            _ => None,
        };

        {
            let latest = self.lock_generation();
            if *latest != generation {
                debug!(%coord, generation, latest = *latest, "Discarding superseded weather");
                return false;
            }
            self.current_tx.send_replace(current.into());
            self.forecast_tx
                .send_replace(forecast.map(|series| daily_aggregate(&series)).into());
        }

        if let Some(home) = snapshot {
            let _saving = self.save_lock.lock().await;
            let latest = *self.lock_generation();
            if latest == generation {
                self.resolver.save_home_snapshot(&home).await;
            } else {
                debug!(%coord, generation, latest, "Skipping home snapshot of superseded refresh");
            }
        }
        true
    }

    fn lock_generation(&self) -> std::sync::MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(|p| p.into_inner())
    }
}
