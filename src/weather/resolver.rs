//! Offline-first weather resolution.
//!
//! Online requests go to the remote source and nothing else. Offline requests
//! are answered from the local cache: a favorite place whose coordinates match
//! the query wins, then the latest home snapshot, then `NoData`.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::db::LocalDataSource;
use crate::platform::Connectivity;
use crate::weather::models::{
    Coordinates, CurrentConditions, FavoritePlace, ForecastSeries, HomeSnapshot, WeatherQuery,
};
use crate::weather::remote::RemoteWeatherSource;
use crate::weather::state::{DataOrigin, NoDataReason, Resolved};

#[derive(Clone)]
pub struct WeatherResolver {
    remote: Arc<dyn RemoteWeatherSource>,
    local: Arc<dyn LocalDataSource>,
    connectivity: Arc<dyn Connectivity>,
}

impl WeatherResolver {
    pub fn new(
        remote: Arc<dyn RemoteWeatherSource>,
        local: Arc<dyn LocalDataSource>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            remote,
            local,
            connectivity,
        }
    }

    pub fn local(&self) -> &Arc<dyn LocalDataSource> {
        &self.local
    }

    pub async fn is_online(&self) -> bool {
        self.connectivity.is_online().await
    }

    pub async fn resolve_current(&self, query: &WeatherQuery) -> Resolved<CurrentConditions> {
        if self.connectivity.is_online().await {
            let result = self.remote.current_weather(query).await;
            return from_remote(result, "current", query);
        }

        self.resolve_offline(query.coord, FavoritePlace::to_current, HomeSnapshot::to_current)
            .await
    }

    pub async fn resolve_forecast(&self, query: &WeatherQuery) -> Resolved<ForecastSeries> {
        if self.connectivity.is_online().await {
            let result = self.remote.forecast_weather(query).await;
            return from_remote(result, "forecast", query);
        }

        self.resolve_offline(query.coord, FavoritePlace::to_forecast, HomeSnapshot::to_forecast)
            .await
    }

    async fn resolve_offline<T>(
        &self,
        coord: Coordinates,
        from_favorite: impl Fn(&FavoritePlace) -> T,
        from_home: impl Fn(&HomeSnapshot) -> T,
    ) -> Resolved<T> {
        match self.local.favorite_places().await {
            Ok(places) => {
                if let Some(place) = places.iter().find(|p| p.coord().matches(&coord)) {
                    debug!(%coord, city = %place.city_name, "Offline: serving favorite place");
                    return Resolved::Found {
                        value: from_favorite(place),
                        origin: DataOrigin::Favorite {
                            city_name: place.city_name.clone(),
                        },
                    };
                }
            }
            Err(e) => warn!(%coord, error = %e, "Offline: failed to read favorite places"),
        }

        match self.local.latest_home_snapshot().await {
            Ok(Some(home)) => {
                debug!(%coord, city = %home.city_name, "Offline: serving home snapshot");
                Resolved::Found {
                    value: from_home(&home),
                    origin: DataOrigin::Home {
                        city_name: home.city_name.clone(),
                    },
                }
            }
            Ok(None) => {
                debug!(%coord, "Offline: no cached weather");
                Resolved::NoData(NoDataReason::NoCachedMatch)
            }
            Err(e) => {
                warn!(%coord, error = %e, "Offline: failed to read home snapshot");
                Resolved::NoData(NoDataReason::Storage(format!("{e:#}")))
            }
        }
    }

    pub async fn save_favorite_place(&self, place: &FavoritePlace) -> bool {
        match self.local.upsert_favorite_place(place).await {
            Ok(()) => {
                info!(city = %place.city_name, "Favorite place saved");
                true
            }
            Err(e) => {
                warn!(city = %place.city_name, error = %e, "Failed to save favorite place");
                false
            }
        }
    }

    pub async fn delete_favorite_place(&self, city_name: &str) -> bool {
        match self.local.delete_favorite_place(city_name).await {
            Ok(removed) => {
                if !removed {
                    debug!(city = city_name, "No favorite place to delete");
                }
                removed
            }
            Err(e) => {
                warn!(city = city_name, error = %e, "Failed to delete favorite place");
                false
            }
        }
    }

    pub async fn favorite_places(&self) -> Vec<FavoritePlace> {
        self.local.favorite_places().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list favorite places");
            Vec::new()
        })
    }

    pub async fn save_home_snapshot(&self, home: &HomeSnapshot) -> bool {
        match self.local.upsert_home_snapshot(home).await {
            Ok(()) => {
                debug!(city = %home.city_name, "Home snapshot saved");
                true
            }
            Err(e) => {
                warn!(city = %home.city_name, error = %e, "Failed to save home snapshot");
                false
            }
        }
    }

    pub async fn clear_home_snapshot(&self) -> bool {
        match self.local.clear_home_snapshots().await {
            Ok(removed) => {
                info!(removed, "Home snapshots cleared");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear home snapshots");
                false
            }
        }
    }

    /// Resolve both shapes for `query` and save them as a favorite named `name`.
    pub async fn bookmark(&self, name: &str, query: &WeatherQuery) -> Option<FavoritePlace> {
        let current = self.resolve_current(query).await;
        let forecast = self.resolve_forecast(query).await;

        let (current, forecast) = match (current, forecast) {
            (Resolved::Found { value: c, .. }, Resolved::Found { value: f, .. }) => (c, f),
            (Resolved::NoData(reason), _) | (_, Resolved::NoData(reason)) => {
                warn!(city = name, %reason, "Cannot bookmark place without weather");
                return None;
            }
        };

        let place = FavoritePlace::new(name, &current, &forecast);
        self.save_favorite_place(&place).await.then_some(place)
    }
}

fn from_remote<T>(result: Result<Option<T>>, kind: &str, query: &WeatherQuery) -> Resolved<T> {
    match result {
        Ok(Some(value)) => Resolved::live(value),
        Ok(None) => {
            debug!(kind, coord = %query.coord, "Remote returned no data");
            Resolved::NoData(NoDataReason::RemoteEmpty)
        }
        Err(e) => {
            warn!(kind, coord = %query.coord, error = %e, "Remote weather request failed");
            Resolved::NoData(NoDataReason::Remote(format!("{e:#}")))
        }
    }
}
