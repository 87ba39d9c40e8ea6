//! Best-available device coordinates.
//!
//! Order of preference: a cached fix younger than the freshness window, a
//! live lookup bounded by a timeout, any cached fix regardless of age, and
//! finally nothing. Lookup failures are logged and degrade, never surface.

pub mod mock;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::{self, RecordStore};

pub use mock::MockLocationSource;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLocation {
    pub lat: f64,
    pub lon: f64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

impl CachedLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.updated_at)
    }
}

/// Host capability that asks the platform for the current position.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates>;
}

#[derive(Clone)]
pub struct LocationResolver {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn LocationSource>,
    fresh_for: Duration,
    lookup_timeout: Duration,
}

impl LocationResolver {
    pub fn new(
        store: Arc<dyn RecordStore>,
        source: Arc<dyn LocationSource>,
        fresh_for: Duration,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            source,
            fresh_for,
            lookup_timeout,
        }
    }

    async fn cached(&self) -> Option<CachedLocation> {
        match store::load::<CachedLocation>(self.store.as_ref(), store::LOCATION_CACHE_KEY).await {
            Ok(entry) => entry.filter(|entry| entry.coordinates().is_valid()),
            Err(err) => {
                log_warn!("location cache unreadable: {err:#}");
                None
            }
        }
    }

    async fn live_lookup(&self) -> Option<Coordinates> {
        match tokio::time::timeout(self.lookup_timeout, self.source.current_position()).await {
            Ok(Ok(coords)) if coords.is_valid() => Some(coords),
            Ok(Ok(coords)) => {
                log_warn!("location source returned out-of-range coordinates {coords:?}");
                None
            }
            Ok(Err(err)) => {
                log_warn!("location lookup failed: {err:#}");
                None
            }
            Err(_) => {
                log_warn!(
                    "location lookup timed out after {}s; treating as unavailable",
                    self.lookup_timeout.as_secs()
                );
                None
            }
        }
    }

    pub async fn best_available(&self) -> Option<Coordinates> {
        let now_ms = Utc::now().timestamp_millis();
        let cached = self.cached().await;
        let fresh_ms = i64::try_from(self.fresh_for.as_millis()).unwrap_or(i64::MAX);

        if let Some(entry) = cached {
            // Stamps ahead of the clock are not trusted as fresh.
            if (0..fresh_ms).contains(&entry.age_ms(now_ms)) {
                log_debug!("using cached location ({}ms old)", entry.age_ms(now_ms));
                return Some(entry.coordinates());
            }
        }

        if let Some(coords) = self.live_lookup().await {
            let entry = CachedLocation {
                lat: coords.lat,
                lon: coords.lon,
                updated_at: Utc::now().timestamp_millis(),
            };
            if let Err(err) = store::save(self.store.as_ref(), store::LOCATION_CACHE_KEY, &entry).await {
                log_warn!("failed to cache location: {err:#}");
            }
            return Some(coords);
        }

        if let Some(entry) = cached {
            log_debug!("falling back to stale cached location");
            return Some(entry.coordinates());
        }

        None
    }
}
