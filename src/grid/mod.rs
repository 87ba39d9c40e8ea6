//! Regional grid carbon intensity.
//!
//! Readings are cached for a short TTL. When the cache is stale a single
//! refresh is started and every concurrent caller joins it; failures fall
//! back to the last cached reading (however old) or to nothing, in which
//! case callers use [`BASELINE_INTENSITY`].

pub mod api;
pub mod single_flight;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TrackerConfig;
use crate::emissions::BASELINE_INTENSITY;
use crate::location::LocationResolver;
use crate::store::{self, RecordStore};

pub use api::{GridQuery, HttpIntensityApi, IntensityApi, MockIntensityApi};
pub use single_flight::SingleFlight;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Response fields checked for the intensity value, first match wins.
const INTENSITY_FIELDS: [&str; 4] = ["carbonIntensity", "carbon_intensity", "intensity", "value"];

/// Cached reading. `updated_at` only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridIntensity {
    /// gCO2 per kWh.
    pub intensity: f64,
    pub zone: Option<String>,
    /// Epoch milliseconds.
    pub updated_at: i64,
    pub is_estimated: Option<bool>,
}

impl GridIntensity {
    /// Entries stamped in the future (clock changes) count as stale.
    pub fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let age = now_ms.saturating_sub(self.updated_at);
        (0..ttl_ms).contains(&age)
    }

    pub fn multiplier(&self) -> Option<f64> {
        grid_multiplier(self.intensity)
    }
}

/// Ratio of `intensity` to the global baseline.
pub fn grid_multiplier(intensity: f64) -> Option<f64> {
    multiplier_against(intensity, BASELINE_INTENSITY)
}

pub fn multiplier_against(intensity: f64, baseline: f64) -> Option<f64> {
    if !intensity.is_finite() || intensity < 0.0 || !baseline.is_finite() || baseline <= 0.0 {
        return None;
    }
    Some(intensity / baseline)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReading {
    pub intensity: f64,
    pub zone: Option<String>,
    pub is_estimated: Option<bool>,
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (number.is_finite() && number >= 0.0).then_some(number)
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Extracts a reading from an intensity API body; `None` when no accepted
/// field holds a usable number.
pub fn parse_intensity_response(body: &Value) -> Option<ParsedReading> {
    let intensity = INTENSITY_FIELDS
        .iter()
        .find_map(|field| body.get(field).and_then(as_number))?;

    let zone = body
        .get("zone")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|zone| !zone.is_empty())
        .map(str::to_string);
    let is_estimated = body.get("isEstimated").and_then(as_flag);

    Some(ParsedReading {
        intensity,
        zone,
        is_estimated,
    })
}

#[derive(Debug, Clone)]
struct ProviderSettings {
    token: Option<String>,
    fallback_zone: String,
    ttl: Duration,
    request_timeout: Duration,
}

#[derive(Clone)]
pub struct GridIntensityProvider {
    store: Arc<dyn RecordStore>,
    api: Arc<dyn IntensityApi>,
    location: LocationResolver,
    settings: ProviderSettings,
    flight: Arc<SingleFlight<Option<GridIntensity>>>,
}

impl GridIntensityProvider {
    pub fn new(
        store: Arc<dyn RecordStore>,
        api: Arc<dyn IntensityApi>,
        location: LocationResolver,
        config: &TrackerConfig,
    ) -> Self {
        Self {
            store,
            api,
            location,
            settings: ProviderSettings {
                token: config.grid_token().map(str::to_string),
                fallback_zone: config.fallback_zone.clone(),
                ttl: config.grid_cache_ttl(),
                request_timeout: config.grid_request_timeout(),
            },
            flight: Arc::new(SingleFlight::new()),
        }
    }

    pub fn has_token(&self) -> bool {
        self.settings.token.is_some()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.flight.in_flight()
    }

    pub async fn cached(&self) -> Option<GridIntensity> {
        match store::load::<GridIntensity>(self.store.as_ref(), store::GRID_CACHE_KEY).await {
            Ok(entry) => entry,
            Err(err) => {
                log_warn!("grid cache unreadable: {err:#}");
                None
            }
        }
    }

    /// Current reading, refreshing through the API when the cache is stale.
    pub async fn realtime_intensity(&self) -> Option<GridIntensity> {
        let cached = self.cached().await;
        let now_ms = Utc::now().timestamp_millis();

        if let Some(entry) = cached.as_ref() {
            if entry.is_fresh(now_ms, self.settings.ttl) {
                log_debug!("grid cache hit ({} g/kWh)", entry.intensity);
                return cached;
            }
        }

        let Some(token) = self.settings.token.clone() else {
            log_debug!("no grid token configured; serving cached reading");
            return cached;
        };

        match self.flight.run(move || self.refresh(token)).await {
            Some(Some(fresh)) => Some(fresh),
            _ => self.cached().await.or(cached),
        }
    }

    /// Intensity to calculate with: live or cached reading, else the baseline.
    pub async fn intensity_or_baseline(&self) -> f64 {
        self.realtime_intensity()
            .await
            .map(|reading| reading.intensity)
            .unwrap_or(BASELINE_INTENSITY)
    }

    async fn refresh(&self, token: String) -> Option<GridIntensity> {
        // A refresh that finished between our stale read and taking the slot
        // already did the work.
        if let Some(entry) = self
            .cached()
            .await
            .filter(|entry| entry.is_fresh(Utc::now().timestamp_millis(), self.settings.ttl))
        {
            log_debug!("grid cache refreshed by an earlier caller");
            return Some(entry);
        }

        let query = match self.location.best_available().await {
            Some(coords) => GridQuery::Coordinates(coords),
            None => GridQuery::Zone(self.settings.fallback_zone.clone()),
        };

        let body = match tokio::time::timeout(
            self.settings.request_timeout,
            self.api.fetch(&query, &token),
        )
        .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(err)) => {
                log_warn!("grid intensity fetch failed: {err:#}");
                return None;
            }
            Err(_) => {
                log_warn!(
                    "grid intensity fetch timed out after {}s",
                    self.settings.request_timeout.as_secs()
                );
                return None;
            }
        };

        let Some(reading) = parse_intensity_response(&body) else {
            log_warn!("grid intensity response had no numeric intensity field");
            return None;
        };

        let previous = self.cached().await.map(|entry| entry.updated_at);
        let now_ms = Utc::now().timestamp_millis();
        let updated_at = match previous {
            Some(last) if last >= now_ms => last + 1,
            _ => now_ms,
        };

        let entry = GridIntensity {
            intensity: reading.intensity,
            zone: reading.zone,
            updated_at,
            is_estimated: reading.is_estimated,
        };

        if let Err(err) = store::save(self.store.as_ref(), store::GRID_CACHE_KEY, &entry).await {
            log_warn!("failed to cache grid intensity: {err:#}");
        }

        log_info!(
            "grid intensity refreshed: {} g/kWh (zone {})",
            entry.intensity,
            entry.zone.as_deref().unwrap_or("unknown")
        );
        Some(entry)
    }
}
