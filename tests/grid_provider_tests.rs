use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use webcarbon::config::TrackerConfig;
use webcarbon::grid::{GridIntensity, GridIntensityProvider, GridQuery, MockIntensityApi};
use webcarbon::location::{Coordinates, LocationResolver, MockLocationSource};
use webcarbon::store::{self, MemoryStore, RecordStore};

// ═══════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════

struct Fixture {
    store: Arc<MemoryStore>,
    api: Arc<MockIntensityApi>,
    location: Arc<MockLocationSource>,
    provider: GridIntensityProvider,
}

fn config_with_token() -> TrackerConfig {
    TrackerConfig {
        grid_api_token: Some("secret".into()),
        ..TrackerConfig::default()
    }
}

fn fixture(api: MockIntensityApi, location: MockLocationSource, config: &TrackerConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let api = Arc::new(api);
    let location = Arc::new(location);

    let resolver = LocationResolver::new(
        store.clone(),
        location.clone(),
        config.location_fresh(),
        Duration::from_millis(100),
    );
    let provider = GridIntensityProvider::new(store.clone(), api.clone(), resolver, config);

    Fixture {
        store,
        api,
        location,
        provider,
    }
}

fn reading(intensity: f64, age_ms: i64) -> GridIntensity {
    GridIntensity {
        intensity,
        zone: Some("DE".into()),
        updated_at: Utc::now().timestamp_millis() - age_ms,
        is_estimated: Some(false),
    }
}

async fn seed_cache(store: &dyn RecordStore, entry: &GridIntensity) {
    store::save(store, store::GRID_CACHE_KEY, entry).await.unwrap();
}

const HOUR_MS: i64 = 60 * 60 * 1000;

// ═══════════════════════════════════════════════
// Cache behaviour
// ═══════════════════════════════════════════════

#[tokio::test]
async fn fresh_cache_is_served_without_fetching() {
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 900})),
        MockLocationSource::fixed(52.5, 13.4),
        &config_with_token(),
    );
    let cached = reading(410.0, 0);
    seed_cache(f.store.as_ref(), &cached).await;

    let result = f.provider.realtime_intensity().await;

    assert_eq!(result, Some(cached));
    assert_eq!(f.api.calls(), 0);
    assert_eq!(f.location.calls(), 0);
}

#[tokio::test]
async fn stale_cache_triggers_refresh_and_is_replaced() {
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 320, "zone": "FR", "isEstimated": "true"})),
        MockLocationSource::fixed(48.85, 2.35),
        &config_with_token(),
    );
    seed_cache(f.store.as_ref(), &reading(410.0, HOUR_MS)).await;

    let result = f.provider.realtime_intensity().await.unwrap();

    assert_eq!(result.intensity, 320.0);
    assert_eq!(result.zone.as_deref(), Some("FR"));
    assert_eq!(result.is_estimated, Some(true));
    assert_eq!(f.api.calls(), 1);
    assert_eq!(f.provider.cached().await, Some(result));
}

#[tokio::test]
async fn concurrent_stale_calls_fetch_once() {
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 250})).with_delay(Duration::from_millis(50)),
        MockLocationSource::fixed(48.85, 2.35),
        &config_with_token(),
    );
    seed_cache(f.store.as_ref(), &reading(410.0, HOUR_MS)).await;

    let (a, b) = tokio::join!(f.provider.realtime_intensity(), f.provider.realtime_intensity());

    assert_eq!(f.api.calls(), 1);
    assert_eq!(a.map(|r| r.intensity), Some(250.0));
    assert_eq!(b.map(|r| r.intensity), Some(250.0));
    assert!(!f.provider.refresh_in_flight());
}

#[tokio::test]
async fn later_refresh_runs_again_after_first_completes() {
    let config = TrackerConfig {
        grid_cache_ttl_secs: 0,
        ..config_with_token()
    };
    let f = fixture(
        MockIntensityApi::returning(json!({"value": 100})),
        MockLocationSource::fixed(48.85, 2.35),
        &config,
    );

    f.provider.realtime_intensity().await;
    f.api.set_body(json!({"value": 200}));
    let second = f.provider.realtime_intensity().await.unwrap();

    assert_eq!(f.api.calls(), 2);
    assert_eq!(second.intensity, 200.0);
}

#[tokio::test]
async fn updated_at_never_moves_backwards() {
    let config = TrackerConfig {
        grid_cache_ttl_secs: 0,
        ..config_with_token()
    };
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 300})),
        MockLocationSource::fixed(48.85, 2.35),
        &config,
    );
    let ahead = reading(410.0, -HOUR_MS);
    seed_cache(f.store.as_ref(), &ahead).await;

    let refreshed = f.provider.realtime_intensity().await.unwrap();

    assert_eq!(refreshed.updated_at, ahead.updated_at + 1);
}

// ═══════════════════════════════════════════════
// Inert and degraded states
// ═══════════════════════════════════════════════

#[tokio::test]
async fn without_token_stale_cache_is_returned_untouched() {
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 300})),
        MockLocationSource::fixed(48.85, 2.35),
        &TrackerConfig::default(),
    );
    let stale = reading(410.0, HOUR_MS);
    seed_cache(f.store.as_ref(), &stale).await;

    assert!(!f.provider.has_token());
    assert_eq!(f.provider.realtime_intensity().await, Some(stale));
    assert_eq!(f.api.calls(), 0);
}

#[tokio::test]
async fn without_token_or_cache_the_baseline_applies() {
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 300})),
        MockLocationSource::fixed(48.85, 2.35),
        &TrackerConfig::default(),
    );

    assert_eq!(f.provider.realtime_intensity().await, None);
    assert_eq!(f.provider.intensity_or_baseline().await, 475.0);
}

#[tokio::test]
async fn fetch_failure_falls_back_to_stale_cache() {
    let f = fixture(
        MockIntensityApi::failing("503 Service Unavailable"),
        MockLocationSource::fixed(48.85, 2.35),
        &config_with_token(),
    );
    let stale = reading(410.0, HOUR_MS);
    seed_cache(f.store.as_ref(), &stale).await;

    assert_eq!(f.provider.realtime_intensity().await, Some(stale));
    assert_eq!(f.api.calls(), 1);
}

#[tokio::test]
async fn fetch_failure_without_cache_yields_none() {
    let f = fixture(
        MockIntensityApi::failing("connection refused"),
        MockLocationSource::fixed(48.85, 2.35),
        &config_with_token(),
    );

    assert_eq!(f.provider.realtime_intensity().await, None);
    assert_eq!(f.provider.cached().await, None);
}

#[tokio::test]
async fn body_without_intensity_is_treated_as_failure() {
    let f = fixture(
        MockIntensityApi::returning(json!({"zone": "DE", "carbonIntensity": "unknown"})),
        MockLocationSource::fixed(48.85, 2.35),
        &config_with_token(),
    );
    let stale = reading(410.0, HOUR_MS);
    seed_cache(f.store.as_ref(), &stale).await;

    assert_eq!(f.provider.realtime_intensity().await, Some(stale.clone()));
    assert_eq!(f.provider.cached().await, Some(stale));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let config = TrackerConfig {
        grid_request_timeout_secs: 1,
        ..config_with_token()
    };
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 300})).with_delay(Duration::from_secs(5)),
        MockLocationSource::fixed(48.85, 2.35),
        &config,
    );

    let started = std::time::Instant::now();
    assert_eq!(f.provider.realtime_intensity().await, None);
    assert!(started.elapsed() < Duration::from_secs(4));
}

// ═══════════════════════════════════════════════
// Query selection
// ═══════════════════════════════════════════════

#[tokio::test]
async fn queries_by_coordinates_when_location_is_known() {
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 300})),
        MockLocationSource::fixed(48.85, 2.35),
        &config_with_token(),
    );

    f.provider.realtime_intensity().await;

    assert_eq!(
        f.api.last_query(),
        Some(GridQuery::Coordinates(Coordinates {
            lat: 48.85,
            lon: 2.35
        }))
    );
    let queries = f.api.queries.lock().unwrap();
    assert_eq!(queries[0].1, "secret");
}

#[tokio::test]
async fn queries_fallback_zone_without_location() {
    let config = TrackerConfig {
        fallback_zone: "FR".into(),
        ..config_with_token()
    };
    let f = fixture(
        MockIntensityApi::returning(json!({"carbonIntensity": 60})),
        MockLocationSource::denied(),
        &config,
    );

    let result = f.provider.realtime_intensity().await.unwrap();

    assert_eq!(result.intensity, 60.0);
    assert_eq!(f.api.last_query(), Some(GridQuery::Zone("FR".into())));
    assert_eq!(f.location.calls(), 1);
}
