use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use webcarbon::location::{CachedLocation, Coordinates, LocationResolver, MockLocationSource};
use webcarbon::store::{self, MemoryStore};

const FRESH_FOR: Duration = Duration::from_secs(30 * 60);
const LOOKUP_TIMEOUT: Duration = Duration::from_millis(100);
const HOUR_MS: i64 = 60 * 60 * 1000;

fn resolver(store: &Arc<MemoryStore>, source: &Arc<MockLocationSource>) -> LocationResolver {
    LocationResolver::new(store.clone(), source.clone(), FRESH_FOR, LOOKUP_TIMEOUT)
}

async fn seed(store: &MemoryStore, lat: f64, lon: f64, age_ms: i64) {
    let entry = CachedLocation {
        lat,
        lon,
        updated_at: Utc::now().timestamp_millis() - age_ms,
    };
    store::save(store, store::LOCATION_CACHE_KEY, &entry)
        .await
        .unwrap();
}

async fn stored(store: &MemoryStore) -> Option<CachedLocation> {
    store::load(store, store::LOCATION_CACHE_KEY).await.unwrap()
}

#[tokio::test]
async fn fresh_cache_skips_live_lookup() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::fixed(10.0, 10.0));
    seed(&store, 52.52, 13.40, 60_000).await;

    let coords = resolver(&store, &source).best_available().await;

    assert_eq!(coords, Some(Coordinates { lat: 52.52, lon: 13.40 }));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn live_lookup_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::fixed(40.71, -74.0));

    let coords = resolver(&store, &source).best_available().await;

    assert_eq!(coords, Some(Coordinates { lat: 40.71, lon: -74.0 }));
    let cached = stored(&store).await.unwrap();
    assert_eq!(cached.coordinates(), Coordinates { lat: 40.71, lon: -74.0 });
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn stale_cache_is_refreshed_when_lookup_works() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::fixed(35.68, 139.69));
    seed(&store, 52.52, 13.40, 2 * HOUR_MS).await;

    let coords = resolver(&store, &source).best_available().await;

    assert_eq!(coords, Some(Coordinates { lat: 35.68, lon: 139.69 }));
    assert_eq!(stored(&store).await.unwrap().lat, 35.68);
}

#[tokio::test]
async fn denied_lookup_falls_back_to_stale_cache() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::denied());
    seed(&store, 52.52, 13.40, 5 * HOUR_MS).await;

    let coords = resolver(&store, &source).best_available().await;

    assert_eq!(coords, Some(Coordinates { lat: 52.52, lon: 13.40 }));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn hanging_lookup_times_out() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::hanging());

    let started = std::time::Instant::now();
    let coords = resolver(&store, &source).best_available().await;

    assert_eq!(coords, None);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(stored(&store).await.is_none());
}

#[tokio::test]
async fn out_of_range_coordinates_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::fixed(123.0, 0.0));

    assert_eq!(resolver(&store, &source).best_available().await, None);
    assert!(stored(&store).await.is_none());
}

#[tokio::test]
async fn source_can_change_between_calls() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::denied());
    let resolver = resolver(&store, &source);

    assert_eq!(resolver.best_available().await, None);

    source.set_position(51.5, -0.12);
    assert_eq!(
        resolver.best_available().await,
        Some(Coordinates { lat: 51.5, lon: -0.12 })
    );

    source.deny();
    assert_eq!(
        resolver.best_available().await,
        Some(Coordinates { lat: 51.5, lon: -0.12 })
    );
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn future_dated_cache_is_not_trusted() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(MockLocationSource::fixed(48.85, 2.35));
    seed(&store, 52.52, 13.40, -HOUR_MS).await;

    let coords = resolver(&store, &source).best_available().await;

    assert_eq!(coords, Some(Coordinates { lat: 48.85, lon: 2.35 }));
    assert_eq!(source.calls(), 1);
    let cached = stored(&store).await.unwrap();
    assert!(cached.updated_at <= Utc::now().timestamp_millis());
}
