//! Persistent record store abstraction.
//!
//! Singletons (grid cache, location cache, goal, goal history, achievement
//! unlocks) and daily summaries are JSON values under string keys. Event
//! records live in a separate append-only log queried by timestamp. The
//! totals derived from an event are committed together with it.

pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::models::EventRecord;

pub use memory::MemoryStore;

pub const GRID_CACHE_KEY: &str = "gridIntensityCache";
pub const LOCATION_CACHE_KEY: &str = "locationCache";
pub const GOAL_KEY: &str = "carbonGoal";
pub const GOAL_HISTORY_KEY: &str = "goalHistory";
pub const ACHIEVEMENTS_KEY: &str = "achievements";
pub const LIFETIME_KEY: &str = "lifetimeTotals";
const DAILY_PREFIX: &str = "daily:";

pub fn daily_key(date_key: &str) -> String {
    format!("{DAILY_PREFIX}{date_key}")
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn put_raw(&self, key: &str, value: String) -> Result<()>;

    /// Appends an event. A second append with the same id is rejected.
    async fn append_event(&self, event: &EventRecord) -> Result<()>;

    /// Appends `event` and writes `records` as one unit: either all of it
    /// lands or none of it does.
    async fn commit_event(&self, event: &EventRecord, records: Vec<(String, String)>) -> Result<()>;

    /// Events with `start_ms <= timestamp < end_ms`, oldest first.
    async fn events_between(&self, start_ms: i64, end_ms: i64) -> Result<Vec<EventRecord>>;
}

pub async fn load<T>(store: &dyn RecordStore, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    match store.get_raw(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("failed to decode stored value for '{key}'"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub async fn save<T>(store: &dyn RecordStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + Sync,
{
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to encode value for '{key}'"))?;
    store.put_raw(key, raw).await
}
