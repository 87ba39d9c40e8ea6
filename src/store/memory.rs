use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::RecordStore;
use crate::models::EventRecord;

/// In-process store for hosts without persistence and for tests.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    events: Mutex<Vec<EventRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.events.lock().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn put_raw(&self, key: &str, value: String) -> Result<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn append_event(&self, event: &EventRecord) -> Result<()> {
        let mut events = self.events.lock().await;
        if events.iter().any(|existing| existing.id == event.id) {
            bail!("event {} already recorded", event.id);
        }
        events.push(event.clone());
        Ok(())
    }

    async fn commit_event(&self, event: &EventRecord, records: Vec<(String, String)>) -> Result<()> {
        // Always events then values, so a commit never interleaves with another.
        let mut events = self.events.lock().await;
        let mut values = self.values.lock().await;
        if events.iter().any(|existing| existing.id == event.id) {
            bail!("event {} already recorded", event.id);
        }
        events.push(event.clone());
        values.extend(records);
        Ok(())
    }

    async fn events_between(&self, start_ms: i64, end_ms: i64) -> Result<Vec<EventRecord>> {
        let events = self.events.lock().await;
        let mut selected: Vec<EventRecord> = events
            .iter()
            .filter(|event| event.timestamp >= start_ms && event.timestamp < end_ms)
            .cloned()
            .collect();
        selected.sort_by_key(|event| event.timestamp);
        Ok(selected)
    }
}
