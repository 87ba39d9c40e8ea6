use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::Category;
use crate::emissions::Telemetry;

/// Telemetry plus the grid conditions resolved when the record was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(flatten)]
    pub telemetry: Telemetry,
    pub grid_intensity: f64,
    pub grid_zone: Option<String>,
    pub grid_multiplier: Option<f64>,
    pub grid_is_estimated: Option<bool>,
    pub device_watts_used: f64,
}

/// One finalized browsing session. Never mutated once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub category: Category,
    pub platform: String,
    pub data: EventData,
    pub carbon_grams: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_rate: Option<f64>,
}

impl EventRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        category: Category,
        platform: impl Into<String>,
        data: EventData,
        carbon_grams: f64,
        carbon_rate: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: timestamp.timestamp_millis(),
            category,
            platform: platform.into(),
            data,
            carbon_grams,
            carbon_rate,
        }
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}
