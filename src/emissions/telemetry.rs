use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::BYTES_PER_MB;

/// Per-session measurement handed over by the host's resource observer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    #[serde(rename = "totalMB", default)]
    pub total_mb: f64,
    #[serde(rename = "videoMB", default)]
    pub video_mb: f64,
    /// Active minutes in the foreground.
    #[serde(default)]
    pub time_active: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_counts: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_watts: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_intensity: Option<f64>,
}

impl Telemetry {
    pub fn total_bytes(&self) -> f64 {
        self.total_mb * BYTES_PER_MB
    }

    pub fn video_bytes(&self) -> f64 {
        self.video_mb * BYTES_PER_MB
    }
}
