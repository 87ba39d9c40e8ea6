use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::emissions::DEFAULT_DEVICE_WATTS;

pub const DEFAULT_GRID_API_URL: &str = "https://api.electricitymap.org/v3/carbon-intensity/latest";
pub const GRID_TOKEN_ENV: &str = "WEBCARBON_GRID_TOKEN";
pub const GRID_URL_ENV: &str = "WEBCARBON_GRID_URL";

/// Tunables for the tracker. Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    pub grid_api_url: String,
    /// Without a token the grid provider never calls out.
    pub grid_api_token: Option<String>,
    /// Zone queried when no device location is available.
    pub fallback_zone: String,
    pub grid_cache_ttl_secs: u64,
    pub grid_request_timeout_secs: u64,
    pub location_fresh_secs: u64,
    pub location_timeout_secs: u64,
    pub default_device_watts: f64,
    pub refresh_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            grid_api_url: DEFAULT_GRID_API_URL.into(),
            grid_api_token: None,
            fallback_zone: "DE".into(),
            grid_cache_ttl_secs: 10 * 60,
            grid_request_timeout_secs: 10,
            location_fresh_secs: 30 * 60,
            location_timeout_secs: 8,
            default_device_watts: DEFAULT_DEVICE_WATTS,
            refresh_interval_secs: 10 * 60,
        }
    }
}

impl TrackerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(GRID_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.grid_api_token = Some(token.trim().to_string());
            }
        }
        if let Ok(url) = std::env::var(GRID_URL_ENV) {
            if !url.trim().is_empty() {
                self.grid_api_url = url.trim().to_string();
            }
        }
        self
    }

    /// Token if one is configured and non-blank.
    pub fn grid_token(&self) -> Option<&str> {
        self.grid_api_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn grid_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.grid_cache_ttl_secs)
    }

    pub fn grid_request_timeout(&self) -> Duration {
        Duration::from_secs(self.grid_request_timeout_secs.max(1))
    }

    pub fn location_fresh(&self) -> Duration {
        Duration::from_secs(self.location_fresh_secs)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn device_watts(&self) -> f64 {
        if self.default_device_watts.is_finite() && self.default_device_watts >= 0.0 {
            self.default_device_watts
        } else {
            DEFAULT_DEVICE_WATTS
        }
    }
}

/// JSON-file backed config with in-place updates.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<TrackerConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring invalid config at {}: {err}", path.display());
                TrackerConfig::default()
            })
        } else {
            TrackerConfig::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn config(&self) -> TrackerConfig {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stored config with environment overrides layered on top.
    pub fn effective(&self) -> TrackerConfig {
        self.config().with_env_overrides()
    }

    pub fn set_grid_token(&self, token: Option<String>) -> Result<()> {
        self.update(|config| config.grid_api_token = token)
    }

    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut TrackerConfig),
    {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        change(&mut *guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &TrackerConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}
