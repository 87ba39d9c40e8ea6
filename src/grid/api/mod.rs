pub mod mock;
pub mod real;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::location::Coordinates;

pub use mock::MockIntensityApi;
pub use real::HttpIntensityApi;

/// What the carbon-intensity endpoint is asked about.
#[derive(Debug, Clone, PartialEq)]
pub enum GridQuery {
    Coordinates(Coordinates),
    Zone(String),
}

impl GridQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            GridQuery::Coordinates(coords) => vec![
                ("lat", format!("{:.4}", coords.lat)),
                ("lon", format!("{:.4}", coords.lon)),
            ],
            GridQuery::Zone(zone) => vec![("zone", zone.clone())],
        }
    }
}

/// Carbon-intensity endpoint. Non-2xx responses are errors.
#[async_trait]
pub trait IntensityApi: Send + Sync {
    async fn fetch(&self, query: &GridQuery, token: &str) -> Result<Value>;
}
