//! Carbon accounting for web browsing sessions.
//!
//! Session telemetry (bytes moved, active time, device power) is turned into
//! grams of CO2 at the current regional grid intensity, persisted as an
//! append-only event log, and rolled up into daily summaries, weekly goals,
//! achievements and recommendations. [`CarbonTracker`] wires it together.

pub mod achievements;
pub mod activity;
pub mod aggregate;
pub mod config;
pub mod db;
pub mod emissions;
pub mod goals;
pub mod grid;
pub mod location;
pub mod models;
pub mod notify;
pub mod recommendations;
pub mod store;
pub mod summary;
pub mod tracker;
mod utils;

pub use activity::Category;
pub use config::{ConfigStore, TrackerConfig};
pub use db::Database;
pub use emissions::{EmissionParams, Telemetry};
pub use grid::{GridIntensity, GridIntensityProvider};
pub use location::{Coordinates, LocationResolver, LocationSource};
pub use models::{EventData, EventRecord};
pub use notify::{Notifier, TrackerEvent};
pub use store::{MemoryStore, RecordStore};
pub use tracker::{CarbonTracker, GridRefresher};

/// Initialises `env_logger` (reads `RUST_LOG`, defaults to info). Safe to
/// call more than once.
pub fn init_logging() {
    let initialised = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();

    if initialised.is_ok() {
        log::info!("webcarbon logging initialised");
    }
}
