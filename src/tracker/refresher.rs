use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::grid::GridIntensityProvider;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Keeps the grid cache warm by refreshing on a fixed interval.
pub struct GridRefresher {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for GridRefresher {
    fn default() -> Self {
        Self::new()
    }
}

impl GridRefresher {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, provider: GridIntensityProvider, every: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("grid refresher already running");
        }
        if every.is_zero() {
            bail!("grid refresh interval must be non-zero");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(refresh_loop(provider, every, cancel_token.clone()));

        info!("Grid refresher started ({}s interval)", every.as_secs());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("grid refresher task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

async fn refresh_loop(provider: GridIntensityProvider, every: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match provider.realtime_intensity().await {
                    Some(reading) => log_debug!("grid cache at {} g/kWh", reading.intensity),
                    None => log_debug!("no grid reading available; baseline in use"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("grid refresher shutting down");
                break;
            }
        }
    }
}
