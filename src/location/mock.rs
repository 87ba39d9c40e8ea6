use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{Coordinates, LocationSource};

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Fixed(Coordinates),
    Denied,
    /// Never answers, like a permission prompt nobody clicks.
    Hang,
}

/// Test location source with a programmable answer and a call counter.
pub struct MockLocationSource {
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
}

impl MockLocationSource {
    pub fn fixed(lat: f64, lon: f64) -> Self {
        Self::with(Behavior::Fixed(Coordinates { lat, lon }))
    }

    pub fn denied() -> Self {
        Self::with(Behavior::Denied)
    }

    pub fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    fn with(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_position(&self, lat: f64, lon: f64) {
        *self.behavior.lock().unwrap() = Behavior::Fixed(Coordinates { lat, lon });
    }

    pub fn deny(&self) {
        *self.behavior.lock().unwrap() = Behavior::Denied;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationSource for MockLocationSource {
    async fn current_position(&self) -> Result<Coordinates> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Fixed(coords) => Ok(coords),
            Behavior::Denied => Err(anyhow!("location permission denied")),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Err(anyhow!("unreachable"))
            }
        }
    }
}
