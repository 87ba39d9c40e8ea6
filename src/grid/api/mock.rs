use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{GridQuery, IntensityApi};

/// Test endpoint: returns a preset body (or error) after an optional delay
/// and records every query it receives.
pub struct MockIntensityApi {
    response: Mutex<Result<Value, String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    pub queries: Mutex<Vec<(GridQuery, String)>>,
}

impl MockIntensityApi {
    pub fn returning(body: Value) -> Self {
        Self {
            response: Mutex::new(Ok(body)),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let api = Self::returning(Value::Null);
        api.set_error(message);
        api
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn set_body(&self, body: Value) {
        *self.response.lock().unwrap() = Ok(body);
    }

    pub fn set_error(&self, message: &str) {
        *self.response.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<GridQuery> {
        self.queries
            .lock()
            .unwrap()
            .last()
            .map(|(query, _)| query.clone())
    }
}

#[async_trait]
impl IntensityApi for MockIntensityApi {
    async fn fetch(&self, query: &GridQuery, token: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap()
            .push((query.clone(), token.to_string()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let response = self.response.lock().unwrap().clone();
        response.map_err(|message| anyhow!(message))
    }
}
