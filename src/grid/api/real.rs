use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{GridQuery, IntensityApi};

const USER_AGENT: &str = concat!("webcarbon/", env!("CARGO_PKG_VERSION"));

pub struct HttpIntensityApi {
    client: reqwest::Client,
    url: String,
}

impl HttpIntensityApi {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IntensityApi for HttpIntensityApi {
    async fn fetch(&self, query: &GridQuery, token: &str) -> Result<Value> {
        let response = self
            .client
            .get(&self.url)
            .query(&query.params())
            .header("auth-token", token)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("carbon intensity request to {} failed", self.url))?;

        if !response.status().is_success() {
            bail!("carbon intensity API error: {}", response.status());
        }

        response
            .json::<Value>()
            .await
            .context("carbon intensity response was not JSON")
    }
}
