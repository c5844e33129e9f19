//! Liveness pings sent to an external monitor after each worker iteration.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;

#[async_trait]
pub trait Heartbeat: Send + Sync {
    async fn beat(&self, status: &str, elapsed_ms: u64) -> anyhow::Result<()>;
}

/// `GET {url}?msg=<status>&ping=<elapsed_ms>`.
pub struct HttpHeartbeat {
    client: reqwest::Client,
    url: String,
}

impl HttpHeartbeat {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Url::parse(url).with_context(|| format!("invalid heartbeat url '{url}'"))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    fn request_url(&self, status: &str, elapsed_ms: u64) -> anyhow::Result<Url> {
        let ping = elapsed_ms.to_string();
        let url = Url::parse_with_params(&self.url, &[("msg", status), ("ping", ping.as_str())])?;
        Ok(url)
    }
}

#[async_trait]
impl Heartbeat for HttpHeartbeat {
    async fn beat(&self, status: &str, elapsed_ms: u64) -> anyhow::Result<()> {
        let url = self.request_url(status, elapsed_ms)?;
        self.client
            .get(url)
            .send()
            .await
            .context("heartbeat request failed")?
            .error_for_status()
            .context("heartbeat rejected")?;
        Ok(())
    }
}

/// Used when no monitor is configured.
pub struct NoopHeartbeat;

#[async_trait]
impl Heartbeat for NoopHeartbeat {
    async fn beat(&self, _status: &str, _elapsed_ms: u64) -> anyhow::Result<()> {
        Ok(())
    }
}
