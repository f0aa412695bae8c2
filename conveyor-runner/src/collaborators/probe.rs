//! Liveness probers

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{LivenessProber, ProbeResult};

/// Probes a URL over HTTP
///
/// Any 2xx response counts as reachable; other statuses, connection errors
/// and timeouts count as unreachable.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Creates a prober whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LivenessProber for HttpProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        debug!("Probing {}", url);

        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => ProbeResult::Reachable,
            Ok(response) => ProbeResult::Unreachable(format!("HTTP {}", response.status())),
            Err(e) => ProbeResult::Unreachable(e.to_string()),
        }
    }
}

/// Reports every URL as reachable, for dry runs
#[derive(Debug, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl LivenessProber for AlwaysReachable {
    async fn probe(&self, url: &str) -> ProbeResult {
        info!("[dry-run] probe {}", url);
        ProbeResult::Reachable
    }
}
