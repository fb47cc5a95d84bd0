//! Depth snapshot loader
//!
//! Fetches a full-depth REST snapshot used to (re)seed the book. There is no
//! retry here: a failed fetch ends the session and the host loop reconnects
//! after its fixed delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use types::depth::DepthSnapshot;
use types::errors::TransportError;

use crate::config::MirrorConfig;
use crate::events::DepthSnapshotRaw;

/// Anything that can produce a depth snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<DepthSnapshot, TransportError>;
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    async fn fetch(&self) -> Result<DepthSnapshot, TransportError> {
        (**self).fetch().await
    }
}

/// Snapshot loader backed by the exchange REST depth endpoint.
pub struct RestSnapshotLoader {
    client: Client,
    url: String,
    timeout: Duration,
}

impl RestSnapshotLoader {
    /// Build a loader for the configured symbol and depth limit.
    pub fn new(config: &MirrorConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            url: config.snapshot_url(),
            timeout: config.request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

#[async_trait]
impl SnapshotSource for RestSnapshotLoader {
    async fn fetch(&self) -> Result<DepthSnapshot, TransportError> {
        debug!(url = %self.url, "GET depth snapshot");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let raw: DepthSnapshotRaw = response.json().await.map_err(|e| self.map_error(e))?;
        let snapshot =
            DepthSnapshot::try_from(raw).map_err(|e| TransportError::Decode(e.to_string()))?;

        info!(
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Depth snapshot fetched"
        );
        Ok(snapshot)
    }
}
