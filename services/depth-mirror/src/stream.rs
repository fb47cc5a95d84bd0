//! Diff stream consumer
//!
//! Opens the exchange WebSocket and yields decoded depth diffs in receipt
//! order. The stream never reconnects itself: a close, end of stream, or
//! socket error is returned to the caller, which decides when to retry.
//! Malformed frames are logged, counted, and skipped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use types::depth::DiffEvent;
use types::errors::TransportError;

use crate::config::MirrorConfig;
use crate::events::decode_stream_message;
use crate::metrics::MirrorMetrics;

/// An open source of diff events.
#[async_trait]
pub trait DiffStream: Send {
    /// Next depth diff. Errors are terminal for this stream.
    async fn next_event(&mut self) -> Result<DiffEvent, TransportError>;

    /// Close the underlying connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens diff streams.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    type Stream: DiffStream;

    async fn connect(&self) -> Result<Self::Stream, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for the exchange combined-stream WebSocket endpoint.
pub struct WsStreamConnector {
    url: String,
    connect_timeout: Duration,
    metrics: Arc<MirrorMetrics>,
}

impl WsStreamConnector {
    pub fn new(config: &MirrorConfig, metrics: Arc<MirrorMetrics>) -> Self {
        Self::with_url(config.stream_url(), config.connect_timeout, metrics)
    }

    pub fn with_url(url: String, connect_timeout: Duration, metrics: Arc<MirrorMetrics>) -> Self {
        Self {
            url,
            connect_timeout,
            metrics,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamConnector for WsStreamConnector {
    type Stream = WsDiffStream;

    async fn connect(&self) -> Result<WsDiffStream, TransportError> {
        info!(url = %self.url, "Connecting to depth stream");

        let result = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await;
        match result {
            Ok(Ok((ws, _response))) => {
                info!(url = %self.url, "Depth stream connected");
                Ok(WsDiffStream {
                    ws,
                    closed: false,
                    metrics: Arc::clone(&self.metrics),
                })
            }
            Ok(Err(e)) => Err(TransportError::Connect(e.to_string())),
            Err(_) => Err(TransportError::Timeout {
                millis: self.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

/// A live WebSocket diff stream.
pub struct WsDiffStream {
    ws: WsStream,
    closed: bool,
    metrics: Arc<MirrorMetrics>,
}

impl WsDiffStream {
    /// Decode a text payload; `None` means skip it.
    fn decode(&self, text: &str) -> Option<DiffEvent> {
        match decode_stream_message(text) {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                debug!("Ignoring non-depth message");
                None
            }
            Err(e) => {
                self.metrics.record_decode_error();
                warn!(error = %e, "Dropping malformed depth message");
                None
            }
        }
    }
}

#[async_trait]
impl DiffStream for WsDiffStream {
    async fn next_event(&mut self) -> Result<DiffEvent, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        loop {
            let message = match self.ws.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(TransportError::Socket(e.to_string()));
                }
                None => {
                    self.closed = true;
                    return Err(TransportError::ConnectionClosed);
                }
            };

            match message {
                Message::Text(text) => {
                    if let Some(event) = self.decode(&text) {
                        return Ok(event);
                    }
                }
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        if let Some(event) = self.decode(text) {
                            return Ok(event);
                        }
                    }
                    Err(_) => {
                        self.metrics.record_decode_error();
                        warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame");
                    }
                },
                Message::Ping(payload) => {
                    self.ws
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| TransportError::Socket(e.to_string()))?;
                }
                Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(frame) => {
                    info!(frame = ?frame, "Depth stream closed by server");
                    self.closed = true;
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "Error closing depth stream");
        }
    }
}
