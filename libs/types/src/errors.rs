//! Error types for the depth mirror
//!
//! Taxonomy using thiserror:
//! - `TransportError`: network failures, retried by the owning loop
//! - `DecodeError`: malformed upstream payloads, dropped and logged
//! - `ProtocolError`: sequence continuity violations, trigger a resync
//! - `QueryError`: invalid client input to the query surface

use thiserror::Error;

/// Network-level failure talking to the exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("HTTP error: {status} - {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Response decode failed: {0}")]
    Decode(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,
}

impl TransportError {
    /// Whether the failure came from the peer rather than our side.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            TransportError::HttpStatus { .. } | TransportError::ConnectionClosed
        )
    }
}

/// A single upstream message or value could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Invalid price: {0:?}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0:?}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Inverted update range: U={first_update_id} > u={final_update_id}")]
    InvertedRange {
        first_update_id: u64,
        final_update_id: u64,
    },
}

/// Sequence-continuity violation detected by the reconciliation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error(
        "Continuity broken: last_update_id={last_update_id}, event U={first_update_id}, pu={prev_final_update_id:?}"
    )]
    ContinuityBroken {
        last_update_id: u64,
        first_update_id: u64,
        prev_final_update_id: Option<u64>,
    },

    #[error("Snapshot {snapshot_id} predates stream: first event U={first_update_id}")]
    SnapshotTooOld {
        snapshot_id: u64,
        first_update_id: u64,
    },
}

/// Invalid input supplied to the query service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid timestamp: {timestamp} ({reason})")]
    InvalidTimestamp { timestamp: i64, reason: String },
}
