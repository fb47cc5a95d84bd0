//! Depth Mirror
//!
//! Keeps a local replica of an exchange limit order book for one symbol:
//! - Seeds the book from a REST depth snapshot
//! - Applies WebSocket depth diffs in sequence, resyncing on any gap
//! - Keeps a per-second history of the book for point-in-time queries
//! - Serves nearest-level, quantity, and quantity-difference lookups
//!
//! # Architecture
//!
//! ```text
//!  REST snapshot      WebSocket diffs
//!        │                  │
//!    ┌───▼────┐        ┌────▼───┐
//!    │Snapshot│        │ Stream │  ← decode, skip malformed frames
//!    └───┬────┘        └────┬───┘
//!        │   ┌──────────┐   │
//!        └──►│Reconciler│◄──┘      ← continuity checks, resync on gaps
//!            └────┬─────┘
//!                 │  (write lock)
//!          ┌──────▼──────┐
//!          │ MirrorHandle│──► History (one capture per second)
//!          └──────┬──────┘
//!                 │  (read lock)
//!          ┌──────▼──────┐
//!          │QueryService │  ← HTTP gateway
//!          └─────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod ingestion;
pub mod metrics;
pub mod mirror;
pub mod order_book;
pub mod query;
pub mod snapshot;
pub mod stream;

pub use config::MirrorConfig;
pub use error::{MirrorError, MirrorResult};
pub use mirror::{run_ingestion, MirrorHandle};
pub use query::QueryService;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
