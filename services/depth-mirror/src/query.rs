//! Read-side API over the live book and its history
//!
//! Every call copies what it needs under a short-held lock, so queries never
//! block the writer for longer than a clone.
//!
//! Live and historical lookups differ on purpose: a live `quantity_at`
//! resolves to the nearest resting level, while a historical one returns the
//! exact level or zero.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use types::errors::QueryError;
use types::numeric::Price;

use crate::history::HistoryEntry;
use crate::ingestion::SyncState;
use crate::mirror::MirrorHandle;
use crate::order_book::{NearestLevel, OrderBookState};

/// 9999-12-31T23:59:59Z in unix seconds. Anything larger is almost
/// certainly a millisecond timestamp.
pub const MAX_TIMESTAMP_SECS: i64 = 253_402_300_799;

/// Quantity resolved for a requested price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityAt {
    pub actual_price: Decimal,
    pub quantity: Decimal,
}

/// Quantity at a price plus its change over the preceding second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityDifference {
    pub actual_price: Decimal,
    pub quantity: Decimal,
    pub difference: Decimal,
    /// True when the live nearest-level fallback was used.
    pub is_nearest_level: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorStatus {
    pub symbol: String,
    pub is_connected: bool,
    pub last_update_id: u64,
    pub bids_count: usize,
    pub asks_count: usize,
    pub history_count: usize,
    pub sync_state: SyncState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryInfo {
    pub history_count: usize,
    pub time_range: TimeRange,
}

/// Query facade shared by the HTTP handlers.
#[derive(Clone)]
pub struct QueryService {
    handle: Arc<MirrorHandle>,
}

impl QueryService {
    pub fn new(handle: Arc<MirrorHandle>) -> Self {
        Self { handle }
    }

    /// Deep copy of the live book.
    pub fn current_book(&self) -> OrderBookState {
        self.handle.read_book().snapshot_copy()
    }

    /// Quantity at `price`, live (nearest level) or at `timestamp` (exact).
    pub fn quantity_at(&self, price: Decimal, timestamp: Option<i64>) -> Result<QuantityAt, QueryError> {
        let price = validate_price(price)?;
        match timestamp {
            None => {
                let nearest = self.handle.read_book().nearest_level(price.as_decimal());
                Ok(QuantityAt {
                    actual_price: nearest.price,
                    quantity: nearest.quantity,
                })
            }
            Some(ts) => {
                let ts = validate_timestamp(ts)?;
                Ok(self.historical_quantity(price, ts))
            }
        }
    }

    /// Closest resting level to `target` on the live book.
    pub fn nearest_level(&self, target: Decimal) -> Result<NearestLevel, QueryError> {
        let target = validate_price(target)?;
        Ok(self.handle.read_book().nearest_level(target.as_decimal()))
    }

    /// Quantity at `timestamp` minus the quantity one second earlier.
    ///
    /// Without a timestamp this is the live nearest level with a zero
    /// difference.
    pub fn quantity_difference(
        &self,
        price: Decimal,
        timestamp: Option<i64>,
    ) -> Result<QuantityDifference, QueryError> {
        let price = validate_price(price)?;
        let Some(ts) = timestamp else {
            let nearest = self.handle.read_book().nearest_level(price.as_decimal());
            return Ok(QuantityDifference {
                actual_price: nearest.price,
                quantity: nearest.quantity,
                difference: Decimal::ZERO,
                is_nearest_level: true,
            });
        };

        let ts = validate_timestamp(ts)?;
        // Both lookups under one guard so a capture cannot land between them.
        let (current_entry, previous_entry) = {
            let history = self.handle.history();
            let current = history.find_at_or_before(ts);
            let previous = history.find_at_or_before(ts - 1);
            (current, previous)
        };
        let current = quantity_in(current_entry.as_deref(), price);
        let previous = quantity_in(previous_entry.as_deref(), price);

        let difference = if current.actual_price == previous.actual_price {
            current.quantity - previous.quantity
        } else {
            Decimal::ZERO
        };

        Ok(QuantityDifference {
            actual_price: current.actual_price,
            quantity: current.quantity,
            difference,
            is_nearest_level: false,
        })
    }

    pub fn status(&self) -> MirrorStatus {
        let (last_update_id, bids_count, asks_count) = {
            let book = self.handle.read_book();
            (book.last_update_id(), book.bid_depth(), book.ask_depth())
        };
        MirrorStatus {
            symbol: self.handle.symbol().to_string(),
            is_connected: self.handle.is_connected(),
            last_update_id,
            bids_count,
            asks_count,
            history_count: self.handle.history().len(),
            sync_state: self.handle.sync_state(),
        }
    }

    pub fn history_info(&self) -> HistoryInfo {
        let history = self.handle.history();
        let range = history.time_range();
        HistoryInfo {
            history_count: history.len(),
            time_range: TimeRange {
                start: range.map(|(start, _)| start),
                end: range.map(|(_, end)| end),
            },
        }
    }

    /// Mirror counters plus history evictions.
    pub fn metrics(&self) -> BTreeMap<String, u64> {
        let mut metrics = self.handle.metrics().export();
        metrics.insert("history_evictions".to_string(), self.handle.history().evicted());
        metrics
    }

    fn historical_quantity(&self, price: Price, ts: i64) -> QuantityAt {
        let entry = self.handle.history().find_at_or_before(ts);
        quantity_in(entry.as_deref(), price)
    }
}

/// Exact quantity at `price` in `entry`, zero when there is no entry.
fn quantity_in(entry: Option<&HistoryEntry>, price: Price) -> QuantityAt {
    QuantityAt {
        actual_price: price.as_decimal(),
        quantity: entry
            .map(|entry| entry.quantity_at(price).as_decimal())
            .unwrap_or(Decimal::ZERO),
    }
}

/// Prices must be strictly positive.
pub fn validate_price(price: Decimal) -> Result<Price, QueryError> {
    Price::try_new(price).ok_or_else(|| QueryError::InvalidPrice(format!("{} must be greater than 0", price)))
}

/// Timestamps are non-negative unix seconds.
pub fn validate_timestamp(timestamp: i64) -> Result<i64, QueryError> {
    if timestamp < 0 {
        return Err(QueryError::InvalidTimestamp {
            timestamp,
            reason: "must not be negative".to_string(),
        });
    }
    if timestamp > MAX_TIMESTAMP_SECS {
        return Err(QueryError::InvalidTimestamp {
            timestamp,
            reason: "expected unix seconds, got what looks like milliseconds".to_string(),
        });
    }
    Ok(timestamp)
}
