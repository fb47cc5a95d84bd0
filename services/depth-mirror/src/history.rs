//! Bounded history of book captures for point-in-time queries
//!
//! At most one capture per wall-clock second is kept. Entries are immutable
//! once stored and shared as `Arc` so readers can hold one without keeping
//! the buffer locked. When the buffer grows past its capacity the oldest
//! capture is evicted (FIFO): retention is bounded by count, so the time
//! window it covers depends on how often captures happen.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use types::numeric::{Price, Quantity};

use crate::order_book::{BookSide, OrderBookState};

/// Immutable copy of the book taken at one wall-clock second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Unix seconds.
    pub captured_at: i64,
    pub bids: BookSide,
    pub asks: BookSide,
    pub last_update_id: u64,
}

impl HistoryEntry {
    fn capture(book: &OrderBookState, second: i64) -> Self {
        Self {
            captured_at: second,
            bids: book.bids().clone(),
            asks: book.asks().clone(),
            last_update_id: book.last_update_id(),
        }
    }

    /// Exact quantity at `price` in this capture, zero when absent.
    pub fn quantity_at(&self, price: Price) -> Quantity {
        self.bids
            .get(&price)
            .or_else(|| self.asks.get(&price))
            .copied()
            .unwrap_or(Quantity::ZERO)
    }
}

/// FIFO buffer of per-second captures.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<Arc<HistoryEntry>>,
    capacity: usize,
    evicted: u64,
}

impl HistoryBuffer {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            evicted: 0,
        }
    }

    /// Capture `book` unless an entry already exists for `now`'s second.
    ///
    /// A clock that steps backwards never produces an out-of-order entry.
    /// Returns whether a capture was appended.
    pub fn maybe_capture(&mut self, book: &OrderBookState, now: DateTime<Utc>) -> bool {
        let second = now.timestamp();
        if let Some(newest) = self.entries.back() {
            if second <= newest.captured_at {
                return false;
            }
        }

        self.entries
            .push_back(Arc::new(HistoryEntry::capture(book, second)));

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }

        debug!(
            captured_at = second,
            last_update_id = book.last_update_id(),
            history_len = self.entries.len(),
            "History captured"
        );
        true
    }

    /// Most recent entry with `captured_at <= timestamp`.
    pub fn find_at_or_before(&self, timestamp: i64) -> Option<Arc<HistoryEntry>> {
        let idx = self
            .entries
            .partition_point(|entry| entry.captured_at <= timestamp);
        if idx == 0 {
            None
        } else {
            self.entries.get(idx - 1).cloned()
        }
    }

    /// Oldest and newest capture seconds.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        match (self.entries.front(), self.entries.back()) {
            (Some(first), Some(last)) => Some((first.captured_at, last.captured_at)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total entries dropped by FIFO eviction.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
