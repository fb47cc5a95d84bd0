//! Depth feed types
//!
//! Exchange-agnostic forms of the two upstream payloads: the full depth
//! snapshot and the incremental diff event. Wire decoding lives with the
//! consumers; these types only carry validated values.

use serde::{Deserialize, Serialize};

use crate::numeric::{Price, Quantity};

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Resting buy interest
    Bid,
    /// Resting sell interest
    Ask,
}

/// A price with the total quantity resting at it.
///
/// In diffs a zero quantity is a removal instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub quantity: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }

    /// Whether this level deletes the price rather than setting it.
    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Full depth snapshot as served by the exchange REST endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// One incremental depth update.
///
/// Covers the update-id range `[first_update_id, final_update_id]`. When the
/// feed provides it, `prev_final_update_id` is the `final_update_id` of the
/// previous event on the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEvent {
    /// `U`
    pub first_update_id: u64,
    /// `u`
    pub final_update_id: u64,
    /// `pu`
    pub prev_final_update_id: Option<u64>,
    /// Exchange event time, Unix milliseconds.
    pub event_time_ms: Option<i64>,
    pub bid_changes: Vec<PriceLevel>,
    pub ask_changes: Vec<PriceLevel>,
}

impl DiffEvent {
    /// Whether `update_id` falls inside this event's range.
    pub fn covers(&self, update_id: u64) -> bool {
        self.first_update_id <= update_id && update_id <= self.final_update_id
    }

    /// Whether this event directly continues a book at `last_update_id`.
    ///
    /// Uses `pu` when present, otherwise requires `U == last_update_id + 1`.
    pub fn follows(&self, last_update_id: u64) -> bool {
        match self.prev_final_update_id {
            Some(pu) => pu == last_update_id,
            None => self.first_update_id == last_update_id.saturating_add(1),
        }
    }

    /// Total number of level changes carried.
    pub fn change_count(&self) -> usize {
        self.bid_changes.len() + self.ask_changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(first: u64, last: u64, prev: Option<u64>) -> DiffEvent {
        DiffEvent {
            first_update_id: first,
            final_update_id: last,
            prev_final_update_id: prev,
            event_time_ms: None,
            bid_changes: vec![],
            ask_changes: vec![],
        }
    }

    #[test]
    fn test_covers_is_inclusive() {
        let e = event(100, 105, Some(99));
        assert!(e.covers(100));
        assert!(e.covers(105));
        assert!(!e.covers(99));
        assert!(!e.covers(106));
    }

    #[test]
    fn test_follows_prefers_prev_final_id() {
        let e = event(120, 130, Some(101));
        assert!(e.follows(101));
        assert!(!e.follows(119));
    }

    #[test]
    fn test_follows_without_prev_final_id() {
        let e = event(102, 110, None);
        assert!(e.follows(101));
        assert!(!e.follows(100));
    }

    #[test]
    fn test_removal_level() {
        let level = PriceLevel::new("10.0".parse().unwrap(), Quantity::ZERO);
        assert!(level.is_removal());
    }
}
