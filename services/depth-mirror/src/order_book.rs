//! In-memory order book replica
//!
//! Maintains the mirrored price-level state for one symbol.
//! Uses `BTreeMap` for sorted iteration, which both the depth views and the
//! nearest-level search rely on. All arithmetic uses `Decimal`.
//!
//! The book accepts:
//! - Upserts: set the resting quantity at a price
//! - Removals: a zero quantity deletes the level
//! - Wholesale replacement from a fresh depth snapshot
//!
//! A zero-quantity entry is never stored.

use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use types::depth::{DepthSnapshot, PriceLevel, Side};
use types::ids::Symbol;
use types::numeric::{Price, Quantity};

/// One side of the book: price → resting quantity.
pub type BookSide = BTreeMap<Price, Quantity>;

/// Result of a nearest-level search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NearestLevel {
    /// Price of the closest resting level, or the target on an empty book.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    /// `price - target` (signed).
    #[serde(with = "rust_decimal::serde::float")]
    pub price_difference: Decimal,
    /// Side the level rests on; None when the book is empty.
    pub side: Option<Side>,
}

/// In-memory order book mirror for a single symbol.
///
/// Bids iterate in descending price order (best bid first) through
/// [`OrderBookState::bid_levels`]; asks in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBookState {
    /// Exchange symbol.
    pub symbol: Symbol,
    bids: BookSide,
    asks: BookSide,
    /// Sequence id of the most recent snapshot or applied diff.
    last_update_id: u64,
    /// Wall-clock time of the last mutation.
    captured_at: DateTime<Utc>,
}

impl OrderBookState {
    /// Create an empty order book for the given symbol.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            captured_at: DateTime::<Utc>::default(),
        }
    }

    /// Build a book from a depth snapshot. Zero-quantity levels are skipped.
    pub fn from_snapshot(symbol: Symbol, snapshot: &DepthSnapshot, now: DateTime<Utc>) -> Self {
        let mut book = Self::new(symbol);
        book.replace(snapshot, now);
        book
    }

    /// Replace the whole book with a fresh snapshot.
    pub fn replace(&mut self, snapshot: &DepthSnapshot, now: DateTime<Utc>) {
        self.bids = collect_side(&snapshot.bids);
        self.asks = collect_side(&snapshot.asks);
        self.last_update_id = snapshot.last_update_id;
        self.captured_at = now;
    }

    /// Set the quantity at a price. A zero quantity removes the level.
    pub fn upsert(&mut self, side: Side, price: Price, quantity: Quantity) {
        if quantity.is_zero() {
            self.remove(side, price);
            return;
        }
        self.side_mut(side).insert(price, quantity);
    }

    /// Remove a price level. Returns the quantity that was resting there.
    pub fn remove(&mut self, side: Side, price: Price) -> Option<Quantity> {
        self.side_mut(side).remove(&price)
    }

    /// Apply a batch of bid and ask changes and advance the update id.
    ///
    /// Inputs are already validated, so this cannot fail part-way; callers
    /// hold the write lock for the whole call.
    pub fn apply_changes(
        &mut self,
        bid_changes: &[PriceLevel],
        ask_changes: &[PriceLevel],
        final_update_id: u64,
        now: DateTime<Utc>,
    ) {
        for level in bid_changes {
            self.upsert(Side::Bid, level.price, level.quantity);
        }
        for level in ask_changes {
            self.upsert(Side::Ask, level.price, level.quantity);
        }
        self.last_update_id = final_update_id;
        self.captured_at = now;
    }

    /// Deep copy for history capture and readers.
    pub fn snapshot_copy(&self) -> Self {
        self.clone()
    }

    /// Exact quantity at `price`, looking at bids then asks.
    pub fn quantity_at(&self, price: Price) -> Option<Quantity> {
        self.bids
            .get(&price)
            .or_else(|| self.asks.get(&price))
            .copied()
    }

    /// Find the resting level closest to `target` across both sides.
    ///
    /// Ties resolve to the lower price; if both sides rest at the same price
    /// the bid wins. An empty book yields the target itself with zero
    /// quantity.
    pub fn nearest_level(&self, target: Decimal) -> NearestLevel {
        let mut best: Option<(Side, Price, Quantity)> = None;

        for (side, levels) in [(Side::Bid, &self.bids), (Side::Ask, &self.asks)] {
            for (price, quantity) in neighbours(levels, target) {
                let closer = match best {
                    None => true,
                    Some((_, best_price, _)) => {
                        let d = price.distance(target);
                        let best_d = best_price.distance(target);
                        d < best_d || (d == best_d && price < best_price)
                    }
                };
                if closer {
                    best = Some((side, price, quantity));
                }
            }
        }

        match best {
            Some((side, price, quantity)) => NearestLevel {
                price: price.as_decimal(),
                quantity: quantity.as_decimal(),
                price_difference: price.as_decimal() - target,
                side: Some(side),
            },
            None => NearestLevel {
                price: target,
                quantity: Decimal::ZERO,
                price_difference: Decimal::ZERO,
                side: None,
            },
        }
    }

    /// Get the current best bid.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// Get the current best ask.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.iter().next().map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// Get all bid levels (descending price order).
    pub fn bid_levels(&self) -> Vec<PriceLevel> {
        self.bids
            .iter()
            .rev()
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect()
    }

    /// Get all ask levels (ascending price order).
    pub fn ask_levels(&self) -> Vec<PriceLevel> {
        self.asks
            .iter()
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect()
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// Number of bid price levels.
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of ask price levels.
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Last applied update id.
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }
}

fn collect_side(levels: &[PriceLevel]) -> BookSide {
    levels
        .iter()
        .filter(|level| !level.is_removal())
        .map(|level| (level.price, level.quantity))
        .collect()
}

/// The floor and ceiling entries around `target`; the only candidates for
/// the nearest level on one side.
fn neighbours(levels: &BookSide, target: Decimal) -> Vec<(Price, Quantity)> {
    let Some(pivot) = Price::try_new(target) else {
        // Non-positive target: every price is above it, the lowest is closest.
        return levels.iter().next().map(|(p, q)| (*p, *q)).into_iter().collect();
    };

    let floor = levels
        .range((Bound::Unbounded, Bound::Included(pivot)))
        .next_back();
    let ceiling = levels
        .range((Bound::Excluded(pivot), Bound::Unbounded))
        .next();

    floor
        .into_iter()
        .chain(ceiling)
        .map(|(p, q)| (*p, *q))
        .collect()
}
