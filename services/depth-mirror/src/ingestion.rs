//! Diff reconciliation for the depth mirror
//!
//! Validates incoming diff events against the book's update id, applies the
//! ones that continue the sequence, and detects desynchronization.
//!
//! Sequencing rules:
//! - After a snapshot at `L`, events with `u <= L` are already covered and
//!   dropped; the first event with `U <= L + 1 <= u` bridges the snapshot.
//! - Once synced, each event must continue the previous one: `pu == last`
//!   when the feed carries `pu`, otherwise `U == last + 1`.
//! - Any break drops the event and asks the caller for a fresh snapshot.
//!
//! The reconciler never owns the book; the caller passes it in under its
//! write lock so that a whole event lands in one critical section.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use types::depth::{DepthSnapshot, DiffEvent};
use types::errors::ProtocolError;

use crate::order_book::OrderBookState;

/// Synchronization state of the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// No usable snapshot; every event is dropped.
    Unsynced,
    /// Snapshot loaded, waiting for the event that bridges it.
    Syncing,
    /// Applying events in sequence.
    Synced,
}

/// Why an event was dropped without being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No snapshot loaded yet.
    AwaitingSnapshot,
    /// Already covered by the snapshot or a previous event.
    Stale,
}

/// Result of reconciling a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Event applied; the book is now at `last_update_id`.
    Applied { last_update_id: u64, bridged: bool },
    /// Event ignored.
    Dropped(DropReason),
    /// Sequence broken; the caller must load a fresh snapshot.
    ResyncRequired(ProtocolError),
}

/// State machine that keeps an `OrderBookState` consistent with the feed.
#[derive(Debug)]
pub struct DepthReconciler {
    state: SyncState,
    /// Total events applied.
    events_applied: u64,
    /// Total events dropped (stale or pre-snapshot).
    events_dropped: u64,
    /// Total resyncs requested after a continuity break.
    resyncs_requested: u64,
}

impl DepthReconciler {
    pub fn new() -> Self {
        Self {
            state: SyncState::Unsynced,
            events_applied: 0,
            events_dropped: 0,
            resyncs_requested: 0,
        }
    }

    /// Current synchronization state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Forget sync progress, e.g. after the stream reconnects.
    ///
    /// The book keeps its contents so readers still see the last good state.
    pub fn reset(&mut self) {
        self.state = SyncState::Unsynced;
    }

    /// Replace the book with a fresh snapshot and wait for a bridging event.
    pub fn load_snapshot(
        &mut self,
        book: &mut OrderBookState,
        snapshot: &DepthSnapshot,
        now: DateTime<Utc>,
    ) {
        book.replace(snapshot, now);
        self.state = SyncState::Syncing;

        info!(
            symbol = %book.symbol,
            last_update_id = snapshot.last_update_id,
            bids = book.bid_depth(),
            asks = book.ask_depth(),
            "Depth snapshot loaded"
        );
    }

    /// Reconcile one event against `book`.
    pub fn process(
        &mut self,
        book: &mut OrderBookState,
        event: &DiffEvent,
        now: DateTime<Utc>,
    ) -> ReconcileResult {
        let last = book.last_update_id();

        match self.state {
            SyncState::Unsynced => self.drop_event(event, last, DropReason::AwaitingSnapshot),

            SyncState::Syncing => {
                if event.final_update_id <= last {
                    return self.drop_event(event, last, DropReason::Stale);
                }

                if event.covers(last.saturating_add(1)) {
                    self.apply(book, event, now);
                    self.state = SyncState::Synced;
                    info!(
                        symbol = %book.symbol,
                        snapshot_id = last,
                        first_update_id = event.first_update_id,
                        final_update_id = event.final_update_id,
                        "Depth book synchronized"
                    );
                    return ReconcileResult::Applied {
                        last_update_id: event.final_update_id,
                        bridged: true,
                    };
                }

                // U > L + 1: the stream is already past the snapshot.
                self.request_resync(ProtocolError::SnapshotTooOld {
                    snapshot_id: last,
                    first_update_id: event.first_update_id,
                })
            }

            SyncState::Synced => {
                if event.final_update_id <= last {
                    return self.drop_event(event, last, DropReason::Stale);
                }

                if !event.follows(last) {
                    return self.request_resync(ProtocolError::ContinuityBroken {
                        last_update_id: last,
                        first_update_id: event.first_update_id,
                        prev_final_update_id: event.prev_final_update_id,
                    });
                }

                self.apply(book, event, now);
                ReconcileResult::Applied {
                    last_update_id: event.final_update_id,
                    bridged: false,
                }
            }
        }
    }

    /// Total events applied since creation.
    pub fn events_applied(&self) -> u64 {
        self.events_applied
    }

    /// Total events dropped since creation.
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped
    }

    /// Total resyncs requested since creation.
    pub fn resyncs_requested(&self) -> u64 {
        self.resyncs_requested
    }

    fn apply(&mut self, book: &mut OrderBookState, event: &DiffEvent, now: DateTime<Utc>) {
        book.apply_changes(
            &event.bid_changes,
            &event.ask_changes,
            event.final_update_id,
            now,
        );
        self.events_applied += 1;
        debug!(
            final_update_id = event.final_update_id,
            changes = event.change_count(),
            "Depth event applied"
        );
    }

    fn drop_event(&mut self, event: &DiffEvent, last: u64, reason: DropReason) -> ReconcileResult {
        self.events_dropped += 1;
        debug!(
            first_update_id = event.first_update_id,
            final_update_id = event.final_update_id,
            last_update_id = last,
            reason = ?reason,
            "Dropping depth event"
        );
        ReconcileResult::Dropped(reason)
    }

    fn request_resync(&mut self, error: ProtocolError) -> ReconcileResult {
        self.resyncs_requested += 1;
        self.state = SyncState::Unsynced;
        warn!(error = %error, "Depth sequence broken, resync required");
        ReconcileResult::ResyncRequired(error)
    }
}

impl Default for DepthReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::depth::PriceLevel;
    use types::ids::Symbol;

    fn level(p: &str, q: &str) -> PriceLevel {
        PriceLevel::new(p.parse().unwrap(), q.parse().unwrap())
    }

    fn snapshot(last_update_id: u64) -> DepthSnapshot {
        DepthSnapshot {
            last_update_id,
            bids: vec![level("10.0", "5")],
            asks: vec![level("10.5", "3")],
        }
    }

    fn diff(first: u64, last: u64, prev: Option<u64>, bids: Vec<PriceLevel>) -> DiffEvent {
        DiffEvent {
            first_update_id: first,
            final_update_id: last,
            prev_final_update_id: prev,
            event_time_ms: None,
            bid_changes: bids,
            ask_changes: vec![],
        }
    }

    fn synced_at_100() -> (DepthReconciler, OrderBookState) {
        let mut reconciler = DepthReconciler::new();
        let mut book = OrderBookState::new(Symbol::try_new("ETHUSDT").unwrap());
        reconciler.load_snapshot(&mut book, &snapshot(100), Utc::now());
        (reconciler, book)
    }

    #[test]
    fn test_unsynced_drops_everything() {
        let mut reconciler = DepthReconciler::new();
        let mut book = OrderBookState::new(Symbol::try_new("ETHUSDT").unwrap());

        let result = reconciler.process(&mut book, &diff(1, 2, None, vec![]), Utc::now());
        assert_eq!(result, ReconcileResult::Dropped(DropReason::AwaitingSnapshot));
        assert_eq!(reconciler.events_dropped(), 1);
        assert_eq!(book.last_update_id(), 0);
    }

    #[test]
    fn test_scenario_a_bridging_event_applies() {
        let (mut reconciler, mut book) = synced_at_100();
        assert_eq!(reconciler.state(), SyncState::Syncing);

        let event = diff(100, 101, Some(100), vec![level("10.0", "0")]);
        let result = reconciler.process(&mut book, &event, Utc::now());

        assert_eq!(
            result,
            ReconcileResult::Applied {
                last_update_id: 101,
                bridged: true
            }
        );
        assert_eq!(reconciler.state(), SyncState::Synced);
        assert!(book.quantity_at("10.0".parse().unwrap()).is_none());
        assert_eq!(book.last_update_id(), 101);
    }

    #[test]
    fn test_stale_events_before_bridge_are_dropped() {
        let (mut reconciler, mut book) = synced_at_100();

        let stale = diff(90, 99, Some(89), vec![level("10.0", "0")]);
        assert_eq!(
            reconciler.process(&mut book, &stale, Utc::now()),
            ReconcileResult::Dropped(DropReason::Stale)
        );
        let exact = diff(95, 100, Some(94), vec![]);
        assert_eq!(
            reconciler.process(&mut book, &exact, Utc::now()),
            ReconcileResult::Dropped(DropReason::Stale)
        );
        assert_eq!(reconciler.state(), SyncState::Syncing);
        assert_eq!(book.bid_depth(), 1);
    }

    #[test]
    fn test_snapshot_older_than_stream_requires_resync() {
        let (mut reconciler, mut book) = synced_at_100();

        let result = reconciler.process(&mut book, &diff(150, 160, Some(149), vec![]), Utc::now());
        assert!(matches!(
            result,
            ReconcileResult::ResyncRequired(ProtocolError::SnapshotTooOld {
                snapshot_id: 100,
                first_update_id: 150
            })
        ));
        assert_eq!(reconciler.state(), SyncState::Unsynced);
    }

    #[test]
    fn test_scenario_b_gap_triggers_resync_and_recovers() {
        let (mut reconciler, mut book) = synced_at_100();
        reconciler.process(&mut book, &diff(100, 101, Some(100), vec![]), Utc::now());

        // Expected pu=101
        let gap = diff(102, 103, Some(102), vec![level("9.0", "1")]);
        let result = reconciler.process(&mut book, &gap, Utc::now());
        assert!(matches!(
            result,
            ReconcileResult::ResyncRequired(ProtocolError::ContinuityBroken {
                last_update_id: 101,
                ..
            })
        ));
        assert_eq!(reconciler.state(), SyncState::Unsynced);
        assert_eq!(reconciler.resyncs_requested(), 1);
        // The rejected event never touched the book.
        assert!(book.quantity_at("9.0".parse().unwrap()).is_none());
        assert_eq!(book.last_update_id(), 101);

        reconciler.load_snapshot(&mut book, &snapshot(103), Utc::now());
        assert_eq!(book.last_update_id(), 103);
        assert_eq!(reconciler.state(), SyncState::Syncing);

        let bridge = diff(104, 104, Some(103), vec![]);
        let result = reconciler.process(&mut book, &bridge, Utc::now());
        assert!(matches!(result, ReconcileResult::Applied { last_update_id: 104, .. }));
        assert_eq!(reconciler.state(), SyncState::Synced);
    }

    #[test]
    fn test_steady_state_chain() {
        let (mut reconciler, mut book) = synced_at_100();
        reconciler.process(&mut book, &diff(95, 105, Some(94), vec![]), Utc::now());

        for (first, last, prev) in [(106, 110, 105), (111, 111, 110), (112, 130, 111)] {
            let result = reconciler.process(
                &mut book,
                &diff(first, last, Some(prev), vec![level("11", "2")]),
                Utc::now(),
            );
            assert!(matches!(result, ReconcileResult::Applied { bridged: false, .. }));
        }
        assert_eq!(book.last_update_id(), 130);
        assert_eq!(reconciler.events_applied(), 4);
    }

    #[test]
    fn test_superseded_event_dropped_when_synced() {
        let (mut reconciler, mut book) = synced_at_100();
        reconciler.process(&mut book, &diff(100, 110, Some(99), vec![]), Utc::now());

        let old = diff(105, 108, Some(104), vec![level("10.0", "0")]);
        assert_eq!(
            reconciler.process(&mut book, &old, Utc::now()),
            ReconcileResult::Dropped(DropReason::Stale)
        );
        assert_eq!(reconciler.state(), SyncState::Synced);
        assert_eq!(book.bid_depth(), 1);
    }

    #[test]
    fn test_continuity_without_prev_final_id() {
        let (mut reconciler, mut book) = synced_at_100();
        reconciler.process(&mut book, &diff(99, 101, None, vec![]), Utc::now());

        let next = diff(102, 104, None, vec![]);
        assert!(matches!(
            reconciler.process(&mut book, &next, Utc::now()),
            ReconcileResult::Applied { last_update_id: 104, .. }
        ));

        let gap = diff(106, 107, None, vec![]);
        assert!(matches!(
            reconciler.process(&mut book, &gap, Utc::now()),
            ReconcileResult::ResyncRequired(_)
        ));
    }

    #[test]
    fn test_reset_keeps_book_contents() {
        let (mut reconciler, mut book) = synced_at_100();
        reconciler.process(&mut book, &diff(100, 101, Some(100), vec![]), Utc::now());

        reconciler.reset();
        assert_eq!(reconciler.state(), SyncState::Unsynced);
        assert_eq!(book.bid_depth(), 1);
        assert_eq!(book.last_update_id(), 101);
    }
}
