//! Shared mirror state and the ingestion host loop
//!
//! `MirrorHandle` is the single owner of the live book and its history. One
//! writer task (`run_ingestion`) mutates it; any number of readers copy out
//! of it under short-held locks. Locks are never held across an `.await`,
//! and the book lock is always taken before the history lock.
//!
//! Session lifecycle:
//!
//! ```text
//!   connect ──► fetch snapshot ──► consume diffs ──► (gap) fetch snapshot ─┐
//!      ▲                                 ▲                                  │
//!      │                                 └──────────────────────────────────┘
//!      └── wait reconnect_delay ◄── transport failure
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};
use types::depth::{DepthSnapshot, DiffEvent};
use types::ids::Symbol;

use crate::error::MirrorError;
use crate::history::HistoryBuffer;
use crate::ingestion::{DepthReconciler, ReconcileResult, SyncState};
use crate::metrics::MirrorMetrics;
use crate::order_book::OrderBookState;
use crate::snapshot::SnapshotSource;
use crate::stream::{DiffStream, StreamConnector};

/// Shared, lock-guarded replica state.
pub struct MirrorHandle {
    symbol: Symbol,
    book: RwLock<OrderBookState>,
    history: Mutex<HistoryBuffer>,
    sync_state: Mutex<SyncState>,
    connected: AtomicBool,
    metrics: Arc<MirrorMetrics>,
}

impl MirrorHandle {
    pub fn new(symbol: Symbol, history_capacity: usize, metrics: Arc<MirrorMetrics>) -> Self {
        Self {
            book: RwLock::new(OrderBookState::new(symbol.clone())),
            symbol,
            history: Mutex::new(HistoryBuffer::new(history_capacity)),
            sync_state: Mutex::new(SyncState::Unsynced),
            connected: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn metrics(&self) -> &Arc<MirrorMetrics> {
        &self.metrics
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn sync_state(&self) -> SyncState {
        *lock(&self.sync_state)
    }

    /// Read access to the live book. Keep the guard short-lived.
    pub fn read_book(&self) -> RwLockReadGuard<'_, OrderBookState> {
        self.book.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Access to the history buffer. Keep the guard short-lived.
    pub fn history(&self) -> MutexGuard<'_, HistoryBuffer> {
        lock(&self.history)
    }

    fn write_book(&self) -> RwLockWriteGuard<'_, OrderBookState> {
        self.book.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the book from `snapshot` and capture it into history.
    pub fn load_snapshot(
        &self,
        reconciler: &mut DepthReconciler,
        snapshot: &DepthSnapshot,
        now: DateTime<Utc>,
    ) {
        {
            let mut book = self.write_book();
            reconciler.load_snapshot(&mut book, snapshot, now);
            if self.history().maybe_capture(&book, now) {
                self.metrics.record_history_capture();
            }
        }
        self.metrics.record_snapshot_loaded();
        *lock(&self.sync_state) = reconciler.state();
    }

    /// Reconcile one event; the whole event lands under one write lock.
    pub fn apply_event(
        &self,
        reconciler: &mut DepthReconciler,
        event: &DiffEvent,
        now: DateTime<Utc>,
    ) -> ReconcileResult {
        let started = Instant::now();
        let result = {
            let mut book = self.write_book();
            let result = reconciler.process(&mut book, event, now);
            if matches!(result, ReconcileResult::Applied { .. })
                && self.history().maybe_capture(&book, now)
            {
                self.metrics.record_history_capture();
            }
            result
        };

        match &result {
            ReconcileResult::Applied { .. } => {
                self.metrics
                    .record_event_applied(started.elapsed().as_nanos() as u64);
            }
            ReconcileResult::Dropped(_) => self.metrics.record_event_dropped(),
            ReconcileResult::ResyncRequired(_) => {
                self.metrics.record_event_dropped();
                self.metrics.record_resync();
            }
        }
        *lock(&self.sync_state) = reconciler.state();
        result
    }

    fn mark_unsynced(&self, reconciler: &mut DepthReconciler) {
        reconciler.reset();
        *lock(&self.sync_state) = SyncState::Unsynced;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Failed(MirrorError),
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Run the single-writer ingestion loop until shutdown.
///
/// Every connection starts from a fresh snapshot. Transport failures end the
/// session; the loop then waits `reconnect_delay` (interruptible by shutdown)
/// and starts over. Nothing here is fatal.
pub async fn run_ingestion<S, C>(
    handle: Arc<MirrorHandle>,
    snapshots: S,
    connector: C,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: SnapshotSource,
    C: StreamConnector,
{
    let mut reconciler = DepthReconciler::new();
    info!(symbol = %handle.symbol(), "Depth ingestion started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match run_session(&handle, &snapshots, &connector, &mut reconciler, &mut shutdown).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Failed(err) => {
                warn!(
                    symbol = %handle.symbol(),
                    error = %err,
                    remote = err.is_remote(),
                    delay_ms = reconnect_delay.as_millis() as u64,
                    "Depth session ended, reconnecting"
                );
            }
        }

        handle.set_connected(false);
        handle.mark_unsynced(&mut reconciler);

        tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown) => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    handle.set_connected(false);
    info!(
        symbol = %handle.symbol(),
        applied = reconciler.events_applied(),
        dropped = reconciler.events_dropped(),
        resyncs = reconciler.resyncs_requested(),
        "Depth ingestion stopped"
    );
}

async fn run_session<S, C>(
    handle: &MirrorHandle,
    snapshots: &S,
    connector: &C,
    reconciler: &mut DepthReconciler,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    S: SnapshotSource,
    C: StreamConnector,
{
    let connected = tokio::select! {
        biased;
        _ = shutdown_signalled(shutdown) => return SessionEnd::Shutdown,
        result = connector.connect() => result,
    };
    let mut stream = match connected {
        Ok(stream) => stream,
        Err(e) => return SessionEnd::Failed(e.into()),
    };
    handle.set_connected(true);
    handle.metrics().record_connected();

    if let Some(end) = resync(handle, snapshots, reconciler, shutdown).await {
        stream.close().await;
        return end;
    }

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown_signalled(shutdown) => None,
            next = stream.next_event() => Some(next),
        };

        let event = match next {
            None => {
                stream.close().await;
                return SessionEnd::Shutdown;
            }
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                handle.set_connected(false);
                handle.metrics().record_disconnected();
                return SessionEnd::Failed(e.into());
            }
        };

        if let ReconcileResult::ResyncRequired(_) =
            handle.apply_event(reconciler, &event, Utc::now())
        {
            if let Some(end) = resync(handle, snapshots, reconciler, shutdown).await {
                stream.close().await;
                return end;
            }
        }
    }
}

/// Fetch and load a fresh snapshot. `Some` ends the session.
async fn resync<S: SnapshotSource>(
    handle: &MirrorHandle,
    snapshots: &S,
    reconciler: &mut DepthReconciler,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<SessionEnd> {
    info!(symbol = %handle.symbol(), "Fetching depth snapshot");

    let fetched = tokio::select! {
        biased;
        _ = shutdown_signalled(shutdown) => return Some(SessionEnd::Shutdown),
        fetched = snapshots.fetch() => fetched,
    };

    match fetched {
        Ok(snapshot) => {
            handle.load_snapshot(reconciler, &snapshot, Utc::now());
            None
        }
        Err(e) => {
            handle.metrics().record_snapshot_failure();
            Some(SessionEnd::Failed(e.into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::depth::PriceLevel;

    fn level(p: &str, q: &str) -> PriceLevel {
        PriceLevel::new(p.parse().unwrap(), q.parse().unwrap())
    }

    fn handle() -> MirrorHandle {
        MirrorHandle::new(
            Symbol::try_new("ETHUSDT").unwrap(),
            10,
            Arc::new(MirrorMetrics::new()),
        )
    }

    #[test]
    fn test_load_snapshot_captures_history() {
        let handle = handle();
        let mut reconciler = DepthReconciler::new();
        let snapshot = DepthSnapshot {
            last_update_id: 100,
            bids: vec![level("10.0", "5")],
            asks: vec![level("10.5", "3")],
        };

        handle.load_snapshot(&mut reconciler, &snapshot, Utc::now());

        assert_eq!(handle.sync_state(), SyncState::Syncing);
        assert_eq!(handle.read_book().last_update_id(), 100);
        assert_eq!(handle.history().len(), 1);
        assert_eq!(handle.metrics().export()["snapshots_loaded"], 1);
    }

    #[test]
    fn test_apply_event_updates_state_and_metrics() {
        let handle = handle();
        let mut reconciler = DepthReconciler::new();
        let snapshot = DepthSnapshot {
            last_update_id: 100,
            bids: vec![level("10.0", "5")],
            asks: vec![],
        };
        handle.load_snapshot(&mut reconciler, &snapshot, Utc::now());

        let event = DiffEvent {
            first_update_id: 100,
            final_update_id: 101,
            prev_final_update_id: Some(100),
            event_time_ms: None,
            bid_changes: vec![level("10.0", "0")],
            ask_changes: vec![],
        };
        let result = handle.apply_event(&mut reconciler, &event, Utc::now());

        assert!(matches!(result, ReconcileResult::Applied { .. }));
        assert_eq!(handle.sync_state(), SyncState::Synced);
        assert_eq!(handle.read_book().bid_depth(), 0);
        assert_eq!(handle.metrics().export()["events_applied"], 1);
    }

    #[test]
    fn test_connected_flag() {
        let handle = handle();
        assert!(!handle.is_connected());
        handle.set_connected(true);
        assert!(handle.is_connected());
    }
}
