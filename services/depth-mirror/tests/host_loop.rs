//! Ingestion host loop driven by scripted snapshot and stream fakes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use depth_mirror::ingestion::SyncState;
use depth_mirror::metrics::MirrorMetrics;
use depth_mirror::snapshot::SnapshotSource;
use depth_mirror::stream::{DiffStream, StreamConnector};
use depth_mirror::{run_ingestion, MirrorHandle, QueryService};
use rust_decimal::Decimal;
use tokio::sync::watch;
use types::depth::{DepthSnapshot, DiffEvent, PriceLevel};
use types::errors::TransportError;
use types::ids::Symbol;

fn level(p: &str, q: &str) -> PriceLevel {
    PriceLevel::new(p.parse().unwrap(), q.parse().unwrap())
}

fn snapshot(last_update_id: u64, bid_qty: &str) -> DepthSnapshot {
    DepthSnapshot {
        last_update_id,
        bids: vec![level("10.0", bid_qty)],
        asks: vec![level("10.5", "3")],
    }
}

fn diff(first: u64, last: u64, prev: u64, bids: Vec<PriceLevel>) -> DiffEvent {
    DiffEvent {
        first_update_id: first,
        final_update_id: last,
        prev_final_update_id: Some(prev),
        event_time_ms: None,
        bid_changes: bids,
        ask_changes: vec![],
    }
}

struct ScriptedSnapshots {
    script: Mutex<VecDeque<Result<DepthSnapshot, TransportError>>>,
    fetches: AtomicUsize,
}

impl ScriptedSnapshots {
    fn new(script: Vec<Result<DepthSnapshot, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSnapshots {
    async fn fetch(&self) -> Result<DepthSnapshot, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Connect("script exhausted".to_string())))
    }
}

/// Replays its events, then idles until closed.
struct ScriptedStream {
    events: VecDeque<Result<DiffEvent, TransportError>>,
}

#[async_trait]
impl DiffStream for ScriptedStream {
    async fn next_event(&mut self) -> Result<DiffEvent, TransportError> {
        match self.events.pop_front() {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

struct ScriptedConnector {
    sessions: Mutex<VecDeque<Vec<Result<DiffEvent, TransportError>>>>,
}

impl ScriptedConnector {
    fn new(sessions: Vec<Vec<Result<DiffEvent, TransportError>>>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
        }
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    type Stream = ScriptedStream;

    async fn connect(&self) -> Result<ScriptedStream, TransportError> {
        match self.sessions.lock().unwrap().pop_front() {
            Some(events) => Ok(ScriptedStream {
                events: events.into(),
            }),
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn new_handle() -> Arc<MirrorHandle> {
    init_tracing();
    Arc::new(MirrorHandle::new(
        Symbol::try_new("ETHUSDT").unwrap(),
        1_000,
        Arc::new(MirrorMetrics::new()),
    ))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_gap_triggers_resync_on_same_connection() {
    let handle = new_handle();
    let snapshots = Arc::new(ScriptedSnapshots::new(vec![
        Ok(snapshot(100, "5")),
        Ok(snapshot(103, "9")),
    ]));
    let connector = ScriptedConnector::new(vec![vec![
        Ok(diff(100, 101, 100, vec![level("10.0", "0")])),
        // pu should be 101
        Ok(diff(102, 103, 102, vec![level("9.0", "1")])),
        Ok(diff(104, 104, 103, vec![level("9.5", "2")])),
    ]]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_ingestion(
        Arc::clone(&handle),
        Arc::clone(&snapshots),
        connector,
        Duration::from_millis(10),
        shutdown_rx,
    ));

    let h = Arc::clone(&handle);
    wait_until(move || h.read_book().last_update_id() == 104).await;

    assert_eq!(handle.sync_state(), SyncState::Synced);
    assert!(handle.is_connected());
    {
        let book = handle.read_book();
        assert!(book.quantity_at("9.0".parse().unwrap()).is_none());
        assert_eq!(book.quantity_at("10.0".parse().unwrap()), Some("9".parse().unwrap()));
        assert_eq!(book.quantity_at("9.5".parse().unwrap()), Some("2".parse().unwrap()));
    }
    let metrics = handle.metrics().export();
    assert_eq!(metrics["resyncs"], 1);
    assert_eq!(metrics["snapshots_loaded"], 2);
    assert_eq!(metrics["connections"], 1);
    assert_eq!(snapshots.fetches.load(Ordering::SeqCst), 2);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("ingestion did not stop")
        .unwrap();
    assert!(!handle.is_connected());
}

#[tokio::test]
async fn test_reconnects_after_stream_closes() {
    let handle = new_handle();
    let snapshots = Arc::new(ScriptedSnapshots::new(vec![
        Ok(snapshot(100, "5")),
        Ok(snapshot(200, "6")),
    ]));
    let connector = ScriptedConnector::new(vec![
        vec![
            Ok(diff(101, 101, 100, vec![])),
            Err(TransportError::ConnectionClosed),
        ],
        vec![Ok(diff(199, 201, 198, vec![level("10.0", "8")]))],
    ]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_ingestion(
        Arc::clone(&handle),
        snapshots,
        connector,
        Duration::from_millis(10),
        shutdown_rx,
    ));

    let h = Arc::clone(&handle);
    wait_until(move || h.read_book().last_update_id() == 201).await;

    let service = QueryService::new(Arc::clone(&handle));
    let live = service.quantity_at(Decimal::new(100, 1), None).unwrap();
    assert_eq!(live.quantity, Decimal::new(8, 0));

    let metrics = service.metrics();
    assert_eq!(metrics["connections"], 2);
    assert_eq!(metrics["disconnects"], 1);
    assert_eq!(service.status().sync_state, SyncState::Synced);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("ingestion did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_failed_snapshot_ends_session_and_retries() {
    let handle = new_handle();
    let snapshots = Arc::new(ScriptedSnapshots::new(vec![
        Err(TransportError::HttpStatus {
            status: 503,
            body: "unavailable".to_string(),
        }),
        Ok(snapshot(50, "1")),
    ]));
    let connector = ScriptedConnector::new(vec![
        vec![],
        vec![Ok(diff(51, 51, 50, vec![]))],
    ]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_ingestion(
        Arc::clone(&handle),
        Arc::clone(&snapshots),
        connector,
        Duration::from_millis(10),
        shutdown_rx,
    ));

    let h = Arc::clone(&handle);
    wait_until(move || h.sync_state() == SyncState::Synced).await;
    assert_eq!(handle.metrics().export()["snapshot_failures"], 1);
    assert_eq!(handle.read_book().last_update_id(), 51);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("ingestion did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_interrupts_reconnect_delay() {
    let handle = new_handle();
    let snapshots = Arc::new(ScriptedSnapshots::new(vec![]));
    let connector = ScriptedConnector::new(vec![]);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_ingestion(
        Arc::clone(&handle),
        snapshots,
        connector,
        Duration::from_secs(3600),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("ingestion did not stop")
        .unwrap();
    assert!(!handle.is_connected());
    assert_eq!(handle.sync_state(), SyncState::Unsynced);
}
