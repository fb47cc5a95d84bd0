//! Counters for the depth mirror
//!
//! Tracks feed health: events applied and dropped, decode failures,
//! resyncs, snapshot fetches, reconnects, and apply latency.
//! Exposed through the gateway's `/metrics` route.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Core metrics for the depth mirror.
pub struct MirrorMetrics {
    // Event processing
    pub events_applied: AtomicU64,
    pub events_dropped: AtomicU64,
    pub decode_errors: AtomicU64,
    pub apply_latency_ns: Mutex<LatencyTracker>,

    // Synchronization
    pub resyncs: AtomicU64,
    pub snapshots_loaded: AtomicU64,
    pub snapshot_failures: AtomicU64,

    // Connection
    pub connections: AtomicU64,
    pub disconnects: AtomicU64,

    // History
    pub history_captures: AtomicU64,
}

impl MirrorMetrics {
    pub fn new() -> Self {
        Self {
            events_applied: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            apply_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            resyncs: AtomicU64::new(0),
            snapshots_loaded: AtomicU64::new(0),
            snapshot_failures: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            history_captures: AtomicU64::new(0),
        }
    }

    /// Record an applied event and how long the write lock was held.
    pub fn record_event_applied(&self, latency_ns: u64) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.apply_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame that could not be decoded.
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_loaded(&self) {
        self.snapshots_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connected(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_history_capture(&self) {
        self.history_captures.fetch_add(1, Ordering::Relaxed);
    }

    /// Export counters plus apply latency percentiles.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("events_applied".to_string(), self.events_applied.load(Ordering::Relaxed));
        m.insert("events_dropped".to_string(), self.events_dropped.load(Ordering::Relaxed));
        m.insert("decode_errors".to_string(), self.decode_errors.load(Ordering::Relaxed));
        m.insert("resyncs".to_string(), self.resyncs.load(Ordering::Relaxed));
        m.insert("snapshots_loaded".to_string(), self.snapshots_loaded.load(Ordering::Relaxed));
        m.insert("snapshot_failures".to_string(), self.snapshot_failures.load(Ordering::Relaxed));
        m.insert("connections".to_string(), self.connections.load(Ordering::Relaxed));
        m.insert("disconnects".to_string(), self.disconnects.load(Ordering::Relaxed));
        m.insert("history_captures".to_string(), self.history_captures.load(Ordering::Relaxed));

        if let Ok(tracker) = self.apply_latency_ns.lock() {
            if let Some(p50) = tracker.percentile(50) {
                m.insert("apply_latency_p50_ns".to_string(), p50);
            }
            if let Some(p99) = tracker.percentile(99) {
                m.insert("apply_latency_p99_ns".to_string(), p99);
            }
            if let Some(avg) = tracker.average() {
                m.insert("apply_latency_avg_ns".to_string(), avg);
            }
        }
        m
    }
}

impl Default for MirrorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding window of latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample, evicting the oldest once full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (p.min(100) as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = MirrorMetrics::new();

        metrics.record_event_applied(500);
        metrics.record_event_applied(1000);
        metrics.record_event_dropped();
        metrics.record_decode_error();
        metrics.record_resync();

        let exported = metrics.export();
        assert_eq!(exported["events_applied"], 2);
        assert_eq!(exported["events_dropped"], 1);
        assert_eq!(exported["decode_errors"], 1);
        assert_eq!(exported["resyncs"], 1);
        assert!(exported.contains_key("apply_latency_p99_ns"));
        assert_eq!(exported["apply_latency_avg_ns"], 750);
    }

    #[test]
    fn test_export_without_samples_omits_latency() {
        let metrics = MirrorMetrics::new();
        metrics.record_connected();
        metrics.record_snapshot_loaded();

        let exported = metrics.export();
        assert_eq!(exported["connections"], 1);
        assert_eq!(exported["snapshots_loaded"], 1);
        assert!(!exported.contains_key("apply_latency_p50_ns"));
        assert!(!exported.contains_key("apply_latency_avg_ns"));
    }

    #[test]
    fn test_latency_tracker_percentile() {
        let mut tracker = LatencyTracker::new(100);

        for i in 1..=100 {
            tracker.record(i);
        }

        let p50 = tracker.percentile(50).unwrap();
        assert!((49..=51).contains(&p50));

        let p99 = tracker.percentile(99).unwrap();
        assert!((98..=100).contains(&p99));
    }

    #[test]
    fn test_latency_tracker_window_eviction() {
        let mut tracker = LatencyTracker::new(3);

        tracker.record(10);
        tracker.record(20);
        tracker.record(30);
        tracker.record(40); // Should evict 10

        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.average().unwrap(), 30);
    }
}
