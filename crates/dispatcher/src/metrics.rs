//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use observability::{DispatcherRecorder, RunningStats, StatsSummary};

/// Metrics for a single dispatcher instance
///
/// Counters are kept in-process for snapshots and mirrored to the `metrics`
/// recorder so a Prometheus exporter sees the same values.
#[derive(Debug)]
pub struct DispatcherMetrics {
    /// Messages and work items accepted
    posted: AtomicU64,
    /// Callbacks completed
    executed: AtomicU64,
    /// Callbacks that returned an error or panicked
    callback_failures: AtomicU64,
    /// Posts refused because a queue was full
    rejected: AtomicU64,
    /// `post` calls that gave up waiting for space
    timeouts: AtomicU64,
    /// Work cancelled while pending
    cancelled: AtomicU64,
    /// Cancels that arrived too late
    too_late: AtomicU64,
    ready_len: AtomicUsize,
    pending_len: AtomicUsize,
    /// Callback latency in microseconds
    latency: Mutex<RunningStats>,
    recorder: DispatcherRecorder,
}

impl DispatcherMetrics {
    pub fn new(dispatcher: &str) -> Self {
        Self {
            posted: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            too_late: AtomicU64::new(0),
            ready_len: AtomicUsize::new(0),
            pending_len: AtomicUsize::new(0),
            latency: Mutex::new(RunningStats::default()),
            recorder: DispatcherRecorder::new(dispatcher),
        }
    }

    pub fn inc_posted(&self) {
        self.posted.fetch_add(1, Ordering::Relaxed);
        self.recorder.posted();
    }

    /// Record a finished callback and its duration
    pub fn record_execution(&self, elapsed: Duration, failed: bool) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        self.recorder.executed();
        if failed {
            self.inc_callback_failures();
        }
        self.recorder.callback_latency(elapsed);
        self.latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(elapsed.as_secs_f64() * 1_000_000.0);
    }

    /// Failures outside `on_msg` (`on_reg`, `on_dereg`)
    pub fn inc_callback_failures(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
        self.recorder.callback_failed();
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.recorder.rejected();
    }

    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.recorder.timed_out();
    }

    pub fn inc_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        self.recorder.cancelled();
    }

    pub fn inc_too_late(&self) {
        self.too_late.fetch_add(1, Ordering::Relaxed);
        self.recorder.too_late();
    }

    /// Set current queue depths
    pub fn set_depths(&self, ready: usize, pending: usize) {
        self.ready_len.store(ready, Ordering::Relaxed);
        self.pending_len.store(pending, Ordering::Relaxed);
        self.recorder.depths(ready, pending);
    }

    pub fn set_module_count(&self, count: usize) {
        self.recorder.module_count(count);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            too_late: self.too_late.load(Ordering::Relaxed),
            ready_len: self.ready_len.load(Ordering::Relaxed),
            pending_len: self.pending_len.load(Ordering::Relaxed),
        }
    }

    /// Callback latency summary (µs)
    pub fn latency(&self) -> StatsSummary {
        self.latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub posted: u64,
    pub executed: u64,
    pub callback_failures: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub too_late: u64,
    pub ready_len: usize,
    pub pending_len: usize,
}
