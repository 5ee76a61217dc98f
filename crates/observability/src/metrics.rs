//! Dispatcher metrics recording
//!
//! Metric handles are resolved once per dispatcher instance so that the worker
//! loop and the post paths only touch pre-registered counters.

use std::time::Duration;

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// Pre-registered metric handles for one dispatcher instance
///
/// # Example
///
/// ```ignore
/// use observability::metrics::DispatcherRecorder;
///
/// let recorder = DispatcherRecorder::new("main");
/// recorder.posted();
/// recorder.callback_latency(elapsed);
/// ```
#[derive(Clone)]
pub struct DispatcherRecorder {
    posted: Counter,
    executed: Counter,
    callback_failures: Counter,
    rejected: Counter,
    timeouts: Counter,
    cancelled: Counter,
    too_late: Counter,
    ready_depth: Gauge,
    pending_depth: Gauge,
    modules: Gauge,
    callback_latency_us: Histogram,
}

impl DispatcherRecorder {
    /// Register all handles labelled with the dispatcher name
    pub fn new(dispatcher: &str) -> Self {
        let label = dispatcher.to_string();
        Self {
            posted: counter!("dispatcher_posted_total", "dispatcher" => label.clone()),
            executed: counter!("dispatcher_executed_total", "dispatcher" => label.clone()),
            callback_failures: counter!(
                "dispatcher_callback_failures_total",
                "dispatcher" => label.clone()
            ),
            rejected: counter!("dispatcher_rejected_total", "dispatcher" => label.clone()),
            timeouts: counter!("dispatcher_post_timeouts_total", "dispatcher" => label.clone()),
            cancelled: counter!("dispatcher_cancelled_total", "dispatcher" => label.clone()),
            too_late: counter!("dispatcher_cancel_too_late_total", "dispatcher" => label.clone()),
            ready_depth: gauge!("dispatcher_ready_depth", "dispatcher" => label.clone()),
            pending_depth: gauge!("dispatcher_pending_depth", "dispatcher" => label.clone()),
            modules: gauge!("dispatcher_modules", "dispatcher" => label.clone()),
            callback_latency_us: histogram!(
                "dispatcher_callback_latency_us",
                "dispatcher" => label
            ),
        }
    }

    /// Message or work accepted
    pub fn posted(&self) {
        self.posted.increment(1);
    }

    /// Callback completed (successfully or not)
    pub fn executed(&self) {
        self.executed.increment(1);
    }

    pub fn callback_failed(&self) {
        self.callback_failures.increment(1);
    }

    /// Post refused because a queue was full
    pub fn rejected(&self) {
        self.rejected.increment(1);
    }

    pub fn timed_out(&self) {
        self.timeouts.increment(1);
    }

    pub fn cancelled(&self) {
        self.cancelled.increment(1);
    }

    pub fn too_late(&self) {
        self.too_late.increment(1);
    }

    pub fn depths(&self, ready: usize, pending: usize) {
        self.ready_depth.set(ready as f64);
        self.pending_depth.set(pending as f64);
    }

    pub fn module_count(&self, count: usize) {
        self.modules.set(count as f64);
    }

    pub fn callback_latency(&self, elapsed: Duration) {
        self.callback_latency_us
            .record(elapsed.as_secs_f64() * 1_000_000.0);
    }
}

impl std::fmt::Debug for DispatcherRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherRecorder").finish_non_exhaustive()
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
