//! Demo modules driven by `dispatchctl run`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use contracts::{EventCode, Payload};
use dispatcher::{DispatchHandle, DispatcherError, ErrorKind, Module, Registry, Work};
use observability::{RunningStats, StatsSummary};
use tracing::{debug, trace, warn};

/// Periodic heartbeat
pub const EVT_HEARTBEAT: EventCode = 1;
/// Registry dump on the system dispatcher
pub const EVT_REPORT: EventCode = 2;

/// Cancel `work`, treating a cancel that lost the race as done
fn cancel_quietly(handle: &DispatchHandle, work: &mut Work) -> Result<(), DispatcherError> {
    match handle.cancel(work) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::TooLate => {
            debug!(module = %handle.module_name(), "Work already fired; it retires after this run");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Arms a periodic heartbeat on registration and measures its spacing
pub struct Heartbeat {
    interval: Duration,
    beats: AtomicU64,
    last_beat: Mutex<Option<Instant>>,
    /// Spacing between beats in ms
    spacing: Mutex<RunningStats>,
    armed: Mutex<Option<(DispatchHandle, Work)>>,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            beats: AtomicU64::new(0),
            last_beat: Mutex::new(None),
            spacing: Mutex::new(RunningStats::default()),
            armed: Mutex::new(None),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn spacing(&self) -> StatsSummary {
        self.spacing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }
}

impl Module for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn on_reg(&self, handle: &DispatchHandle) -> Result<(), DispatcherError> {
        let mut work = Work::new(EVT_HEARTBEAT, Payload::Empty).with_period(self.interval, self.interval);
        handle.post_ex(&mut work)?;
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = Some((handle.clone(), work));
        Ok(())
    }

    fn on_msg(&self, event: EventCode, _payload: &Payload) -> Result<(), DispatcherError> {
        if event != EVT_HEARTBEAT {
            return Err(DispatcherError::callback(
                self.name(),
                format!("unexpected event {event}"),
            ));
        }
        let now = Instant::now();
        let previous = self
            .last_beat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(now);
        if let Some(previous) = previous {
            let spacing_ms = now.duration_since(previous).as_secs_f64() * 1000.0;
            self.spacing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(spacing_ms);
        }
        let beats = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(beats, "Heartbeat");
        Ok(())
    }

    fn on_dereg(&self) -> Result<(), DispatcherError> {
        let armed = self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((handle, mut work)) = armed {
            cancel_quietly(&handle, &mut work)?;
        }
        Ok(())
    }
}

/// Dumps the registry from the system dispatcher
pub struct DebugReporter {
    registry: Registry,
    reports: AtomicU64,
}

impl DebugReporter {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            reports: AtomicU64::new(0),
        }
    }

    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }
}

impl Module for DebugReporter {
    fn name(&self) -> &str {
        "debug-reporter"
    }

    fn on_msg(&self, event: EventCode, _payload: &Payload) -> Result<(), DispatcherError> {
        if event != EVT_REPORT {
            warn!(event, "Debug reporter ignoring event");
            return Ok(());
        }
        let entries = self.registry.debug()?;
        self.reports.fetch_add(1, Ordering::Relaxed);
        debug!(entries, "Registry dumped");
        Ok(())
    }
}

/// Periodic work posted through a system dispatch handle
pub struct ReporterBinding {
    pub handle: DispatchHandle,
    pub work: Work,
}

impl ReporterBinding {
    pub fn start(
        handle: DispatchHandle,
        interval: Duration,
    ) -> Result<Self, DispatcherError> {
        let mut work = Work::new(EVT_REPORT, Payload::Empty).with_period(interval, interval);
        handle.post_ex(&mut work)?;
        Ok(Self { handle, work })
    }

    pub fn stop(mut self) -> Result<(), DispatcherError> {
        cancel_quietly(&self.handle, &mut self.work)
    }
}
