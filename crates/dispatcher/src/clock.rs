//! Millisecond tick clock of a dispatcher instance.

use std::time::{Duration, Instant};

/// Milliseconds since the owning dispatcher was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u64);

impl Tick {
    pub const fn from_millis(ms: u64) -> Self {
        Tick(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Tick `delay` after this one, saturating
    pub fn after(self, delay: Duration) -> Tick {
        Tick(self.0.saturating_add(duration_to_millis(delay)))
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Tick source anchored at a fixed epoch
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    epoch: Instant,
}

impl TickClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Current tick rounded up, used when computing deadlines so that a
    /// deadline `d` after now is never reached in less than `d`
    pub fn now(&self) -> Tick {
        let nanos = self.epoch.elapsed().as_nanos();
        let ms = nanos.div_ceil(1_000_000);
        Tick(u64::try_from(ms).unwrap_or(u64::MAX))
    }

    /// Current tick rounded down, used when testing deadlines
    pub fn elapsed(&self) -> Tick {
        Tick(duration_to_millis(self.epoch.elapsed()))
    }

    /// Deadline `delay` from now
    pub fn deadline(&self, delay: Duration) -> Tick {
        self.now().after(delay)
    }

    /// Wall-clock instant at which `tick` is reached
    pub fn instant_at(&self, tick: Tick) -> Instant {
        self.epoch + Duration::from_millis(tick.0)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
