//! Delayed and periodic work items

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use contracts::{EventCode, Payload, Priority};

use crate::instance::{DispatcherId, Instance};
use crate::slot::SlotKey;

/// Where an armed [`Work`] lives
#[derive(Clone)]
pub(crate) struct WorkTicket {
    pub(crate) instance: Weak<Instance>,
    pub(crate) dispatcher: DispatcherId,
    pub(crate) key: SlotKey,
}

impl fmt::Debug for WorkTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkTicket")
            .field("dispatcher", &self.dispatcher)
            .field("key", &self.key)
            .finish()
    }
}

/// A unit of deferred work.
///
/// Build it, then hand it to [`DispatchHandle::post_ex`]. The value stays with
/// the caller and keeps the ticket needed by [`DispatchHandle::cancel`].
///
/// ```ignore
/// let mut tick = Work::new(EVT_TICK, Payload::Empty)
///     .with_period(Duration::from_millis(50), Duration::from_millis(100))
///     .with_priority(Priority::Urgent);
/// handle.post_ex(&mut tick)?;
/// ```
///
/// [`DispatchHandle::post_ex`]: crate::DispatchHandle::post_ex
/// [`DispatchHandle::cancel`]: crate::DispatchHandle::cancel
#[derive(Debug)]
pub struct Work {
    event: EventCode,
    payload: Payload,
    delay: Duration,
    interval: Duration,
    priority: Priority,
    pub(crate) ticket: Option<WorkTicket>,
}

impl Work {
    /// One-shot work, due immediately, normal priority
    pub fn new(event: EventCode, payload: Payload) -> Self {
        Self {
            event,
            payload,
            delay: Duration::ZERO,
            interval: Duration::ZERO,
            priority: Priority::Normal,
            ticket: None,
        }
    }

    /// First run after `delay`, then every `interval` (zero means once)
    pub fn with_period(mut self, delay: Duration, interval: Duration) -> Self {
        self.set_period(delay, interval);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Takes effect on the next `post_ex`
    pub fn set_period(&mut self, delay: Duration, interval: Duration) {
        self.delay = delay;
        self.interval = interval;
    }

    /// Takes effect on the next `post_ex`
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub fn event(&self) -> EventCode {
        self.event
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_periodic(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Whether `post_ex` has armed this item and it has not been cancelled.
    ///
    /// A one-shot item stays armed after it ran; posting it again is allowed
    /// once the dispatcher has retired it.
    pub fn is_armed(&self) -> bool {
        self.ticket.is_some()
    }

    pub(crate) fn disarm(&mut self) {
        self.ticket = None;
    }
}

/// Clones are unarmed: a ticket belongs to exactly one `Work` value.
impl Clone for Work {
    fn clone(&self) -> Self {
        Self {
            event: self.event,
            payload: self.payload.clone(),
            delay: self.delay,
            interval: self.interval,
            priority: self.priority,
            ticket: None,
        }
    }
}
