//! Ready queue and pending set of one dispatcher instance.
//!
//! Everything here is allocated up front: two ring-buffer lanes sharing one
//! capacity, a slot arena for armed work and a deadline heap that never holds
//! more entries than the arena. The worker promotes due work from the pending
//! set into the ready lanes and pops jobs in ready order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use ringbuf::{traits::*, HeapRb};

use contracts::{EventCode, Payload, Priority};

use crate::clock::Tick;
use crate::error::{DispatcherError, Resource};
use crate::module::ModuleEntry;
use crate::slot::{SlotArena, SlotKey};

/// Entry of a ready lane
pub(crate) enum Job {
    /// Immediate message from `post_try` / `post`
    Message {
        module: Arc<ModuleEntry>,
        event: EventCode,
        payload: Payload,
    },
    /// Promoted work item, resolved through the arena when popped
    Work(SlotKey),
}

/// Two FIFO lanes, urgent drained first, bounded by one shared capacity
struct ReadyQueue {
    urgent: HeapRb<Job>,
    normal: HeapRb<Job>,
    capacity: usize,
}

impl ReadyQueue {
    fn new(capacity: usize) -> Self {
        Self {
            urgent: HeapRb::new(capacity),
            normal: HeapRb::new(capacity),
            capacity,
        }
    }

    fn len(&self) -> usize {
        self.urgent.occupied_len() + self.normal.occupied_len()
    }

    fn has_room(&self) -> bool {
        self.len() < self.capacity
    }

    fn push(&mut self, job: Job, priority: Priority) -> Result<(), Job> {
        if !self.has_room() {
            return Err(job);
        }
        if priority.is_urgent() {
            self.urgent.try_push(job)
        } else {
            self.normal.try_push(job)
        }
    }

    fn pop(&mut self) -> Option<Job> {
        self.urgent.try_pop().or_else(|| self.normal.try_pop())
    }

    fn clear(&mut self) -> usize {
        self.urgent.clear() + self.normal.clear()
    }
}

/// Lifecycle of an armed work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkState {
    /// Waiting for `ready_at` (or for room in the ready queue)
    Pending,
    /// In a ready lane
    Ready,
    /// Callback running on the worker
    Executing,
}

/// Armed work held by the arena
pub(crate) struct WorkEntry {
    module: Arc<ModuleEntry>,
    event: EventCode,
    payload: Payload,
    interval: Duration,
    priority: Priority,
    ready_at: Tick,
    state: WorkState,
    /// Cancel arrived too late; retire after the current run
    retire_after_run: bool,
}

/// Pending-set ordering key: earliest deadline, then urgent, then arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline {
    ready_at: Tick,
    urgent: bool,
    seq: u64,
    key: SlotKey,
}

impl Ord for Deadline {
    // BinaryHeap is a max-heap; the "greatest" deadline is the one due first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ready_at
            .cmp(&self.ready_at)
            .then_with(|| self.urgent.cmp(&other.urgent))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of cancelling armed work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelOutcome {
    /// Removed before it became ready
    Cancelled,
    /// Ready or executing; runs once more, then retires
    TooLate(WorkState),
    /// Already retired
    Retired,
}

/// Job popped by the worker, ready to hand to `on_msg`
pub(crate) struct Delivery {
    pub(crate) module: Arc<ModuleEntry>,
    pub(crate) event: EventCode,
    pub(crate) payload: Payload,
    /// Arena slot for work items, `None` for plain messages
    pub(crate) work: Option<SlotKey>,
}

/// Scheduling state of one instance, guarded by the instance lock
pub(crate) struct Queues {
    ready: ReadyQueue,
    work: SlotArena<WorkEntry>,
    deadlines: BinaryHeap<Deadline>,
    next_seq: u64,
    closed: bool,
}

impl Queues {
    pub(crate) fn new(queue_capacity: usize, pending_capacity: usize) -> Self {
        Self {
            ready: ReadyQueue::new(queue_capacity),
            work: SlotArena::with_capacity(pending_capacity),
            deadlines: BinaryHeap::with_capacity(pending_capacity),
            next_seq: 0,
            closed: false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn has_room(&self) -> bool {
        self.ready.has_room()
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Armed work items, whatever their state
    pub(crate) fn pending_len(&self) -> usize {
        self.work.len()
    }

    /// Append a message to the normal lane
    pub(crate) fn push_message(
        &mut self,
        module: Arc<ModuleEntry>,
        event: EventCode,
        payload: Payload,
    ) -> Result<(), DispatcherError> {
        let job = Job::Message {
            module,
            event,
            payload,
        };
        self.ready.push(job, Priority::Normal).map_err(|_| {
            DispatcherError::exhausted(
                Resource::ReadyQueue,
                format!("{} of {} slots in use", self.ready.len(), self.ready.capacity),
            )
        })
    }

    /// Insert work into the pending set, due at `ready_at`
    pub(crate) fn arm(
        &mut self,
        module: Arc<ModuleEntry>,
        event: EventCode,
        payload: Payload,
        interval: Duration,
        priority: Priority,
        ready_at: Tick,
    ) -> Result<SlotKey, DispatcherError> {
        let entry = WorkEntry {
            module,
            event,
            payload,
            interval,
            priority,
            ready_at,
            state: WorkState::Pending,
            retire_after_run: false,
        };
        let key = self.work.insert(entry).map_err(|_| {
            DispatcherError::exhausted(
                Resource::PendingSet,
                format!("{} of {} slots in use", self.work.len(), self.work.capacity()),
            )
        })?;
        self.schedule(key, ready_at, priority);
        Ok(key)
    }

    fn schedule(&mut self, key: SlotKey, ready_at: Tick, priority: Priority) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.deadlines.push(Deadline {
            ready_at,
            urgent: priority.is_urgent(),
            seq,
            key,
        });
    }

    /// Whether `key` still refers to armed work
    pub(crate) fn is_live(&self, key: SlotKey) -> bool {
        self.work.contains(key)
    }

    pub(crate) fn cancel(&mut self, key: SlotKey) -> CancelOutcome {
        let Some(entry) = self.work.get_mut(key) else {
            return CancelOutcome::Retired;
        };
        let state = entry.state;
        match state {
            WorkState::Pending => {
                self.deadlines.retain(|deadline| deadline.key != key);
                self.work.remove(key);
                CancelOutcome::Cancelled
            }
            _ => {
                entry.retire_after_run = true;
                CancelOutcome::TooLate(state)
            }
        }
    }

    /// Move work due at `now` into the ready lanes while there is room.
    /// Returns the number of items promoted.
    pub(crate) fn promote(&mut self, now: Tick) -> usize {
        let mut promoted = 0;
        while self.ready.has_room() {
            let Some(next) = self.deadlines.peek().copied() else {
                break;
            };
            if next.ready_at > now {
                break;
            }
            self.deadlines.pop();
            let Some(entry) = self.work.get_mut(next.key) else {
                continue;
            };
            let priority = entry.priority;
            entry.state = WorkState::Ready;
            if self.ready.push(Job::Work(next.key), priority).is_err() {
                // has_room was checked above
                entry.state = WorkState::Pending;
                self.deadlines.push(next);
                break;
            }
            promoted += 1;
        }
        promoted
    }

    /// Earliest deadline still waiting in the pending set
    pub(crate) fn next_deadline(&self) -> Option<Tick> {
        self.deadlines.peek().map(|deadline| deadline.ready_at)
    }

    /// Pop the next job in ready order
    pub(crate) fn pop(&mut self) -> Option<Delivery> {
        while let Some(job) = self.ready.pop() {
            match job {
                Job::Message {
                    module,
                    event,
                    payload,
                } => {
                    return Some(Delivery {
                        module,
                        event,
                        payload,
                        work: None,
                    })
                }
                Job::Work(key) => {
                    let Some(entry) = self.work.get_mut(key) else {
                        continue;
                    };
                    entry.state = WorkState::Executing;
                    return Some(Delivery {
                        module: Arc::clone(&entry.module),
                        event: entry.event,
                        payload: mem::take(&mut entry.payload),
                        work: Some(key),
                    });
                }
            }
        }
        None
    }

    /// Work item finished running at `now`: re-arm it or retire it.
    /// Returns true when it was re-armed.
    pub(crate) fn finish(&mut self, key: SlotKey, payload: Payload, now: Tick) -> bool {
        let Some(entry) = self.work.get_mut(key) else {
            return false;
        };
        let rearm = !entry.interval.is_zero()
            && !entry.retire_after_run
            && entry.module.is_usable();
        if !rearm {
            self.work.remove(key);
            return false;
        }
        entry.payload = payload;
        entry.state = WorkState::Pending;
        entry.ready_at = now.after(entry.interval);
        let (ready_at, priority) = (entry.ready_at, entry.priority);
        self.schedule(key, ready_at, priority);
        true
    }

    /// Refuse further work and drop everything queued.
    /// Returns the number of jobs and work items dropped.
    pub(crate) fn close(&mut self) -> usize {
        self.closed = true;
        let dropped = self.ready.clear() + self.work.len();
        self.deadlines.clear();
        self.work.clear();
        dropped
    }
}

impl fmt::Debug for Queues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queues")
            .field("ready", &self.ready.len())
            .field("ready_capacity", &self.ready.capacity)
            .field("pending", &self.work.len())
            .field("pending_capacity", &self.work.capacity())
            .field("closed", &self.closed)
            .finish()
    }
}
