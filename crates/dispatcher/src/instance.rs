//! Dispatcher instance: one worker thread, one ready queue, one pending set

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use contracts::{DispatcherSpec, EventCode, Payload, Verbosity, MIN_STACK_SIZE};
use observability::StatsSummary;

use crate::clock::{duration_to_millis, TickClock};
use crate::error::{DispatcherError, Resource};
use crate::handle::DispatchHandle;
use crate::metrics::{DispatcherMetrics, MetricsSnapshot};
use crate::module::{validate_name, ActivateOnDrop, Module, ModuleEntry};
use crate::queue::{CancelOutcome, Queues};
use crate::slot::{SlotArena, SlotKey};
use crate::work::{Work, WorkTicket};
use crate::worker;

/// Registry-unique identity of a dispatcher instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatcherId(u64);

impl DispatcherId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Set once by the worker on its way out
#[derive(Debug, Default)]
pub(crate) struct WorkerExit {
    exited: Mutex<bool>,
    cond: Condvar,
}

impl WorkerExit {
    pub(crate) fn signal(&self) {
        *self.exited.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut exited = self.exited.lock().unwrap_or_else(PoisonError::into_inner);
        while !*exited {
            exited = self
                .cond
                .wait(exited)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(crate) fn has_exited(&self) -> bool {
        *self.exited.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared state of a dispatcher instance
pub(crate) struct Instance {
    pub(crate) id: DispatcherId,
    pub(crate) name: String,
    pub(crate) spec: DispatcherSpec,
    pub(crate) clock: TickClock,
    queues: Mutex<Queues>,
    /// Signalled when the worker frees a ready slot or the instance closes
    pub(crate) space: Condvar,
    /// Wakes the worker after a post or on shutdown
    pub(crate) wake: Notify,
    verbosity: AtomicU8,
    pub(crate) metrics: DispatcherMetrics,
    alive: AtomicBool,
    modules: Mutex<SlotArena<Arc<ModuleEntry>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) exit: WorkerExit,
    is_system: AtomicBool,
}

impl Instance {
    pub(crate) fn lock_queues(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_modules(&self) -> MutexGuard<'_, SlotArena<Arc<ModuleEntry>>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn verbosity(&self) -> Verbosity {
        Verbosity::from_bits(self.verbosity.load(Ordering::Relaxed))
    }

    pub(crate) fn set_verbosity(&self, verbosity: Verbosity) {
        self.verbosity.store(verbosity.bits(), Ordering::Relaxed);
        info!(dispatcher = %self.name, verbosity = %verbosity, "Verbosity changed");
    }

    pub(crate) fn set_system(&self, is_system: bool) {
        self.is_system.store(is_system, Ordering::Release);
    }

    fn closed() -> DispatcherError {
        DispatcherError::bad_parameter("dispatcher has been destroyed")
    }

    fn check_payload(&self, payload: &Payload) -> Result<(), DispatcherError> {
        if payload.len() > self.spec.max_payload_len {
            return Err(DispatcherError::bad_parameter(format!(
                "payload of {} bytes exceeds limit of {} bytes",
                payload.len(),
                self.spec.max_payload_len
            )));
        }
        Ok(())
    }

    fn accepted(&self, queues: MutexGuard<'_, Queues>) {
        self.metrics.inc_posted();
        self.metrics
            .set_depths(queues.ready_len(), queues.pending_len());
        drop(queues);
        self.wake.notify_one();
    }

    pub(crate) fn post_try(
        &self,
        module: &Arc<ModuleEntry>,
        event: EventCode,
        payload: Payload,
    ) -> Result<(), DispatcherError> {
        self.check_payload(&payload)?;
        let mut queues = self.lock_queues();
        if queues.is_closed() {
            return Err(Self::closed());
        }
        if let Err(e) = queues.push_message(Arc::clone(module), event, payload) {
            self.metrics.inc_rejected();
            return Err(e);
        }
        self.accepted(queues);
        Ok(())
    }

    pub(crate) fn post(
        &self,
        module: &Arc<ModuleEntry>,
        event: EventCode,
        payload: Payload,
    ) -> Result<(), DispatcherError> {
        self.check_payload(&payload)?;
        let timeout = self.spec.post_timeout();
        let started = Instant::now();
        let mut queues = self.lock_queues();
        loop {
            if queues.is_closed() {
                return Err(Self::closed());
            }
            if queues.has_room() {
                queues.push_message(Arc::clone(module), event, payload)?;
                self.accepted(queues);
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= timeout {
                self.metrics.inc_timeouts();
                return Err(DispatcherError::Timeout {
                    waited_ms: duration_to_millis(waited),
                });
            }
            let (guard, _) = self
                .space
                .wait_timeout(queues, timeout - waited)
                .unwrap_or_else(PoisonError::into_inner);
            queues = guard;
        }
    }

    pub(crate) fn post_ex(
        self: &Arc<Self>,
        module: &Arc<ModuleEntry>,
        work: &mut Work,
    ) -> Result<(), DispatcherError> {
        self.check_payload(work.payload())?;
        if let Some(ticket) = &work.ticket {
            let live = match ticket.instance.upgrade() {
                Some(owner) => {
                    let queues = owner.lock_queues();
                    queues.is_live(ticket.key)
                }
                None => false,
            };
            if live {
                return Err(DispatcherError::not_supported(
                    "work item is still armed; cancel it or wait for it to retire",
                ));
            }
            work.disarm();
        }

        let ready_at = self.clock.deadline(work.delay());
        let mut queues = self.lock_queues();
        if queues.is_closed() {
            return Err(Self::closed());
        }
        let key = match queues.arm(
            Arc::clone(module),
            work.event(),
            work.payload().clone(),
            work.interval(),
            work.priority(),
            ready_at,
        ) {
            Ok(key) => key,
            Err(e) => {
                self.metrics.inc_rejected();
                return Err(e);
            }
        };
        self.accepted(queues);

        work.ticket = Some(WorkTicket {
            instance: Arc::downgrade(self),
            dispatcher: self.id,
            key,
        });
        Ok(())
    }

    pub(crate) fn cancel(&self, work: &mut Work) -> Result<(), DispatcherError> {
        let Some(ticket) = work.ticket.as_ref() else {
            return Err(DispatcherError::bad_parameter("work item is not armed"));
        };
        if ticket.dispatcher != self.id {
            return Err(DispatcherError::bad_parameter(format!(
                "work item is armed on dispatcher {}, not '{}'",
                ticket.dispatcher, self.name
            )));
        }
        let key = ticket.key;
        let outcome = {
            let mut queues = self.lock_queues();
            let outcome = queues.cancel(key);
            self.metrics
                .set_depths(queues.ready_len(), queues.pending_len());
            outcome
        };
        match outcome {
            CancelOutcome::Cancelled => {
                work.disarm();
                self.metrics.inc_cancelled();
                debug!(dispatcher = %self.name, work = %key, "Work cancelled");
                Ok(())
            }
            CancelOutcome::TooLate(state) => {
                self.metrics.inc_too_late();
                debug!(dispatcher = %self.name, work = %key, ?state, "Cancel too late");
                Err(DispatcherError::too_late(format!(
                    "work item is {state:?}; it runs once more and then retires"
                )))
            }
            CancelOutcome::Retired => {
                work.disarm();
                self.metrics.inc_too_late();
                Err(DispatcherError::too_late("work item has already retired"))
            }
        }
    }

    pub(crate) fn deregister(
        &self,
        entry: &Arc<ModuleEntry>,
        key: SlotKey,
    ) -> Result<(), DispatcherError> {
        if !entry.begin_deregister() {
            return Err(DispatcherError::bad_parameter(format!(
                "module '{}' is not registered",
                entry.name()
            )));
        }

        match catch_unwind(AssertUnwindSafe(|| entry.module().on_dereg())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.inc_callback_failures();
                warn!(dispatcher = %self.name, module = %entry.name(), error = %e, "on_dereg failed");
            }
            Err(_) => {
                self.metrics.inc_callback_failures();
                error!(dispatcher = %self.name, module = %entry.name(), "on_dereg panicked");
            }
        }

        {
            let mut modules = self.lock_modules();
            modules.remove(key);
            self.metrics.set_module_count(modules.len());
        }
        entry.finish_deregister();
        Ok(())
    }

    /// Stop the worker and wait for it. Fails while modules are registered.
    pub(crate) fn shutdown(&self) -> Result<(), DispatcherError> {
        {
            let modules = self.lock_modules();
            if !self.is_alive() {
                return Err(Self::closed());
            }
            if !modules.is_empty() {
                return Err(DispatcherError::not_supported(format!(
                    "{} module(s) still registered on '{}'",
                    modules.len(),
                    self.name
                )));
            }
            self.alive.store(false, Ordering::Release);
        }

        let dropped = self.lock_queues().close();
        self.space.notify_all();
        self.wake.notify_one();
        self.exit.wait();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!(dispatcher = %self.name, "Worker thread panicked");
            }
        }

        self.metrics.set_depths(0, 0);
        self.set_system(false);
        if dropped > 0 {
            debug!(dispatcher = %self.name, dropped, "Dropped queued work on destroy");
        }
        Ok(())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

fn validate_spec(spec: &DispatcherSpec) -> Result<(), DispatcherError> {
    validate_name(&spec.name, "dispatcher")?;
    if spec.queue_capacity == 0 {
        return Err(DispatcherError::bad_parameter("queue_capacity must be > 0"));
    }
    if spec.pending_capacity == 0 {
        return Err(DispatcherError::bad_parameter(
            "pending_capacity must be > 0",
        ));
    }
    if spec.max_modules == 0 {
        return Err(DispatcherError::bad_parameter("max_modules must be > 0"));
    }
    if spec.stack_size < MIN_STACK_SIZE {
        return Err(DispatcherError::bad_parameter(format!(
            "stack_size {} below minimum of {MIN_STACK_SIZE} bytes",
            spec.stack_size
        )));
    }
    Ok(())
}

/// Handle to a dispatcher instance
///
/// Cheap to clone; all clones refer to the same worker.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Instance>,
}

impl Dispatcher {
    /// Spawn the worker thread and allocate the queues
    #[instrument(
        name = "dispatcher_spawn",
        skip(spec),
        fields(dispatcher = %spec.name, queue = spec.queue_capacity, pending = spec.pending_capacity)
    )]
    pub(crate) fn spawn(id: DispatcherId, spec: &DispatcherSpec) -> Result<Self, DispatcherError> {
        validate_spec(spec)?;

        let instance = Arc::new(Instance {
            id,
            name: spec.name.clone(),
            spec: spec.clone(),
            clock: TickClock::new(),
            queues: Mutex::new(Queues::new(spec.queue_capacity, spec.pending_capacity)),
            space: Condvar::new(),
            wake: Notify::new(),
            verbosity: AtomicU8::new(spec.initial_verbosity().bits()),
            metrics: DispatcherMetrics::new(&spec.name),
            alive: AtomicBool::new(true),
            modules: Mutex::new(SlotArena::with_capacity(spec.max_modules)),
            worker: Mutex::new(None),
            exit: WorkerExit::default(),
            is_system: AtomicBool::new(false),
        });

        // The runtime is built on the worker so it is also dropped there.
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);
        let worker_instance = Arc::clone(&instance);
        let worker = thread::Builder::new()
            .name(spec.name.clone())
            .stack_size(spec.stack_size)
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        worker_instance.exit.signal();
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                worker::run(worker_instance, runtime);
            })
            .map_err(|e| {
                DispatcherError::exhausted(
                    Resource::WorkerThread,
                    format!("failed to spawn '{}': {e}", spec.name),
                )
            })?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err("worker exited during startup".to_string()));
        if let Err(message) = started {
            instance.alive.store(false, Ordering::Release);
            let _ = worker.join();
            return Err(DispatcherError::exhausted(Resource::WorkerThread, message));
        }

        *instance
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(worker);

        info!(
            dispatcher = %spec.name,
            id = %id,
            stack_size = spec.stack_size,
            thread_priority = spec.thread_priority,
            "Dispatcher created"
        );
        Ok(Self { inner: instance })
    }

    pub(crate) fn instance(&self) -> &Arc<Instance> {
        &self.inner
    }

    pub fn id(&self) -> DispatcherId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration the instance was created with
    pub fn spec(&self) -> &DispatcherSpec {
        &self.inner.spec
    }

    /// False once destroyed
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    pub fn is_system(&self) -> bool {
        self.inner.is_system.load(Ordering::Acquire)
    }

    pub fn verbosity(&self) -> Verbosity {
        self.inner.verbosity()
    }

    pub fn set_verbosity(&self, verbosity: Verbosity) {
        self.inner.set_verbosity(verbosity);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Callback latency summary (µs)
    pub fn latency(&self) -> StatsSummary {
        self.inner.metrics.latency()
    }

    /// Registered modules; 0 once destroyed
    pub fn module_count(&self) -> usize {
        if !self.is_alive() {
            return 0;
        }
        self.inner.lock_modules().len()
    }

    /// Names of registered modules in table order
    pub fn module_names(&self) -> Vec<String> {
        self.inner
            .lock_modules()
            .iter()
            .map(|(_, entry)| entry.name().to_string())
            .collect()
    }

    /// Bind `module` to this dispatcher.
    ///
    /// `on_reg` runs on the calling thread before this returns. Work the
    /// module posts from `on_reg` is held back until `on_reg` has returned.
    /// A failing `on_reg` is logged; the registration still stands.
    #[instrument(
        name = "dispatcher_register_module",
        skip(self, module),
        fields(dispatcher = %self.name(), module = %module.name())
    )]
    pub fn register_module(&self, module: Arc<dyn Module>) -> Result<DispatchHandle, DispatcherError> {
        validate_name(module.name(), "module")?;
        let instance = &self.inner;
        let entry = Arc::new(ModuleEntry::registering(module));

        let key = {
            let mut modules = instance.lock_modules();
            if !instance.is_alive() {
                return Err(Instance::closed());
            }
            let key = modules.insert(Arc::clone(&entry)).map_err(|_| {
                DispatcherError::exhausted(
                    Resource::ModuleTable,
                    format!("{} modules already registered", modules.len()),
                )
            })?;
            instance.metrics.set_module_count(modules.len());
            key
        };

        let handle = DispatchHandle::new(self.clone(), Arc::clone(&entry), Some(key));
        {
            let _activate = ActivateOnDrop(&entry);
            match catch_unwind(AssertUnwindSafe(|| entry.module().on_reg(&handle))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    instance.metrics.inc_callback_failures();
                    warn!(module = %entry.name(), error = %e, "on_reg failed");
                }
                Err(_) => {
                    instance.metrics.inc_callback_failures();
                    error!(module = %entry.name(), "on_reg panicked");
                }
            }
        }

        info!(module = %entry.name(), slot = %key, "Module registered");
        Ok(handle)
    }

    /// Handle on this dispatcher with no registration behind it
    pub(crate) fn unregistered_handle(
        &self,
        module: Arc<dyn Module>,
    ) -> Result<DispatchHandle, DispatcherError> {
        validate_name(module.name(), "module")?;
        if !self.is_alive() {
            return Err(Instance::closed());
        }
        let entry = Arc::new(ModuleEntry::system(module));
        Ok(DispatchHandle::new(self.clone(), entry, None))
    }

    /// Block until the worker exits, i.e. until another thread destroys
    /// this dispatcher. Calling it from the worker itself never returns.
    pub fn join(&self) {
        self.inner.exit.wait();
    }

    /// Whether the worker has exited
    pub fn is_finished(&self) -> bool {
        self.inner.exit.has_exited()
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Dispatcher {}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}
