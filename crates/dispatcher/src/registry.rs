//! Registry of dispatcher instances

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, instrument};

use contracts::{DispatcherSpec, RegistryLimits, Verbosity};
use observability::StatsSummary;

use crate::error::{DispatcherError, Resource};
use crate::handle::DispatchHandle;
use crate::instance::{Dispatcher, DispatcherId};
use crate::metrics::MetricsSnapshot;
use crate::module::Module;
use crate::slot::SlotArena;

struct RegistryState {
    initialized: bool,
    dispatchers: SlotArena<Dispatcher>,
    system: Option<DispatcherId>,
    next_id: u64,
}

/// Table of live dispatcher instances and the system designation.
///
/// Constructed by [`Registry::init`] and torn down by [`Registry::deinit`].
/// Clones share the same table.
#[derive(Clone)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

/// One row of [`Registry::report`]
#[derive(Debug, Clone)]
pub struct DispatcherReport {
    /// Index accepted by [`Registry::set_verbosity_by_idx`]
    pub index: usize,
    pub id: DispatcherId,
    pub name: String,
    pub is_system: bool,
    pub verbosity: Verbosity,
    pub queue_capacity: usize,
    pub pending_capacity: usize,
    pub thread_priority: u8,
    pub modules: Vec<String>,
    pub metrics: MetricsSnapshot,
    /// Callback latency (µs)
    pub latency: StatsSummary,
}

impl Registry {
    /// Create an empty registry
    pub fn init(limits: RegistryLimits) -> Self {
        info!(max_dispatchers = limits.max_dispatchers, "Dispatcher registry initialized");
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                initialized: true,
                dispatchers: SlotArena::with_capacity(limits.max_dispatchers),
                system: None,
                next_id: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_initialized() -> DispatcherError {
        DispatcherError::not_supported("dispatcher registry is not initialized")
    }

    /// Tear the registry down. Fails while any dispatcher is alive.
    pub fn deinit(&self) -> Result<(), DispatcherError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(Self::not_initialized());
        }
        if !state.dispatchers.is_empty() {
            return Err(DispatcherError::not_supported(format!(
                "{} dispatcher(s) still alive",
                state.dispatchers.len()
            )));
        }
        state.initialized = false;
        info!("Dispatcher registry deinitialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Create a dispatcher instance and start its worker
    #[instrument(name = "registry_create", skip(self, spec), fields(dispatcher = %spec.name))]
    pub fn create(&self, spec: &DispatcherSpec) -> Result<Dispatcher, DispatcherError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(Self::not_initialized());
        }
        if state
            .dispatchers
            .iter()
            .any(|(_, dispatcher)| dispatcher.name() == spec.name)
        {
            return Err(DispatcherError::bad_parameter(format!(
                "dispatcher '{}' already exists",
                spec.name
            )));
        }
        if state.dispatchers.is_full() {
            return Err(DispatcherError::exhausted(
                Resource::DispatcherTable,
                format!("{} dispatchers already created", state.dispatchers.len()),
            ));
        }

        let id = DispatcherId::from_raw(state.next_id);
        let dispatcher = Dispatcher::spawn(id, spec)?;
        state.next_id += 1;
        state
            .dispatchers
            .insert(dispatcher.clone())
            .map_err(|_| {
                DispatcherError::exhausted(Resource::DispatcherTable, "dispatcher table is full")
            })?;
        Ok(dispatcher)
    }

    /// Stop a dispatcher's worker and remove it.
    ///
    /// All modules must be deregistered first. Queued work is dropped.
    /// Calling this from the dispatcher's own worker deadlocks.
    #[instrument(name = "registry_destroy", skip(self, dispatcher), fields(dispatcher = %dispatcher.name()))]
    pub fn destroy(&self, dispatcher: &Dispatcher) -> Result<(), DispatcherError> {
        let key = {
            let state = self.lock();
            let key = state
                .dispatchers
                .iter()
                .find(|(_, d)| d.id() == dispatcher.id())
                .map(|(key, _)| key)
                .ok_or_else(|| {
                    DispatcherError::bad_parameter(format!(
                        "dispatcher '{}' is not in this registry",
                        dispatcher.name()
                    ))
                })?;
            key
        };

        // Joining the worker happens without the registry lock held.
        dispatcher.instance().shutdown()?;

        let mut state = self.lock();
        state.dispatchers.remove(key);
        if state.system == Some(dispatcher.id()) {
            state.system = None;
        }
        info!("Dispatcher destroyed");
        Ok(())
    }

    /// Designate the system dispatcher, replacing any previous designation
    pub fn set_system_dispatcher(&self, dispatcher: &Dispatcher) -> Result<(), DispatcherError> {
        let mut state = self.lock();
        if !state.dispatchers.iter().any(|(_, d)| d == dispatcher) {
            return Err(DispatcherError::bad_parameter(format!(
                "dispatcher '{}' is not in this registry",
                dispatcher.name()
            )));
        }
        let previous = state.system.replace(dispatcher.id());
        for (_, d) in state.dispatchers.iter() {
            if Some(d.id()) == previous {
                d.instance().set_system(false);
            }
        }
        dispatcher.instance().set_system(true);
        info!(dispatcher = %dispatcher.name(), "System dispatcher set");
        Ok(())
    }

    pub fn system_dispatcher(&self) -> Option<Dispatcher> {
        let state = self.lock();
        let system = state.system?;
        let found = state
            .dispatchers
            .iter()
            .find(|(_, d)| d.id() == system)
            .map(|(_, d)| d.clone());
        found
    }

    /// Handle on the system dispatcher for `module`.
    ///
    /// `on_reg` is not called and the module does not appear in the module
    /// table; the handle cannot be deregistered.
    pub fn system_dispatch_handle(
        &self,
        module: Arc<dyn Module>,
    ) -> Result<DispatchHandle, DispatcherError> {
        if !self.is_initialized() {
            return Err(Self::not_initialized());
        }
        let dispatcher = self
            .system_dispatcher()
            .ok_or_else(|| DispatcherError::not_supported("no system dispatcher designated"))?;
        dispatcher.unregistered_handle(module)
    }

    /// Look up a live dispatcher by name
    pub fn get(&self, name: &str) -> Option<Dispatcher> {
        self.lock()
            .dispatchers
            .iter()
            .find(|(_, d)| d.name() == name)
            .map(|(_, d)| d.clone())
    }

    /// Live dispatchers in table order
    pub fn dispatchers(&self) -> Vec<Dispatcher> {
        self.lock()
            .dispatchers
            .iter()
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set verbosity of the dispatcher at `index` (as shown by [`Registry::debug`])
    pub fn set_verbosity_by_idx(
        &self,
        index: usize,
        verbosity: Verbosity,
    ) -> Result<(), DispatcherError> {
        let state = self.lock();
        let (_, dispatcher) = state
            .dispatchers
            .iter()
            .find(|(key, _)| key.index() == index)
            .ok_or_else(|| {
                DispatcherError::bad_parameter(format!("no dispatcher at index {index}"))
            })?;
        dispatcher.set_verbosity(verbosity);
        Ok(())
    }

    /// Snapshot of every dispatcher and its modules
    pub fn report(&self) -> Vec<DispatcherReport> {
        let dispatchers: Vec<(usize, Dispatcher)> = self
            .lock()
            .dispatchers
            .iter()
            .map(|(key, d)| (key.index(), d.clone()))
            .collect();

        dispatchers
            .into_iter()
            .map(|(index, d)| DispatcherReport {
                index,
                id: d.id(),
                name: d.name().to_string(),
                is_system: d.is_system(),
                verbosity: d.verbosity(),
                queue_capacity: d.spec().queue_capacity,
                pending_capacity: d.spec().pending_capacity,
                thread_priority: d.spec().thread_priority,
                modules: d.module_names(),
                metrics: d.metrics(),
                latency: d.latency(),
            })
            .collect()
    }

    /// Log every dispatcher and its modules.
    ///
    /// Returns the number of dispatchers plus registered modules.
    pub fn debug(&self) -> Result<usize, DispatcherError> {
        if !self.is_initialized() {
            return Err(Self::not_initialized());
        }
        let reports = self.report();
        let mut count = 0;
        for report in &reports {
            count += 1 + report.modules.len();
            info!(
                index = report.index,
                dispatcher = %report.name,
                system = report.is_system,
                verbosity = %report.verbosity,
                thread_priority = report.thread_priority,
                ready = report.metrics.ready_len,
                pending = report.metrics.pending_len,
                executed = report.metrics.executed,
                modules = report.modules.len(),
                "Dispatcher"
            );
            for module in &report.modules {
                info!(dispatcher = %report.name, module = %module, "Module");
            }
        }
        Ok(count)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Registry")
            .field("initialized", &state.initialized)
            .field("dispatchers", &state.dispatchers.len())
            .field("system", &state.system)
            .finish()
    }
}
