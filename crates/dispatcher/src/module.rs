//! Module interface and per-registration bookkeeping

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use contracts::{EventCode, Payload, NAME_MAX_LEN};

use crate::error::DispatcherError;
use crate::handle::DispatchHandle;

/// Application logic served by a dispatcher.
///
/// All callbacks for modules registered to the same dispatcher run on that
/// dispatcher's worker thread, one at a time. `on_reg` and `on_dereg` run on
/// the thread calling `register_module` / `deregister`.
///
/// State the module needs across callbacks lives in the implementor itself;
/// use interior mutability, callbacks only get `&self`.
pub trait Module: Send + Sync + 'static {
    /// Name shown in diagnostics, 1 to 16 bytes
    fn name(&self) -> &str;

    /// Handle a message or work item
    fn on_msg(&self, event: EventCode, payload: &Payload) -> Result<(), DispatcherError>;

    /// Called once registration is in place and before `register_module`
    /// returns; work posted from here is delivered only after it returns.
    fn on_reg(&self, _handle: &DispatchHandle) -> Result<(), DispatcherError> {
        Ok(())
    }

    /// Called when the module is deregistered. Work queued before this point
    /// may still arrive at `on_msg` afterwards.
    fn on_dereg(&self) -> Result<(), DispatcherError> {
        Ok(())
    }
}

/// How a handle was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Through `register_module`; supports `deregister`
    Registered,
    /// Through `system_dispatch_handle`; no lifecycle
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModuleState {
    Registering,
    Active,
    Deregistering,
    Deregistered,
}

/// Shared state of one module binding
pub(crate) struct ModuleEntry {
    module: Arc<dyn Module>,
    name: String,
    kind: HandleKind,
    state: Mutex<ModuleState>,
    state_changed: Condvar,
}

impl ModuleEntry {
    /// Entry for `register_module`; held back until `activate`
    pub(crate) fn registering(module: Arc<dyn Module>) -> Self {
        Self::with_state(module, HandleKind::Registered, ModuleState::Registering)
    }

    /// Entry for a system dispatch handle; usable immediately
    pub(crate) fn system(module: Arc<dyn Module>) -> Self {
        Self::with_state(module, HandleKind::System, ModuleState::Active)
    }

    fn with_state(module: Arc<dyn Module>, kind: HandleKind, state: ModuleState) -> Self {
        let name = module.name().to_string();
        Self {
            module,
            name,
            kind,
            state: Mutex::new(state),
            state_changed: Condvar::new(),
        }
    }

    pub(crate) fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> HandleKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, ModuleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ModuleState {
        *self.lock()
    }

    /// Whether posts through this binding are accepted
    pub(crate) fn is_usable(&self) -> bool {
        !matches!(self.state(), ModuleState::Deregistered)
    }

    /// `on_reg` has returned
    pub(crate) fn activate(&self) {
        let mut state = self.lock();
        if *state == ModuleState::Registering {
            *state = ModuleState::Active;
        }
        drop(state);
        self.state_changed.notify_all();
    }

    /// Block until `on_reg` has returned
    pub(crate) fn wait_registered(&self) {
        let mut state = self.lock();
        while *state == ModuleState::Registering {
            state = self
                .state_changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Claim the deregistration; false when not active
    pub(crate) fn begin_deregister(&self) -> bool {
        let mut state = self.lock();
        if *state == ModuleState::Active {
            *state = ModuleState::Deregistering;
            true
        } else {
            false
        }
    }

    pub(crate) fn finish_deregister(&self) {
        *self.lock() = ModuleState::Deregistered;
    }
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

/// Marks a registering entry active when dropped, so a panicking `on_reg`
/// cannot leave the worker waiting forever.
pub(crate) struct ActivateOnDrop<'a>(pub(crate) &'a ModuleEntry);

impl Drop for ActivateOnDrop<'_> {
    fn drop(&mut self) {
        self.0.activate();
    }
}

/// Check a module or dispatcher name
pub(crate) fn validate_name(name: &str, what: &str) -> Result<(), DispatcherError> {
    if name.is_empty() {
        return Err(DispatcherError::bad_parameter(format!(
            "{what} name cannot be empty"
        )));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(DispatcherError::bad_parameter(format!(
            "{what} name '{name}' longer than {NAME_MAX_LEN} bytes"
        )));
    }
    Ok(())
}
