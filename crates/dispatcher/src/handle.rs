//! DispatchHandle - a module's binding to a dispatcher instance

use std::fmt;
use std::sync::Arc;

use tracing::{info, instrument};

use contracts::{EventCode, Payload, Verbosity};

use crate::error::DispatcherError;
use crate::instance::{Dispatcher, Instance};
use crate::module::{HandleKind, ModuleEntry};
use crate::slot::SlotKey;
use crate::work::Work;

/// Handle through which a module posts to its dispatcher
///
/// Clones share the registration: deregistering through one clone
/// invalidates all of them.
#[derive(Clone)]
pub struct DispatchHandle {
    dispatcher: Dispatcher,
    entry: Arc<ModuleEntry>,
    /// Module table slot; `None` for system dispatch handles
    slot: Option<SlotKey>,
}

impl DispatchHandle {
    pub(crate) fn new(dispatcher: Dispatcher, entry: Arc<ModuleEntry>, slot: Option<SlotKey>) -> Self {
        Self {
            dispatcher,
            entry,
            slot,
        }
    }

    /// Name of the bound module
    pub fn module_name(&self) -> &str {
        self.entry.name()
    }

    pub fn kind(&self) -> HandleKind {
        self.entry.kind()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// False once deregistered or once the dispatcher is destroyed
    pub fn is_valid(&self) -> bool {
        self.entry.is_usable() && self.dispatcher.is_alive()
    }

    fn instance(&self) -> Result<&Arc<Instance>, DispatcherError> {
        if !self.entry.is_usable() {
            return Err(DispatcherError::bad_parameter(format!(
                "module '{}' has been deregistered",
                self.entry.name()
            )));
        }
        if !self.dispatcher.is_alive() {
            return Err(DispatcherError::bad_parameter(format!(
                "dispatcher '{}' has been destroyed",
                self.dispatcher.name()
            )));
        }
        Ok(self.dispatcher.instance())
    }

    /// Queue a message without blocking.
    ///
    /// Fails with `ResourceExhausted` when the ready queue is full. Safe to
    /// call from the dispatcher's own worker.
    pub fn post_try(&self, event: EventCode, payload: Payload) -> Result<(), DispatcherError> {
        self.instance()?.post_try(&self.entry, event, payload)
    }

    /// Queue a message, waiting up to the dispatcher's post timeout for room.
    ///
    /// Fails with `Timeout` when no slot frees up in time. Calling this from
    /// the dispatcher's own worker can only time out while the queue is full.
    pub fn post(&self, event: EventCode, payload: Payload) -> Result<(), DispatcherError> {
        self.instance()?.post(&self.entry, event, payload)
    }

    /// Arm `work` on this dispatcher without blocking.
    ///
    /// Fails with `NotSupported` while `work` is still armed, and with
    /// `ResourceExhausted` when the pending set is full.
    pub fn post_ex(&self, work: &mut Work) -> Result<(), DispatcherError> {
        self.instance()?.post_ex(&self.entry, work)
    }

    /// Cancel armed work.
    ///
    /// Succeeds only while `work` is still waiting for its deadline. Once it
    /// is ready or running this returns `TooLate`; it then runs one last time
    /// and retires, even if periodic.
    pub fn cancel(&self, work: &mut Work) -> Result<(), DispatcherError> {
        self.instance()?.cancel(work)
    }

    /// Set the dispatcher's diagnostic flags
    pub fn set_verbosity(&self, verbosity: Verbosity) -> Result<(), DispatcherError> {
        self.instance()?.set_verbosity(verbosity);
        Ok(())
    }

    /// Unbind the module.
    ///
    /// Runs `on_dereg` on the calling thread. Work queued before this call may
    /// still be delivered to `on_msg` afterwards.
    #[instrument(
        name = "dispatch_handle_deregister",
        skip(self),
        fields(dispatcher = %self.dispatcher.name(), module = %self.entry.name())
    )]
    pub fn deregister(&self) -> Result<(), DispatcherError> {
        let Some(slot) = self.slot else {
            return Err(DispatcherError::bad_parameter(
                "system dispatch handles have no registration to undo",
            ));
        };
        self.instance()?.deregister(&self.entry, slot)?;
        info!("Module deregistered");
        Ok(())
    }
}

impl fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("dispatcher", &self.dispatcher.name())
            .field("module", &self.entry.name())
            .field("kind", &self.entry.kind())
            .field("valid", &self.is_valid())
            .finish()
    }
}
