//! DispatchBlueprint - Config Loader output
//!
//! Describes the dispatcher topology of a process: which instances exist, how
//! large their queues are, how their worker threads are sized, and which one is
//! the system dispatcher.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Verbosity, VerbosityFlag};

/// Maximum length of a module or dispatcher name in bytes
pub const NAME_MAX_LEN: usize = 16;

/// Default number of ready-queue slots per dispatcher
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Default number of pending work slots per dispatcher
pub const DEFAULT_PENDING_CAPACITY: usize = 20;

/// Default number of modules one dispatcher accepts
pub const DEFAULT_MAX_MODULES: usize = 16;

/// Smallest worker stack accepted
pub const MIN_STACK_SIZE: usize = 32 * 1024;

/// Default worker stack size
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete dispatcher topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Name of the dispatcher designated as system dispatcher
    #[serde(default)]
    pub system_dispatcher: Option<String>,

    /// Process-wide limits
    #[serde(default)]
    pub limits: RegistryLimits,

    /// Dispatcher instances to create, in creation order
    pub dispatchers: Vec<DispatcherSpec>,
}

impl DispatchBlueprint {
    /// Look up a dispatcher spec by name
    pub fn dispatcher(&self, name: &str) -> Option<&DispatcherSpec> {
        self.dispatchers.iter().find(|spec| spec.name == name)
    }
}

/// Limits of the dispatcher registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryLimits {
    /// Maximum number of live dispatcher instances
    #[serde(default = "default_max_dispatchers")]
    pub max_dispatchers: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_dispatchers: default_max_dispatchers(),
        }
    }
}

fn default_max_dispatchers() -> usize {
    8
}

/// One dispatcher instance: worker thread plus bounded queues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSpec {
    /// Instance name (also the worker thread name)
    pub name: String,

    /// Ready-queue slots shared by messages and promoted work
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Slots for work submitted through `post_ex`
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,

    /// Maximum registered modules
    #[serde(default = "default_max_modules")]
    pub max_modules: usize,

    /// Worker stack size in bytes
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,

    /// Requested worker priority (recorded, reported in diagnostics)
    #[serde(default = "default_thread_priority")]
    pub thread_priority: u8,

    /// Bounded wait of `post` for queue space
    #[serde(default = "default_post_timeout_ms")]
    pub post_timeout_ms: u64,

    /// Largest payload accepted by a post
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,

    /// Initial verbosity flags
    #[serde(default)]
    pub verbosity: Vec<VerbosityFlag>,
}

impl DispatcherSpec {
    /// Spec with defaults for everything but the name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue_capacity: default_queue_capacity(),
            pending_capacity: default_pending_capacity(),
            max_modules: default_max_modules(),
            stack_size: default_stack_size(),
            thread_priority: default_thread_priority(),
            post_timeout_ms: default_post_timeout_ms(),
            max_payload_len: default_max_payload_len(),
            verbosity: Vec::new(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity;
        self
    }

    pub fn with_max_modules(mut self, max: usize) -> Self {
        self.max_modules = max;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn with_thread_priority(mut self, priority: u8) -> Self {
        self.thread_priority = priority;
        self
    }

    pub fn with_post_timeout(mut self, timeout: Duration) -> Self {
        self.post_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn post_timeout(&self) -> Duration {
        Duration::from_millis(self.post_timeout_ms)
    }

    pub fn initial_verbosity(&self) -> Verbosity {
        Verbosity::from_flags(&self.verbosity)
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_pending_capacity() -> usize {
    DEFAULT_PENDING_CAPACITY
}

fn default_max_modules() -> usize {
    DEFAULT_MAX_MODULES
}

fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

fn default_thread_priority() -> u8 {
    5
}

fn default_post_timeout_ms() -> u64 {
    50
}

fn default_max_payload_len() -> usize {
    64 * 1024
}
