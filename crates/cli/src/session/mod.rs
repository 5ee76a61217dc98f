//! Dispatch session: topology bring-up, demo modules and teardown.

mod modules;
mod orchestrator;
mod stats;

pub use modules::{DebugReporter, Heartbeat, ReporterBinding};
pub use orchestrator::{Session, SessionConfig};
pub use stats::{HeartbeatStats, SessionStats};
