//! # Contracts
//!
//! Frozen interface contracts shared by the dispatcher workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All scheduling delays are expressed as `Duration` and quantised to
//!   whole milliseconds by the dispatcher's tick clock
//! - Configuration files carry milliseconds (`*_ms` fields)

mod blueprint;
mod error;
mod payload;
mod priority;
mod verbosity;

pub use blueprint::*;
pub use error::*;
pub use payload::{EventCode, InlinePayload, Payload, INLINE_PAYLOAD_CAPACITY};
pub use priority::Priority;
pub use verbosity::{Verbosity, VerbosityFlag};
