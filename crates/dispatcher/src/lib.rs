//! # Dispatcher
//!
//! 模块调度与工作排程。
//!
//! 负责：
//! - 每个实例一个 worker 线程，串行执行模块回调
//! - 立即消息 (`post_try` / `post`)、延时与周期工作 (`post_ex`)、取消 (`cancel`)
//! - 模块注册 / 注销，系统调度器
//! - 诊断：verbosity 标志、`Registry::debug`、指标快照
//!
//! ## 使用示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use contracts::{DispatcherSpec, Payload, RegistryLimits};
//! use dispatcher::{Registry, Work};
//!
//! let registry = Registry::init(RegistryLimits::default());
//! let main = registry.create(&DispatcherSpec::new("main"))?;
//! let handle = main.register_module(Arc::new(MyModule::default()))?;
//!
//! handle.post_try(EVT_HELLO, Payload::Empty)?;
//! let mut tick = Work::new(EVT_TICK, Payload::Empty)
//!     .with_period(Duration::from_millis(50), Duration::from_millis(100));
//! handle.post_ex(&mut tick)?;
//! ```

pub mod builder;
pub mod clock;
pub mod error;
pub mod handle;
pub mod instance;
pub mod metrics;
pub mod module;
mod queue;
pub mod registry;
pub mod slot;
pub mod work;
mod worker;

pub use builder::{create_registry, DispatchSystem, DispatcherBuilder};
pub use clock::{Tick, TickClock};
pub use contracts::{EventCode, Payload, Priority, Verbosity};
pub use error::{DispatcherError, ErrorKind, Resource};
pub use handle::DispatchHandle;
pub use instance::{Dispatcher, DispatcherId};
pub use metrics::{DispatcherMetrics, MetricsSnapshot};
pub use module::{HandleKind, Module};
pub use registry::{DispatcherReport, Registry};
pub use slot::{SlotArena, SlotKey};
pub use work::Work;
