//! Session orchestrator - brings up the dispatchers, attaches the demo
//! modules and tears everything down in order.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use contracts::DispatchBlueprint;
use dispatcher::{DispatchHandle, DispatcherBuilder};
use tracing::{info, warn};

use super::{DebugReporter, Heartbeat, HeartbeatStats, ReporterBinding, SessionStats};
use crate::error::CliError;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Validated topology
    pub blueprint: DispatchBlueprint,

    /// Run time (None = until the shutdown signal)
    pub duration: Option<Duration>,

    /// Heartbeat interval of the module registered on every dispatcher
    pub heartbeat: Duration,

    /// Registry dump interval on the system dispatcher (None = disabled)
    pub debug_interval: Option<Duration>,
}

/// Runs one dispatch session
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run until the configured duration elapses or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<SessionStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();

        info!("Creating dispatchers...");
        let system = DispatcherBuilder::new(self.config.blueprint.clone())
            .build()
            .map_err(|e| CliError::dispatcher("create", e))?;

        // Heartbeat modules
        let mut heartbeats: Vec<(String, Arc<Heartbeat>, DispatchHandle)> = Vec::new();
        for dispatcher in system.dispatchers() {
            let module = Arc::new(Heartbeat::new(self.config.heartbeat));
            let handle = dispatcher
                .register_module(module.clone())
                .map_err(|e| CliError::dispatcher("register", e))?;
            heartbeats.push((dispatcher.name().to_string(), module, handle));
        }
        info!(
            modules = heartbeats.len(),
            interval_ms = self.config.heartbeat.as_millis() as u64,
            "Heartbeat modules registered"
        );

        // Registry dump on the system dispatcher
        let reporter = Arc::new(DebugReporter::new(system.registry().clone()));
        let binding = match (self.config.debug_interval, system.system()) {
            (Some(interval), Some(sys)) => {
                let handle = system
                    .registry()
                    .system_dispatch_handle(reporter.clone())
                    .map_err(|e| CliError::dispatcher("system handle", e))?;
                let binding = ReporterBinding::start(handle, interval)
                    .map_err(|e| CliError::dispatcher("debug report", e))?;
                info!(dispatcher = %sys.name(), interval_secs = interval.as_secs(), "Registry debug reporting enabled");
                Some(binding)
            }
            (Some(_), None) => {
                warn!("Debug interval set but no system dispatcher configured");
                None
            }
            (None, _) => None,
        };

        info!(duration = ?self.config.duration, "Session running");
        match self.config.duration {
            Some(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        info!(secs = duration.as_secs_f64(), "Run duration reached");
                    }
                    _ = shutdown => {}
                }
            }
            None => shutdown.await,
        }

        // Teardown
        info!("Stopping session...");
        if let Some(binding) = binding {
            if let Err(e) = binding.stop() {
                warn!(error = %e, "Failed to cancel debug report");
            }
        }

        let mut heartbeat_stats = Vec::with_capacity(heartbeats.len());
        for (dispatcher, module, handle) in heartbeats {
            if let Err(e) = handle.deregister() {
                warn!(dispatcher = %dispatcher, error = %e, "Failed to deregister heartbeat");
            }
            heartbeat_stats.push(HeartbeatStats {
                dispatcher,
                beats: module.beats(),
                spacing: module.spacing(),
            });
        }

        let dispatchers = system.registry().report();
        system
            .shutdown()
            .map_err(|e| CliError::shutdown(e.to_string()))?;

        let stats = SessionStats {
            duration: start_time.elapsed(),
            dispatchers,
            heartbeats: heartbeat_stats,
            reports: reporter.reports(),
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            executed = stats.total_executed(),
            "Session shutdown complete"
        );

        Ok(stats)
    }
}
