//! DispatcherBuilder - brings up a registry and its instances from a blueprint

use tracing::{error, info, instrument};

use contracts::{DispatchBlueprint, DispatcherSpec};

use crate::error::DispatcherError;
use crate::instance::Dispatcher;
use crate::metrics::MetricsSnapshot;
use crate::registry::Registry;

/// Builder for a [`DispatchSystem`]
pub struct DispatcherBuilder {
    blueprint: DispatchBlueprint,
}

impl DispatcherBuilder {
    pub fn new(blueprint: DispatchBlueprint) -> Self {
        Self { blueprint }
    }

    /// Create the registry, every dispatcher in blueprint order, and apply the
    /// system designation. Instances already created are destroyed again if a
    /// later step fails.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(dispatchers = self.blueprint.dispatchers.len())
    )]
    pub fn build(self) -> Result<DispatchSystem, DispatcherError> {
        let registry = Registry::init(self.blueprint.limits);
        let mut dispatchers = Vec::with_capacity(self.blueprint.dispatchers.len());

        match Self::initialize(&registry, &self.blueprint, &mut dispatchers) {
            Ok(()) => {
                info!(dispatchers = dispatchers.len(), "Dispatch system ready");
                Ok(DispatchSystem {
                    registry,
                    dispatchers,
                })
            }
            Err(e) => {
                for dispatcher in &dispatchers {
                    if let Err(destroy_err) = registry.destroy(dispatcher) {
                        error!(dispatcher = %dispatcher.name(), error = %destroy_err, "Rollback failed");
                    }
                }
                Err(e)
            }
        }
    }

    fn initialize(
        registry: &Registry,
        blueprint: &DispatchBlueprint,
        dispatchers: &mut Vec<Dispatcher>,
    ) -> Result<(), DispatcherError> {
        for spec in &blueprint.dispatchers {
            dispatchers.push(create_instance(registry, spec)?);
        }
        if let Some(system) = &blueprint.system_dispatcher {
            let dispatcher = dispatchers
                .iter()
                .find(|d| d.name() == system)
                .ok_or_else(|| {
                    DispatcherError::bad_parameter(format!(
                        "system dispatcher '{system}' is not defined"
                    ))
                })?;
            registry.set_system_dispatcher(dispatcher)?;
        }
        Ok(())
    }
}

#[instrument(
    name = "dispatcher_create_instance",
    skip(registry, spec),
    fields(dispatcher = %spec.name)
)]
fn create_instance(registry: &Registry, spec: &DispatcherSpec) -> Result<Dispatcher, DispatcherError> {
    let dispatcher = registry.create(spec)?;
    if !spec.verbosity.is_empty() {
        info!(verbosity = %dispatcher.verbosity(), "Initial verbosity");
    }
    Ok(dispatcher)
}

/// A registry together with the dispatchers built from one blueprint
#[derive(Debug)]
pub struct DispatchSystem {
    registry: Registry,
    dispatchers: Vec<Dispatcher>,
}

impl DispatchSystem {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatchers in blueprint order
    pub fn dispatchers(&self) -> &[Dispatcher] {
        &self.dispatchers
    }

    pub fn dispatcher(&self, name: &str) -> Option<&Dispatcher> {
        self.dispatchers.iter().find(|d| d.name() == name)
    }

    pub fn system(&self) -> Option<Dispatcher> {
        self.registry.system_dispatcher()
    }

    /// Get metrics for all dispatchers
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.dispatchers
            .iter()
            .map(|d| (d.name().to_string(), d.metrics()))
            .collect()
    }

    /// Destroy every dispatcher, then deinit the registry.
    ///
    /// Modules must have been deregistered. The first failure is returned
    /// after the remaining dispatchers have been attempted.
    #[instrument(name = "dispatch_system_shutdown", skip(self))]
    pub fn shutdown(self) -> Result<(), DispatcherError> {
        let mut first_error = None;
        for dispatcher in &self.dispatchers {
            if !dispatcher.is_alive() {
                continue;
            }
            if let Err(e) = self.registry.destroy(dispatcher) {
                error!(dispatcher = %dispatcher.name(), error = %e, "Destroy failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        self.registry.deinit()?;
        info!("Dispatch system shutdown complete");
        Ok(())
    }
}

/// Convenience function to build a dispatch system from a blueprint
pub fn create_registry(blueprint: DispatchBlueprint) -> Result<DispatchSystem, DispatcherError> {
    DispatcherBuilder::new(blueprint).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use contracts::{ConfigVersion, RegistryLimits, Verbosity, VerbosityFlag};

    fn blueprint(system: Option<&str>) -> DispatchBlueprint {
        let mut io = DispatcherSpec::new("io");
        io.verbosity = vec![VerbosityFlag::Timing];
        DispatchBlueprint {
            version: ConfigVersion::V1,
            system_dispatcher: system.map(str::to_string),
            limits: RegistryLimits::default(),
            dispatchers: vec![DispatcherSpec::new("main"), io],
        }
    }

    #[test]
    fn test_build_and_shutdown() {
        let system = create_registry(blueprint(Some("main"))).unwrap();
        assert_eq!(system.dispatchers().len(), 2);
        assert_eq!(system.system().map(|d| d.name().to_string()), Some("main".into()));
        assert_eq!(
            system.dispatcher("io").map(|d| d.verbosity()),
            Some(Verbosity::TIMING)
        );
        assert_eq!(system.metrics().len(), 2);

        let registry = system.registry().clone();
        system.shutdown().unwrap();
        assert!(registry.is_empty());
        assert!(!registry.is_initialized());
    }

    #[test]
    fn test_unknown_system_dispatcher_rolls_back() {
        let err = create_registry(blueprint(Some("missing"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }

    #[test]
    fn test_invalid_spec_rolls_back() {
        let mut bp = blueprint(None);
        bp.dispatchers.push(DispatcherSpec::new("bad").with_queue_capacity(0));
        let err = DispatcherBuilder::new(bp).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }
}
