//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::DispatchBlueprint;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::session::{Session, SessionConfig};

/// Execute the `run` command
pub async fn run_dispatch(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref system) = args.system {
        if blueprint.dispatcher(system).is_none() {
            return Err(CliError::unknown_dispatcher(system.clone()).into());
        }
        info!(system = %system, "Overriding system dispatcher from CLI");
        blueprint.system_dispatcher = Some(system.clone());
    }

    info!(
        dispatchers = blueprint.dispatchers.len(),
        system = ?blueprint.system_dispatcher,
        max_dispatchers = blueprint.limits.max_dispatchers,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let session_config = SessionConfig {
        blueprint,
        duration: (args.duration != 0).then(|| Duration::from_secs(args.duration)),
        heartbeat: Duration::from_millis(args.heartbeat_ms.max(1)),
        debug_interval: (args.debug_interval != 0)
            .then(|| Duration::from_secs(args.debug_interval)),
    };

    info!("Starting dispatchers...");
    let stats = Session::new(session_config)
        .run(shutdown_signal())
        .await
        .context("Dispatch session failed")?;

    info!(
        executed = stats.total_executed(),
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.2}", stats.throughput()),
        "Session completed successfully"
    );
    stats.print_summary();

    info!("dispatchctl finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, stopping dispatchers...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &DispatchBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Registry:");
    println!("  Max dispatchers: {}", blueprint.limits.max_dispatchers);
    match &blueprint.system_dispatcher {
        Some(system) => println!("  System dispatcher: {}", system),
        None => println!("  System dispatcher: (none)"),
    }

    println!("\nDispatchers ({}):", blueprint.dispatchers.len());
    for spec in &blueprint.dispatchers {
        println!(
            "  - {} - queue {}, pending {}, modules {}, stack {} KiB, timeout {} ms, verbosity {}",
            spec.name,
            spec.queue_capacity,
            spec.pending_capacity,
            spec.max_modules,
            spec.stack_size / 1024,
            spec.post_timeout_ms,
            spec.initial_verbosity()
        );
    }

    println!();
}
