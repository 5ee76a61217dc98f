//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::DispatchBlueprint;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    max_dispatchers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_dispatcher: Option<String>,
    dispatchers: Vec<DispatcherInfo>,
}

#[derive(Serialize)]
struct DispatcherInfo {
    name: String,
    is_system: bool,
    queue_capacity: usize,
    pending_capacity: usize,
    max_modules: usize,
    stack_size: usize,
    thread_priority: u8,
    post_timeout_ms: u64,
    max_payload_len: usize,
    verbosity: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn build_config_info(blueprint: &DispatchBlueprint) -> ConfigInfo {
    let dispatchers = blueprint
        .dispatchers
        .iter()
        .map(|spec| DispatcherInfo {
            name: spec.name.clone(),
            is_system: blueprint.system_dispatcher.as_deref() == Some(spec.name.as_str()),
            queue_capacity: spec.queue_capacity,
            pending_capacity: spec.pending_capacity,
            max_modules: spec.max_modules,
            stack_size: spec.stack_size,
            thread_priority: spec.thread_priority,
            post_timeout_ms: spec.post_timeout_ms,
            max_payload_len: spec.max_payload_len,
            verbosity: spec.initial_verbosity().to_string(),
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        max_dispatchers: blueprint.limits.max_dispatchers,
        system_dispatcher: blueprint.system_dispatcher.clone(),
        dispatchers,
    }
}

fn print_config_info(blueprint: &DispatchBlueprint) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                Dispatcher Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Registry");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Max dispatchers: {}", blueprint.limits.max_dispatchers);
    match &blueprint.system_dispatcher {
        Some(system) => println!("   └─ System dispatcher: {}", system),
        None => println!("   └─ System dispatcher: (none)"),
    }

    println!("\n🧵 Dispatchers ({})", blueprint.dispatchers.len());
    for (i, spec) in blueprint.dispatchers.iter().enumerate() {
        let is_last = i == blueprint.dispatchers.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {}", prefix, spec.name);
        println!(
            "   {}  ├─ Queue: {} ready / {} pending",
            child_prefix, spec.queue_capacity, spec.pending_capacity
        );
        println!("   {}  ├─ Modules: up to {}", child_prefix, spec.max_modules);
        println!(
            "   {}  ├─ Thread: {} KiB stack, priority {}",
            child_prefix,
            spec.stack_size / 1024,
            spec.thread_priority
        );
        println!(
            "   {}  ├─ Post timeout: {} ms, max payload {} bytes",
            child_prefix, spec.post_timeout_ms, spec.max_payload_len
        );
        println!(
            "   {}  └─ Verbosity: {}",
            child_prefix,
            spec.initial_verbosity()
        );
    }

    println!();
}
