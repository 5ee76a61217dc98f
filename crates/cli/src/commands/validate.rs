//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{DispatchBlueprint, Verbosity};

use crate::cli::ValidateArgs;

/// Post timeouts above this stall producers noticeably
const LONG_POST_TIMEOUT_MS: u64 = 1_000;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    dispatcher_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_dispatcher: Option<String>,
    total_queue_slots: usize,
    total_pending_slots: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    dispatcher_count: blueprint.dispatchers.len(),
                    system_dispatcher: blueprint.system_dispatcher.clone(),
                    total_queue_slots: blueprint.dispatchers.iter().map(|d| d.queue_capacity).sum(),
                    total_pending_slots: blueprint
                        .dispatchers
                        .iter()
                        .map(|d| d.pending_capacity)
                        .sum(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &DispatchBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.system_dispatcher.is_none() {
        warnings.push("No system dispatcher configured - system dispatch handles are unavailable".to_string());
    }

    for spec in &blueprint.dispatchers {
        if spec.initial_verbosity().contains(Verbosity::DEBUG) {
            warnings.push(format!(
                "Dispatcher '{}' starts with debug verbosity - every delivery is logged",
                spec.name
            ));
        }
        if spec.post_timeout_ms > LONG_POST_TIMEOUT_MS {
            warnings.push(format!(
                "Dispatcher '{}' post timeout is {} ms - blocking posts may stall producers",
                spec.name, spec.post_timeout_ms
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Dispatchers: {}", summary.dispatcher_count);
            println!(
                "  System dispatcher: {}",
                summary.system_dispatcher.as_deref().unwrap_or("(none)")
            );
            println!("  Queue slots: {}", summary.total_queue_slots);
            println!("  Pending slots: {}", summary.total_pending_slots);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
