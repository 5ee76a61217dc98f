//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// dispatchctl - Module dispatcher and work scheduler
#[derive(Parser, Debug)]
#[command(
    name = "dispatchctl",
    author,
    version,
    about = "Module dispatcher and work scheduler",
    long_about = "Brings up dispatcher instances from a configuration file.\n\n\
                  Each instance owns one worker thread and a bounded queue; modules \n\
                  register against an instance and post messages, delayed and \n\
                  periodic work to it."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DISPATCHCTL_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "DISPATCHCTL_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatchers described by a configuration file
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "dispatch.toml",
        env = "DISPATCHCTL_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the system dispatcher from configuration
    #[arg(long, env = "DISPATCHCTL_SYSTEM")]
    pub system: Option<String>,

    /// Run time in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "DISPATCHCTL_DURATION")]
    pub duration: u64,

    /// Heartbeat interval of the demo module registered on every dispatcher (ms)
    #[arg(long, default_value = "1000", env = "DISPATCHCTL_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Interval of the registry debug dump on the system dispatcher (seconds, 0 = disabled)
    #[arg(long, default_value = "0", env = "DISPATCHCTL_DEBUG_INTERVAL")]
    pub debug_interval: u64,

    /// Validate configuration and exit without starting dispatchers
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "DISPATCHCTL_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "dispatch.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "dispatch.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::parse_from([
            "dispatchctl",
            "run",
            "--config",
            "topology.toml",
            "--duration",
            "5",
            "--heartbeat-ms",
            "250",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("topology.toml"));
                assert_eq!(args.duration, 5);
                assert_eq!(args.heartbeat_ms, 250);
                assert_eq!(args.debug_interval, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
