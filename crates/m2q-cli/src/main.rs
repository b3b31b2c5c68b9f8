//! M2Q CLI - MongoDB change stream export tool.

use anyhow::Result;
use clap::{Parser, Subcommand};
use m2q_core::config::LogFormat;
use m2q_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Malformed or unencodable event
    EventError = 2,
    /// Sink provisioning error
    ProvisioningError = 3,
    /// Sink delivery error
    DeliveryError = 4,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Convert an error to an exit code by inspecting the error message.
    fn from_error(error: &anyhow::Error) -> Self {
        // Alternate formatting includes the cause chain, not just the
        // outermost context.
        let error_str = format!("{:#}", error).to_lowercase();

        if error_str.contains("config") || error_str.contains("toml") || error_str.contains("parse")
        {
            ExitCode::ConfigError
        } else if error_str.contains("malformed") || error_str.contains("encoding") {
            ExitCode::EventError
        } else if error_str.contains("provision") {
            ExitCode::ProvisioningError
        } else if error_str.contains("deliver")
            || error_str.contains("put record")
            || error_str.contains("publish")
        {
            ExitCode::DeliveryError
        } else {
            ExitCode::RuntimeError
        }
    }
}

#[derive(Parser)]
#[command(name = "m2q")]
#[command(about = "MongoDB change stream to message queue export CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Export raw change events read as JSON Lines
    Export {
        /// Input file with one raw change event per line (stdin when absent)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Provision sink resources ahead of first traffic
    Provision,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Try to load config for log format settings (optional - falls back to JSON)
    let log_format = cli
        .config
        .as_ref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.monitoring.log_format)
        .unwrap_or(LogFormat::Json);

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    let result = execute_command(cli).await;

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Export { input } => {
            let config = load_config(&cli.config)?;
            commands::export::run(config, input).await?;
        }

        Commands::Provision => {
            let config = load_config(&cli.config)?;
            commands::provision::run(config).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let path = path.clone().unwrap_or_else(|| PathBuf::from("config.toml"));

    let content = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let err = anyhow::anyhow!("Configuration error: missing stream name");
        assert!(matches!(ExitCode::from_error(&err), ExitCode::ConfigError));

        let err = anyhow::anyhow!("Export failed at deliver stage: Failed to publish message");
        assert!(matches!(ExitCode::from_error(&err), ExitCode::DeliveryError));

        let err = anyhow::anyhow!("Malformed event: Required field missing: _id");
        assert!(matches!(ExitCode::from_error(&err), ExitCode::EventError));

        let err = anyhow::anyhow!("something unexpected");
        assert!(matches!(ExitCode::from_error(&err), ExitCode::RuntimeError));
    }
}
