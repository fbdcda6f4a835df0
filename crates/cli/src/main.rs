//! Relay CLI
//!
//! Main entry point for the relay: a message-queue RPC gateway answering
//! queries with a local model and retrieval-grounded fallback.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::ServeCommand;
use relay_core::config::{AppConfig, ConfigOverrides};
use relay_core::logging;
use std::path::PathBuf;

/// Relay - message-queue question answering with retrieval fallback
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Message-queue question answering with retrieval fallback", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Consume the inbound queue and reply to each query
    Serve(ServeCommand),
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            log_level: self.log_level.clone(),
            verbose: self.verbose,
            no_color: self.no_color,
            json_logs: self.json_logs,
            ..ConfigOverrides::default()
        };

        match &self.command {
            Commands::Serve(cmd) => cmd.apply_overrides(&mut overrides),
        }

        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Config file and environment, then CLI flags
    let config = AppConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.overrides());

    config.validate().context("Invalid configuration")?;

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.json_logs)?;

    tracing::info!("Relay starting");
    tracing::debug!("Config file: {:?}", config.config_file);
    tracing::debug!("Broker: {}", config.broker.redacted_uri());

    let command_name = match &cli.command {
        Commands::Serve(_) => "serve",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match &cli.command {
        Commands::Serve(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use relay_core::AckMode;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "relay",
            "--verbose",
            "serve",
            "--queue",
            "questions",
            "--workers",
            "2",
            "--ack-mode",
            "at-least-once",
            "--min-score",
            "0.3",
        ])
        .unwrap();

        assert!(cli.verbose);
        let overrides = cli.overrides();
        assert_eq!(overrides.queue.as_deref(), Some("questions"));
        assert_eq!(overrides.workers, Some(2));
        assert_eq!(overrides.ack_mode, Some(AckMode::AfterReply));
        assert_eq!(overrides.min_score, Some(0.3));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["relay", "serve", "--json-logs", "--log-level", "warn"]).unwrap();

        let overrides = cli.overrides();
        assert!(overrides.json_logs);
        assert_eq!(overrides.log_level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_rejects_unknown_ack_mode() {
        assert!(Cli::try_parse_from(["relay", "serve", "--ack-mode", "sometimes"]).is_err());
    }
}
