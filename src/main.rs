/*!
 * Kuma Sentinel CLI
 *
 * Reads configuration from the environment, then supervises the Kuma
 * connection until Ctrl-C or SIGTERM.
 */

use anyhow::Context;
use clap::Parser;
use kuma_sentinel::{
    build_sentinel,
    config::{LogLevel, SentinelConfig},
    error::{Result, EXIT_SUCCESS},
    logging::{self, LogOptions},
    VERSION,
};
use sentinel_core::ReconnectPolicy;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "kuma-sentinel")]
#[command(version, about = "Pause dependent Uptime Kuma monitors while a sentinel monitor is down", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, value_enum, env = "LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Verbose output (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Write JSON log lines to this file instead of stdout
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Validate configuration, print the summary and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(&LogOptions {
        log_level: cli.log_level,
        verbose: cli.verbose,
        log_file: cli.log_file.clone(),
    })?;

    info!("🚀 Kuma Sentinel v{}", VERSION);

    let config = SentinelConfig::from_env().inspect_err(|e| error!("Configuration error: {}", e))?;
    config.log_summary();

    if cli.check_config {
        info!("✓ Configuration OK");
        return Ok(());
    }

    let sentinel = build_sentinel(&config, ReconnectPolicy::default())?;
    let state = sentinel.run_until(shutdown_signal()).await;

    if state.suppressed {
        warn!(
            "Exiting while suppressed: {} monitors remain paused until resumed",
            state.target_ids.len()
        );
    }
    info!("Goodbye");
    Ok(())
}

/// Resolves on the first Ctrl-C or SIGTERM
async fn shutdown_signal() {
    match wait_for_signal().await {
        Ok(name) => info!("Received {}, shutting down", name),
        Err(e) => {
            error!("{:#}; running until killed", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            Ok("Ctrl-C")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    Ok("Ctrl-C")
}
