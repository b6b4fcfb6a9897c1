/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogLevel;
use crate::error::{Result, SentinelError};

/// Crates whose events pass the default filter
const LOG_TARGETS: [&str; 3] = ["kuma_sentinel", "kuma_connect", "sentinel_core"];

/// Logging options taken from the command line
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub log_level: LogLevel,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

impl LogOptions {
    /// Effective level; `verbose` forces at least DEBUG
    pub fn effective_level(&self) -> Level {
        let level = self.log_level.to_tracing_level();
        if self.verbose && level < Level::DEBUG {
            Level::DEBUG
        } else {
            level
        }
    }
}

/// Filter directive for our crates at the given level
fn default_directives(level: Level) -> String {
    let level = level.to_string().to_lowercase();
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize structured logging
///
/// `RUST_LOG`, when set, takes precedence over the CLI level.
pub fn init_logging(options: &LogOptions) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(options.effective_level())))
        .map_err(|e| SentinelError::Logging(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = options.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stdout_logging(env_filter);
    }

    Ok(())
}

/// Initialize logging to stdout
fn init_stdout_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize logging to a file, one JSON object per line
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| SentinelError::Logging(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
