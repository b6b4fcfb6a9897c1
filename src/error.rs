/*!
 * Error types for the sentinel process
 */

use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, SentinelError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Startup failures. Once the supervisor is running nothing is fatal.
#[derive(Error, Debug)]
pub enum SentinelError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be set up
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Supervisor could not be built from otherwise valid settings
    #[error("Startup failed: {0}")]
    Startup(String),
}

impl SentinelError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SentinelError::Config(_) => EXIT_CONFIG,
            SentinelError::Logging(_) | SentinelError::Startup(_) => EXIT_FATAL,
        }
    }

    /// Get a short category name for log output
    pub fn category(&self) -> &'static str {
        match self {
            SentinelError::Config(_) => "config",
            SentinelError::Logging(_) => "logging",
            SentinelError::Startup(_) => "startup",
        }
    }
}
