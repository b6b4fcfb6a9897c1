/*!
 * Configuration for the sentinel process
 *
 * Everything comes from environment variables. The lookup is injectable so
 * tests can feed a plain map instead of mutating the process environment.
 */

use std::fmt;

use kuma_connect::Credentials;
use secrecy::{ExposeSecret, SecretString};
use sentinel_core::TargetSelector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

pub const DEFAULT_KUMA_URL: &str = "http://localhost:3001";
pub const DEFAULT_KUMA_USER: &str = "admin";
pub const DEFAULT_KUMA_PASS: &str = "changeme";
pub const DEFAULT_SENTINEL_NAME: &str = "INTERNET-SENTINEL";
pub const DEFAULT_GROUP_TO_PAUSE: &str = "Sentinel";
pub const DEFAULT_INTERVAL_MS: u64 = 5000;

/// Configuration validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid KUMA_URL format: {0}")]
    InvalidUrl(String),

    #[error("INTERVAL_MS must be a positive integer, got {0:?}")]
    InvalidInterval(String),

    #[error("GROUP_TO_PAUSE and TAG_TO_SUPPRESS are both set; choose one")]
    ConflictingTargets,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Validated runtime configuration
pub struct SentinelConfig {
    /// Base URL of the Kuma server
    pub kuma_url: Url,

    pub username: String,

    pub password: SecretString,

    /// Display name of the monitor whose status drives suppression
    pub sentinel_name: String,

    /// How the dependent monitors are chosen
    pub selector: TargetSelector,

    /// Kept for compatibility; status changes arrive over the socket
    pub interval_ms: u64,
}

impl SentinelConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    ///
    /// Unset variables take their default; variables set to an empty string
    /// are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str, default: &str| -> Result<String, ConfigError> {
            match lookup(key) {
                Some(value) if value.trim().is_empty() => Err(ConfigError::Missing(key)),
                Some(value) => Ok(value),
                None => Ok(default.to_string()),
            }
        };
        let get_optional = |key: &'static str| -> Result<Option<String>, ConfigError> {
            match lookup(key) {
                Some(value) if value.trim().is_empty() => Err(ConfigError::Missing(key)),
                other => Ok(other),
            }
        };

        let kuma_url = parse_url(&get("KUMA_URL", DEFAULT_KUMA_URL)?)?;
        let username = get("KUMA_USER", DEFAULT_KUMA_USER)?;
        let password = SecretString::from(get("KUMA_PASS", DEFAULT_KUMA_PASS)?);
        let sentinel_name = get("SENTINEL_NAME", DEFAULT_SENTINEL_NAME)?;

        let selector = match (get_optional("GROUP_TO_PAUSE")?, get_optional("TAG_TO_SUPPRESS")?) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingTargets),
            (None, Some(tag)) => TargetSelector::Tag(tag),
            (Some(group), None) => TargetSelector::Group(group),
            (None, None) => TargetSelector::Group(DEFAULT_GROUP_TO_PAUSE.to_string()),
        };

        let interval_raw = get("INTERVAL_MS", &DEFAULT_INTERVAL_MS.to_string())?;
        let interval_ms = match interval_raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => ms,
            _ => return Err(ConfigError::InvalidInterval(interval_raw)),
        };

        Ok(Self {
            kuma_url,
            username,
            password,
            sentinel_name,
            selector,
            interval_ms,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.expose_secret())
    }

    /// Password replaced by one `*` per character
    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.expose_secret().chars().count())
    }

    /// Human-readable lines describing the effective configuration
    pub fn summary_lines(&self) -> Vec<String> {
        let targets = match &self.selector {
            TargetSelector::Group(name) => format!("Group to Pause: {}", name),
            TargetSelector::Tag(name) => format!("Tag to Suppress: {}", name),
        };
        vec![
            format!("Kuma URL: {}", self.kuma_url),
            format!("Username: {}", self.username),
            format!("Password: {}", self.masked_password()),
            format!("Sentinel Monitor: {}", self.sentinel_name),
            targets,
            format!(
                "Check Interval: {}ms (currently unused - real-time via WebSocket)",
                self.interval_ms
            ),
        ]
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        for line in self.summary_lines() {
            info!("  {}", line);
        }
    }
}

impl fmt::Debug for SentinelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelConfig")
            .field("kuma_url", &self.kuma_url.as_str())
            .field("username", &self.username)
            .field("password", &self.masked_password())
            .field("sentinel_name", &self.sentinel_name)
            .field("selector", &self.selector)
            .field("interval_ms", &self.interval_ms)
            .finish()
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl(format!("{} ({})", raw, e)))?;

    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => {
            return Err(ConfigError::InvalidUrl(format!(
                "{} (unsupported scheme '{}')",
                raw, other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!("{} (missing host)", raw)));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<SentinelConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SentinelConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.kuma_url.as_str(), "http://localhost:3001/");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password.expose_secret(), "changeme");
        assert_eq!(config.sentinel_name, "INTERNET-SENTINEL");
        assert_eq!(config.selector, TargetSelector::Group("Sentinel".to_string()));
        assert_eq!(config.interval_ms, 5000);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("KUMA_URL", "https://kuma.example.net/status"),
            ("KUMA_USER", "ops"),
            ("KUMA_PASS", "s3cret"),
            ("SENTINEL_NAME", "WAN"),
            ("GROUP_TO_PAUSE", "Cloud"),
            ("INTERVAL_MS", "10000"),
        ])
        .unwrap();

        assert_eq!(config.kuma_url.scheme(), "https");
        assert_eq!(config.username, "ops");
        assert_eq!(config.sentinel_name, "WAN");
        assert_eq!(config.selector, TargetSelector::Group("Cloud".to_string()));
        assert_eq!(config.interval_ms, 10000);
    }

    #[test]
    fn test_tag_selector() {
        let config = load(&[("TAG_TO_SUPPRESS", "internet-dependent")]).unwrap();
        assert_eq!(
            config.selector,
            TargetSelector::Tag("internet-dependent".to_string())
        );
    }

    #[test]
    fn test_conflicting_targets() {
        let err = load(&[("GROUP_TO_PAUSE", "Sentinel"), ("TAG_TO_SUPPRESS", "wan")])
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::ConflictingTargets);
    }

    #[test]
    fn test_empty_values_are_required() {
        for key in ["KUMA_URL", "KUMA_USER", "KUMA_PASS", "SENTINEL_NAME", "GROUP_TO_PAUSE"] {
            let err = load(&[(key, "")]).err().unwrap();
            assert_eq!(err, ConfigError::Missing(key));
            assert_eq!(err.to_string(), format!("{} is required", key));
        }
    }

    #[test]
    fn test_invalid_url() {
        let err = load(&[("KUMA_URL", "not a url")]).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
        assert!(err.to_string().starts_with("Invalid KUMA_URL format: not a url"));

        let err = load(&[("KUMA_URL", "ftp://kuma.local")]).err().unwrap();
        assert!(err.to_string().contains("unsupported scheme 'ftp'"));
    }

    #[test]
    fn test_websocket_schemes_accepted() {
        assert!(load(&[("KUMA_URL", "ws://10.0.0.5:3001")]).is_ok());
        assert!(load(&[("KUMA_URL", "wss://kuma.example.net")]).is_ok());
    }

    #[test]
    fn test_invalid_interval() {
        for raw in ["0", "-5", "soon"] {
            let err = load(&[("INTERVAL_MS", raw)]).err().unwrap();
            assert_eq!(err, ConfigError::InvalidInterval(raw.to_string()));
        }
    }

    #[test]
    fn test_password_masked() {
        let config = load(&[("KUMA_PASS", "hunter2")]).unwrap();

        assert_eq!(config.masked_password(), "*******");
        let summary = config.summary_lines().join("\n");
        assert!(summary.contains("Password: *******"));
        assert!(!summary.contains("hunter2"));
        assert!(summary.contains("currently unused - real-time via WebSocket"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_credentials() {
        let config = load(&[("KUMA_USER", "ops"), ("KUMA_PASS", "pw")]).unwrap();
        let credentials = config.credentials();

        assert_eq!(credentials.username, "ops");
        assert_eq!(credentials.password.expose_secret(), "pw");
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
