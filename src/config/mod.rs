//! Configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`, `EVENTSHUTTLE_CONFIG_PATH`, or
//!    `<config_dir>/eventshuttle/config.toml`)
//! 3. `EVENTSHUTTLE_*` environment variables
//! 4. Command-line flags (applied by the binary)
//!
//! # Example File
//!
//! ```toml
//! address = "http://localhost:2113"
//! page_size = 50
//! prefetch = true
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//! timeout_secs = 30
//!
//! [logging]
//! format = "json"
//! file = "/var/log/eventshuttle.log"
//!
//! [projection]
//! refresh = true
//! poll_interval_ms = 250
//! max_polls = 120
//! ```

use crate::client::{ClientSettings, ProjectionSettings, RetryPolicy};
use crate::observability::LogFormat;
use crate::services::DEFAULT_PAGE_SIZE;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "EVENTSHUTTLE_CONFIG_PATH";

/// Main configuration for eventshuttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuttleConfig {
    /// Base URL of the event log service.
    pub address: String,
    /// Records requested per read.
    pub page_size: usize,
    /// Whether exports read the next page while writing the current one.
    pub prefetch: bool,
    /// Retry and timeout settings.
    pub retry: RetrySettings,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// `$streams` projection settings for stream listing.
    pub projection: ProjectionConfig,
}

/// Retry and timeout settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts per request.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Cap for any single delay.
    pub max_delay_ms: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            timeout_secs: 30,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// `$streams` projection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionConfig {
    /// Run the projection before listing streams.
    pub refresh: bool,
    /// Delay between progress polls.
    pub poll_interval_ms: u64,
    /// Maximum progress polls.
    pub max_polls: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            refresh: true,
            poll_interval_ms: 250,
            max_polls: 120,
        }
    }
}

impl Default for ShuttleConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:2113".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            prefetch: false,
            retry: RetrySettings::default(),
            logging: LoggingSettings::default(),
            projection: ProjectionConfig::default(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Service address.
    pub address: Option<String>,
    /// Page size.
    pub page_size: Option<usize>,
    /// Export prefetch.
    pub prefetch: Option<bool>,
    /// Retry section.
    pub retry: Option<ConfigFileRetry>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Projection section.
    pub projection: Option<ConfigFileProjection>,
}

/// `[retry]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileRetry {
    /// Total attempts per request.
    pub max_attempts: Option<u32>,
    /// Base delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Delay cap in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// `[logging]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// `[projection]` section.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileProjection {
    /// Run the projection before listing.
    pub refresh: Option<bool>,
    /// Poll interval in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Maximum polls.
    pub max_polls: Option<u32>,
}

impl ShuttleConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::operation("read_config_file", format!("{}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| Error::operation("parse_config_file", format!("{}: {e}", path.display())))
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config", e))?;
        Self::from_config_file(file)
    }

    /// Platform config file location (`<config_dir>/eventshuttle/config.toml`).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("eventshuttle").join("config.toml"))
    }

    /// Loads configuration and applies environment overrides.
    ///
    /// An explicit path (argument or `EVENTSHUTTLE_CONFIG_PATH`) must exist;
    /// the default location is used only if present.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or present file cannot be loaded.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from_file(&path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };
        Ok(config.with_env_overrides())
    }

    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(address) = file.address {
            config.address = address;
        }
        if let Some(page_size) = file.page_size {
            config.page_size = page_size.max(1);
        }
        if let Some(prefetch) = file.prefetch {
            config.prefetch = prefetch;
        }
        if let Some(retry) = file.retry {
            if let Some(v) = retry.max_attempts {
                config.retry.max_attempts = v.max(1);
            }
            if let Some(v) = retry.base_delay_ms {
                config.retry.base_delay_ms = v;
            }
            if let Some(v) = retry.max_delay_ms {
                config.retry.max_delay_ms = v;
            }
            if let Some(v) = retry.timeout_secs {
                config.retry.timeout_secs = v.max(1);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format).ok_or_else(|| {
                    Error::InvalidInput(format!("unknown log format '{format}'"))
                })?;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }
        if let Some(projection) = file.projection {
            if let Some(v) = projection.refresh {
                config.projection.refresh = v;
            }
            if let Some(v) = projection.poll_interval_ms {
                config.projection.poll_interval_ms = v;
            }
            if let Some(v) = projection.max_polls {
                config.projection.max_polls = v;
            }
        }

        Ok(config)
    }

    /// Applies `EVENTSHUTTLE_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`; unparsable values are ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EVENTSHUTTLE_ADDRESS").filter(|v| !v.trim().is_empty()) {
            self.address = v;
        }
        if let Some(v) = lookup("EVENTSHUTTLE_PAGE_SIZE").and_then(|v| v.parse::<usize>().ok()) {
            self.page_size = v.max(1);
        }
        if let Some(v) = lookup("EVENTSHUTTLE_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
            self.retry.max_attempts = v.max(1);
        }
        if let Some(v) = lookup("EVENTSHUTTLE_BASE_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.retry.base_delay_ms = v;
        }
        if let Some(v) = lookup("EVENTSHUTTLE_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            self.retry.timeout_secs = v.max(1);
        }
        if let Some(v) = lookup("EVENTSHUTTLE_PREFETCH").and_then(|v| parse_bool(&v)) {
            self.prefetch = v;
        }
        if let Some(v) = lookup("EVENTSHUTTLE_LOG_FORMAT").and_then(|v| LogFormat::parse(&v)) {
            self.logging.format = v;
        }
        self
    }

    /// Retry policy for the event log client.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    /// Connection settings for the HTTP event log client.
    #[must_use]
    pub const fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            retry: self.retry_policy(),
            timeout: Duration::from_secs(self.retry.timeout_secs),
            projection: ProjectionSettings {
                refresh: self.projection.refresh,
                poll_interval: Duration::from_millis(self.projection.poll_interval_ms),
                max_polls: self.projection.max_polls,
            },
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
