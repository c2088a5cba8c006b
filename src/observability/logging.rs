//! Structured logging settings.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "EVENTSHUTTLE_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
    /// Lowers the default level to `debug`.
    pub verbose: bool,
}

impl LoggingConfig {
    /// Builds the event filter from `EVENTSHUTTLE_LOG`, then `RUST_LOG`,
    /// then the default level.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        let from_env = std::env::var(LOG_ENV)
            .ok()
            .or_else(|| std::env::var("RUST_LOG").ok());
        self.filter_from(from_env.as_deref())
    }

    fn filter_from(&self, directives: Option<&str>) -> EnvFilter {
        directives
            .filter(|d| !d.trim().is_empty())
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(self.default_directive()))
    }

    const fn default_directive(&self) -> &'static str {
        if self.verbose {
            "eventshuttle=debug,warn"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" pretty "), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_default_directive() {
        let quiet = LoggingConfig::default();
        assert_eq!(quiet.filter_from(None).to_string(), "warn");

        let verbose = LoggingConfig {
            verbose: true,
            ..LoggingConfig::default()
        };
        assert!(verbose.filter_from(Some("  ")).to_string().contains("eventshuttle=debug"));
    }

    #[test]
    fn test_explicit_directive_wins() {
        let config = LoggingConfig::default();
        assert!(config.filter_from(Some("eventshuttle=trace")).to_string().contains("trace"));
    }
}
