//! Logging setup
//!
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directive (e.g. `info`, `beacon_agent=debug`)
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// Filter from `RUST_LOG`, falling back to `level`
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(section: &LoggingConfig) -> Self {
        Self {
            level: section.level.clone(),
            format: if section.json {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
        }
    }
}

/// Install the global subscriber
///
/// Returns false when a subscriber was already installed; the first one
/// stays in place.
///
/// # Example
///
/// ```
/// use beacon_core::logging::{init_logging, LogConfig, LogFormat};
///
/// init_logging(LogConfig {
///     level: "beacon_agent=debug".to_string(),
///     format: LogFormat::Json,
/// });
/// ```
pub fn init_logging(config: LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.filter());

    let installed = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
    .is_ok();

    if installed {
        tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_flag_selects_format() {
        let mut section = LoggingConfig::default();
        assert_eq!(LogConfig::from(&section).format, LogFormat::Pretty);

        section.json = true;
        section.level = "trace".to_string();
        let config = LogConfig::from(&section);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "trace");
    }

    #[test]
    fn test_second_init_is_rejected() {
        init_logging(LogConfig::default());
        assert!(!init_logging(LogConfig::default()));
    }
}
