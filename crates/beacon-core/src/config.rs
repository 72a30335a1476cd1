//! Configuration management for the telemetry agent
//!
//! Configuration is layered from:
//! - Default values
//! - A configuration file (TOML, JSON, YAML by extension)
//! - Environment variables: `BEACON`, then the section path, all joined
//!   by `__` (e.g. `BEACON__AGENT__INTERVAL_MS=250`)

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the telemetry agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Agent identity and cycle settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Pub/sub channel settings
    #[serde(default)]
    pub channel: ChannelSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format
    #[serde(default)]
    pub json: bool,
}

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Agent identity. A random UUID is generated when absent.
    #[serde(default)]
    pub uuid: Option<String>,

    /// Human-readable agent name carried in the agent descriptor
    #[serde(default)]
    pub name: Option<String>,

    /// Delay between the end of one cycle and the start of the next
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Publish `agent/connected` and `agent/disconnected` announcements
    #[serde(default = "default_announce")]
    pub announce: bool,
}

/// Channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Transport endpoint URI
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_announce() -> bool {
    true
}

fn default_endpoint() -> String {
    "mqtt://localhost".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            uuid: None,
            name: None,
            interval_ms: default_interval_ms(),
            announce: default_announce(),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

impl AgentSettings {
    /// Cycle interval as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AgentConfig {
    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.agent.interval_ms == 0 {
            return Err(AgentError::invalid("agent.interval_ms", "must be greater than zero"));
        }
        if self.channel.endpoint.trim().is_empty() {
            return Err(AgentError::invalid("channel.endpoint", "must not be empty"));
        }
        if matches!(&self.agent.uuid, Some(uuid) if uuid.trim().is_empty()) {
            return Err(AgentError::invalid("agent.uuid", "must not be empty when set"));
        }
        Ok(())
    }
}

/// Load configuration from a file
///
/// Supports TOML, JSON, and YAML formats based on file extension.
/// Values are overridden by `BEACON__<SECTION>__<KEY>` environment variables.
///
/// # Example
///
/// ```no_run
/// use beacon_core::config::load_config;
///
/// let config = load_config("beacon.toml").unwrap();
/// println!("Interval: {}ms", config.agent.interval_ms);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AgentConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(AgentError::ConfigNotFound(path.to_path_buf()));
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix("BEACON")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: AgentConfig = settings.try_deserialize()?;
    config.validate()?;

    tracing::info!("Configuration loaded from {}", path.display());

    Ok(config)
}

/// Load configuration with defaults if the file is missing or invalid
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> AgentConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            AgentConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.agent.interval_ms, 5000);
        assert!(config.agent.uuid.is_none());
        assert!(config.agent.announce);
        assert_eq!(config.channel.endpoint, "mqtt://localhost");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "logging": { "level": "debug", "json": true },
            "agent": { "uuid": "agent-7", "name": "edge", "interval_ms": 250 },
            "channel": { "endpoint": "mqtt://10.0.0.7" }
        }"#;

        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.agent.uuid.as_deref(), Some("agent-7"));
        assert_eq!(config.agent.name.as_deref(), Some("edge"));
        assert_eq!(config.agent.interval(), Duration::from_millis(250));
        assert_eq!(config.channel.endpoint, "mqtt://10.0.0.7");
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: AgentConfig = serde_json::from_str(r#"{ "agent": {} }"#).unwrap();
        assert_eq!(config.agent.interval_ms, 5000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = AgentConfig::default();
        config.agent.interval_ms = 0;
        assert!(matches!(config.validate(), Err(AgentError::InvalidSetting { .. })));
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let mut config = AgentConfig::default();
        config.channel.endpoint = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[agent]\nuuid = \"from-file\"\ninterval_ms = 1000\n\n[channel]\nendpoint = \"memory://test\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.agent.uuid.as_deref(), Some("from-file"));
        assert_eq!(config.agent.interval_ms, 1000);
        assert_eq!(config.channel.endpoint, "memory://test");
    }

    #[test]
    fn test_load_file_with_invalid_interval() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[agent]\ninterval_ms = 0").unwrap();

        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config("nonexistent.toml");
        assert!(matches!(result, Err(AgentError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_or_default() {
        let config = load_config_or_default("nonexistent.toml");
        assert_eq!(config.agent.interval_ms, 5000);
    }
}
