//! Setup errors

use std::path::PathBuf;

/// Result type alias for configuration and setup operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Failures that stop an agent from being configured
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A setting is present but unusable
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// File or environment source could not be read or deserialized
    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    pub fn invalid<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for errors the operator fixes by editing configuration
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidSetting { .. } | Self::ConfigNotFound(_) | Self::ConfigSource(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_setting_names_key() {
        let err = AgentError::invalid("agent.interval_ms", "must be greater than zero");
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "Invalid setting 'agent.interval_ms': must be greater than zero"
        );
    }

    #[test]
    fn test_not_found_shows_path() {
        let err = AgentError::ConfigNotFound(PathBuf::from("/etc/beacon.toml"));
        assert!(err.is_config());
        assert!(err.to_string().ends_with("/etc/beacon.toml"));
    }

    #[test]
    fn test_io_is_not_config() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = AgentError::from(io_err);
        assert!(matches!(err, AgentError::Io(_)));
        assert!(!err.is_config());
    }
}
