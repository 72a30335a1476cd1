//! Beacon Core
//!
//! Ambient plumbing shared by the beacon telemetry agent crates:
//! configuration loading, the setup error type and logging initialization.

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{load_config, load_config_or_default, AgentConfig};
pub use error::{AgentError, Result};
pub use logging::{init_logging, LogConfig, LogFormat};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let config = AgentConfig::default();
        assert_eq!(config.agent.interval_ms, 5000);
        assert_eq!(LogConfig::from(&config.logging).level, "info");
    }
}
