//! Integration tests for configuration, logging and errors working together

use beacon_core::{
    config::{load_config, load_config_or_default, AgentConfig},
    error::{AgentError, Result},
    logging::{init_logging, LogConfig},
};
use std::io::Write;

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config = load_config_or_default("does-not-exist.toml");
    assert_eq!(config.agent.interval_ms, 5000);
    assert_eq!(config.channel.endpoint, "mqtt://localhost");
}

#[test]
fn test_json_config_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{ "agent": {{ "name": "rack-12", "announce": false }}, "logging": {{ "level": "warn" }} }}"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.agent.name.as_deref(), Some("rack-12"));
    assert!(!config.agent.announce);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.agent.interval_ms, 5000);

    init_logging(LogConfig::from(&config.logging));
}

#[test]
fn test_config_serialization_keeps_identity() {
    let mut config = AgentConfig::default();
    config.agent.uuid = Some("fixed-id".to_string());

    let json = serde_json::to_string(&config).expect("Failed to serialize");
    let deserialized: AgentConfig = serde_json::from_str(&json).expect("Failed to deserialize");

    assert_eq!(deserialized.agent.uuid.as_deref(), Some("fixed-id"));
}

#[test]
fn test_validation_error_propagates() {
    fn check(config: &AgentConfig) -> Result<()> {
        config.validate()?;
        Ok(())
    }

    let mut config = AgentConfig::default();
    config.agent.interval_ms = 0;

    let err = check(&config).unwrap_err();
    assert!(matches!(
        err,
        AgentError::InvalidSetting { ref key, .. } if key == "agent.interval_ms"
    ));
    assert!(err.to_string().contains("interval_ms"));
}
