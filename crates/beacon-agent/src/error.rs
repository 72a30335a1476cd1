//! Error types for the telemetry agent

use beacon_channel::ChannelError;
use beacon_core::AgentError;

use crate::producer::ProducerError;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors surfaced by the telemetry agent
///
/// Only `Configuration` and `Transport` ever reach the embedder through a
/// returned `Result`. The other kinds are recovered inside a cycle or the
/// inbound path and only show up in logs and cycle reports.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Invalid registration or agent settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single producer rejected or errored
    #[error("Metric '{metric}' failed: {source}")]
    ProducerFailure {
        metric: String,
        #[source]
        source: ProducerError,
    },

    /// Inbound payload could not be parsed
    #[error("Malformed message on {topic}: {reason}")]
    MalformedMessage { topic: String, reason: String },

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] ChannelError),

    /// Publishing an envelope failed
    #[error("Publish failed: {0}")]
    PublishFailure(#[source] ChannelError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error from beacon-core
    #[error(transparent)]
    Core(#[from] AgentError),
}

impl TelemetryError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a producer failure for `metric`
    pub fn producer<S: Into<String>>(metric: S, source: ProducerError) -> Self {
        Self::ProducerFailure {
            metric: metric.into(),
            source,
        }
    }

    /// Create a malformed message error
    pub fn malformed<T: Into<String>, R: Into<String>>(topic: T, reason: R) -> Self {
        Self::MalformedMessage {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}
