//! Error types for the channel adapter

use beacon_core::AgentError;

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors reported by a channel implementation
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Operation requires an established connection
    #[error("Channel is not connected")]
    NotConnected,

    /// Connecting to the endpoint failed (network, auth, bad URI)
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// A publish attempt was not accepted by the transport
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Any other transport-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Generic error from beacon-core
    #[error(transparent)]
    Core(#[from] AgentError),
}

impl ChannelError {
    /// Create a connection failure
    pub fn connection_failed<E: Into<String>, R: Into<String>>(endpoint: E, reason: R) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a publish failure
    pub fn publish_failed<T: Into<String>, R: Into<String>>(topic: T, reason: R) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_failed_display() {
        let err = ChannelError::publish_failed("agent/message", "broker offline");
        assert_eq!(err.to_string(), "Publish to agent/message failed: broker offline");
    }

    #[test]
    fn test_connection_failed_display() {
        let err = ChannelError::connection_failed("mqtt://nowhere", "refused");
        assert!(err.to_string().contains("mqtt://nowhere"));
    }
}
