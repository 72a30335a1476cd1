//! Endpoint URIs and channel selection
//!
//! `mqtt://host[:port]` (or `tcp://`) opens an [`MqttChannel`];
//! `memory://name` opens an [`InProcessChannel`] on a private broker.

use std::sync::Arc;

use crate::{ChannelError, InProcessBroker, InProcessChannel, MessageChannel, MqttChannel, Result};

/// Port used when an MQTT endpoint does not name one
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Parsed channel endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Mqtt { host: String, port: u16 },
    Memory { name: String },
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> Result<Self> {
        let invalid = |reason: String| ChannelError::connection_failed(endpoint, reason);

        let (scheme, rest) = endpoint
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme".to_string()))?;

        match scheme {
            "mqtt" | "tcp" => {
                let authority = rest.split('/').next().unwrap_or(rest);
                let (host, port) = match authority.rsplit_once(':') {
                    Some((host, port)) => {
                        let port = port
                            .parse::<u16>()
                            .map_err(|_| invalid(format!("invalid port '{}'", port)))?;
                        (host, port)
                    }
                    None => (authority, DEFAULT_MQTT_PORT),
                };
                if host.is_empty() {
                    return Err(invalid("missing host".to_string()));
                }
                Ok(Self::Mqtt {
                    host: host.to_string(),
                    port,
                })
            }
            "memory" => Ok(Self::Memory {
                name: rest.to_string(),
            }),
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Mqtt { .. } => "mqtt",
            Self::Memory { .. } => "memory",
        }
    }
}

/// Channel implementation for an endpoint URI
///
/// `client_id` identifies the session to an MQTT broker and is unused for
/// in-memory endpoints.
pub fn channel_for(endpoint: &str, client_id: &str) -> Result<Arc<dyn MessageChannel>> {
    let channel: Arc<dyn MessageChannel> = match Endpoint::parse(endpoint)? {
        Endpoint::Mqtt { .. } => Arc::new(MqttChannel::new(client_id)),
        Endpoint::Memory { .. } => Arc::new(InProcessChannel::new(InProcessBroker::new())),
    };
    tracing::debug!(endpoint, channel = channel.name(), "Channel selected");
    Ok(channel)
}
