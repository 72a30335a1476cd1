//! Self/peer classification of inbound channel traffic
//!
//! Every agent hears its own broadcasts on the shared topics. The filter
//! suppresses those, silently drops anything that does not parse, and
//! passes the rest through as peer traffic.

use beacon_channel::topic;
use serde_json::Value;

use crate::{Result, TelemetryError};

/// Why an inbound message produced no event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Published by this agent
    SelfOriginated,
    /// Not a JSON object
    Malformed,
    /// Not one of the shared agent topics
    UnknownTopic,
}

/// Filter verdict for one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Re-emit under the original topic
    Emit { topic: String, payload: Value },
    /// Drop without surfacing anything
    Suppress(SuppressReason),
}

/// Parse an inbound payload; only JSON objects count as messages
pub fn parse_payload(topic: &str, payload: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| TelemetryError::malformed(topic, e.to_string()))?;

    if !value.is_object() {
        return Err(TelemetryError::malformed(topic, "payload is not a JSON object"));
    }
    Ok(value)
}

/// Agent identity carried by a parsed payload, if any
pub fn payload_identity(payload: &Value) -> Option<&str> {
    payload.get("agent")?.get("uuid")?.as_str()
}

/// Classifies inbound messages against the local identity
#[derive(Debug, Clone)]
pub struct IdentityFilter {
    identity: String,
}

impl IdentityFilter {
    pub fn new<S: Into<String>>(identity: S) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn classify(&self, topic: &str, payload: &[u8]) -> Classification {
        if !topic::is_agent_topic(topic) {
            return Classification::Suppress(SuppressReason::UnknownTopic);
        }

        let parsed = match parse_payload(topic, payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping inbound message");
                return Classification::Suppress(SuppressReason::Malformed);
            }
        };

        if payload_identity(&parsed) == Some(self.identity.as_str()) {
            return Classification::Suppress(SuppressReason::SelfOriginated);
        }

        Classification::Emit {
            topic: topic.to_string(),
            payload: parsed,
        }
    }
}
