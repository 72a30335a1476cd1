//! Events exposed to the embedding application

use beacon_channel::topic;
use serde_json::Value;

use crate::Envelope;

/// Event kinds, used for filtered subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentEventKind {
    Connected,
    Disconnected,
    Message,
    Reconnecting,
    PeerConnected,
    PeerDisconnected,
    PeerMessage,
}

impl AgentEventKind {
    /// Event name; peer kinds use their channel topic
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Message => "message",
            Self::Reconnecting => "reconnecting",
            Self::PeerConnected => topic::AGENT_CONNECTED,
            Self::PeerDisconnected => topic::AGENT_DISCONNECTED,
            Self::PeerMessage => topic::AGENT_MESSAGE,
        }
    }

    /// Peer kind for a channel topic
    pub fn for_peer_topic(topic: &str) -> Option<Self> {
        match topic {
            topic::AGENT_CONNECTED => Some(Self::PeerConnected),
            topic::AGENT_DISCONNECTED => Some(Self::PeerDisconnected),
            topic::AGENT_MESSAGE => Some(Self::PeerMessage),
            _ => None,
        }
    }

    pub fn is_peer(&self) -> bool {
        matches!(
            self,
            Self::PeerConnected | Self::PeerDisconnected | Self::PeerMessage
        )
    }
}

/// Events emitted by a [`TelemetryAgent`](crate::TelemetryAgent)
///
/// Unprefixed events describe this agent. `Peer*` events carry traffic
/// other agents published on the shared channel.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Transport connected; carries the local identity
    Connected { agent_id: String },

    /// Session torn down; carries the local identity
    Disconnected { agent_id: String },

    /// This agent published an envelope
    Message(Envelope),

    /// Transport is reconnecting
    Reconnecting,

    /// Another agent announced itself (`agent/connected`)
    PeerConnected(Value),

    /// Another agent went away (`agent/disconnected`)
    PeerDisconnected(Value),

    /// Another agent published an envelope (`agent/message`)
    PeerMessage(Value),
}

impl AgentEvent {
    /// Build the peer event for a channel topic
    pub fn peer(topic: &str, payload: Value) -> Option<Self> {
        match AgentEventKind::for_peer_topic(topic)? {
            AgentEventKind::PeerConnected => Some(Self::PeerConnected(payload)),
            AgentEventKind::PeerDisconnected => Some(Self::PeerDisconnected(payload)),
            AgentEventKind::PeerMessage => Some(Self::PeerMessage(payload)),
            _ => None,
        }
    }

    pub fn kind(&self) -> AgentEventKind {
        match self {
            Self::Connected { .. } => AgentEventKind::Connected,
            Self::Disconnected { .. } => AgentEventKind::Disconnected,
            Self::Message(_) => AgentEventKind::Message,
            Self::Reconnecting => AgentEventKind::Reconnecting,
            Self::PeerConnected(_) => AgentEventKind::PeerConnected,
            Self::PeerDisconnected(_) => AgentEventKind::PeerDisconnected,
            Self::PeerMessage(_) => AgentEventKind::PeerMessage,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Raw payload of a peer event
    pub fn peer_payload(&self) -> Option<&Value> {
        match self {
            Self::PeerConnected(payload)
            | Self::PeerDisconnected(payload)
            | Self::PeerMessage(payload) => Some(payload),
            _ => None,
        }
    }

    /// Peer envelope, when the payload has the envelope shape
    pub fn peer_envelope(&self) -> Option<Envelope> {
        match self {
            Self::PeerMessage(payload) => serde_json::from_value(payload.clone()).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_names() {
        let local = AgentEvent::Connected {
            agent_id: "a".to_string(),
        };
        assert_eq!(local.name(), "connected");
        assert_eq!(AgentEvent::Reconnecting.name(), "reconnecting");
        assert_eq!(AgentEvent::PeerMessage(json!({})).name(), "agent/message");
        assert_eq!(AgentEvent::PeerConnected(json!({})).name(), "agent/connected");
        assert_eq!(
            AgentEvent::PeerDisconnected(json!({})).name(),
            "agent/disconnected"
        );
    }

    #[test]
    fn test_peer_from_topic() {
        let event =
            AgentEvent::peer("agent/disconnected", json!({"agent": {"uuid": "p"}})).unwrap();
        assert_eq!(event.kind(), AgentEventKind::PeerDisconnected);
        assert!(event.kind().is_peer());
        assert_eq!(event.peer_payload().unwrap()["agent"]["uuid"], "p");

        assert!(AgentEvent::peer("agent/other", json!({})).is_none());
    }

    #[test]
    fn test_peer_envelope() {
        let event = AgentEvent::PeerMessage(json!({
            "agent": {"uuid": "p", "hostname": "h", "pid": 3},
            "metrics": [{"type": "cpu", "value": 9}],
            "timestamp": 10
        }));
        let envelope = event.peer_envelope().unwrap();
        assert_eq!(envelope.agent.pid, 3);
        assert_eq!(envelope.metric_names(), vec!["cpu"]);

        assert!(AgentEvent::PeerMessage(json!({"odd": true})).peer_envelope().is_none());
        assert!(AgentEvent::Reconnecting.peer_envelope().is_none());
    }
}
