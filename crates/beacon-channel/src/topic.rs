//! Fixed topic names shared by every agent on the channel

/// Periodic metric envelopes
pub const AGENT_MESSAGE: &str = "agent/message";

/// Agent came online
pub const AGENT_CONNECTED: &str = "agent/connected";

/// Agent went offline
pub const AGENT_DISCONNECTED: &str = "agent/disconnected";

/// Every topic an agent subscribes to on connect
pub const AGENT_TOPICS: [&str; 3] = [AGENT_MESSAGE, AGENT_CONNECTED, AGENT_DISCONNECTED];

/// Whether `topic` is one of the shared agent topics
pub fn is_agent_topic(topic: &str) -> bool {
    AGENT_TOPICS.contains(&topic)
}
