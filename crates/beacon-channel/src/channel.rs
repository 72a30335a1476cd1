//! Channel adapter trait
//!
//! The agent only depends on this contract. Implementations own the
//! actual transport: connection handling, delivery guarantees and any
//! reconnection backoff.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// Lifecycle and delivery notifications produced by a connected channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The transport has (re)established a full connection
    Connected,

    /// A message arrived on a subscribed topic
    Message { topic: String, payload: Vec<u8> },

    /// Connection-level failure; the session should be torn down
    Error(String),

    /// The transport is attempting to reconnect
    Reconnecting,
}

/// Stream of [`ChannelEvent`]s for one connection. Closes when the
/// channel is disconnected.
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// Pub/sub transport used by the agent
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Connect to `endpoint` and return the event stream for this session
    async fn connect(&self, endpoint: &str) -> Result<ChannelEvents>;

    /// Subscribe to a topic; deliveries show up as [`ChannelEvent::Message`]
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Publish a payload on a topic (best-effort)
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Release the transport. The event stream closes afterwards.
    async fn disconnect(&self) -> Result<()>;

    /// Get channel implementation name
    fn name(&self) -> &str;
}
