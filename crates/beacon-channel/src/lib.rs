//! Beacon Channel
//!
//! The pub/sub contract the telemetry agent publishes and listens on, an
//! MQTT implementation and an in-process one for tests and local runs.
//!
//! # Example
//!
//! ```no_run
//! use beacon_channel::{topic, InProcessBroker, InProcessChannel, MessageChannel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = InProcessChannel::new(InProcessBroker::new());
//!     let _events = channel.connect("memory://local").await?;
//!
//!     channel.subscribe(topic::AGENT_MESSAGE).await?;
//!     channel.publish(topic::AGENT_MESSAGE, b"{}".to_vec()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod in_process;
pub mod mqtt;
pub mod topic;

// Re-exports
pub use channel::{ChannelEvent, ChannelEvents, MessageChannel};
pub use endpoint::{channel_for, Endpoint, DEFAULT_MQTT_PORT};
pub use error::{ChannelError, Result};
pub use in_process::{Delivery, InProcessBroker, InProcessChannel};
pub use mqtt::MqttChannel;
