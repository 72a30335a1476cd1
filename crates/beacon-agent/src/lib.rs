//! Beacon Agent
//!
//! A telemetry agent that periodically resolves a set of named metric
//! producers, publishes the results as one envelope on a shared pub/sub
//! channel, and re-emits envelopes published by peer agents while
//! filtering out its own.
//!
//! # Example
//!
//! ```no_run
//! use beacon_agent::{AgentEventKind, MetricProducer, TelemetryAgent};
//! use beacon_channel::{InProcessBroker, InProcessChannel};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let channel = Arc::new(InProcessChannel::new(InProcessBroker::new()));
//!     let agent = TelemetryAgent::builder()
//!         .identity("agent-1")
//!         .interval(Duration::from_secs(1))
//!         .channel(channel)
//!         .build()?;
//!
//!     agent.add_metric("rss", MetricProducer::direct(|| json!({"unit": "MB"})))?;
//!     agent.add_metric("random", MetricProducer::callback(|done| done.ok(4)))?;
//!
//!     let mut peers = agent.subscribe_to(AgentEventKind::PeerMessage);
//!     agent.connect().await?;
//!
//!     while let Some(event) = peers.recv().await {
//!         println!("peer: {:?}", event.peer_payload());
//!     }
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod builder;
pub mod bus;
pub mod envelope;
pub mod error;
pub mod event;
pub mod filter;
pub mod producer;
pub mod registry;
pub mod scheduler;

// Re-exports
pub use agent::{TelemetryAgent, TelemetryAgentBuilder};
pub use builder::{resolve_metric, CycleReport, EnvelopeBuilder};
pub use bus::{EventBus, EventSubscription};
pub use envelope::{AgentDescriptor, Announcement, Envelope, MetricRecord, ResolvedValue};
pub use error::{Result, TelemetryError};
pub use event::{AgentEvent, AgentEventKind};
pub use filter::{Classification, IdentityFilter, SuppressReason};
pub use producer::{Completion, MetricProducer, ProducerError, ProducerReturn};
pub use registry::{MetricRegistry, RegistrySnapshot};
pub use scheduler::{CycleRunner, CycleScheduler, CycleState, SchedulerHandle};
