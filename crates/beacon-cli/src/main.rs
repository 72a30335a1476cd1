//! Beacon CLI
//!
//! Runs a telemetry agent publishing host metrics on the configured
//! channel endpoint and logs what its peers publish.
//!
//! Usage: `beacon [CONFIG]` (default `beacon.toml`, overridable through
//! `BEACON__*` environment variables)

mod host;

use anyhow::{Context, Result};
use beacon_agent::{AgentEvent, TelemetryAgent};
use beacon_channel::channel_for;
use beacon_core::{init_logging, load_config_or_default, AgentConfig, LogConfig};
use sysinfo::System;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::host::HostProbe;

const DEFAULT_CONFIG: &str = "beacon.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = load_config_or_default(&path);
    init_logging(LogConfig::from(&config.logging));

    tracing::info!("Beacon v{}", env!("CARGO_PKG_VERSION"));

    let hostname = System::host_name().unwrap_or_else(|| "localhost".to_string());
    let channel = channel_for(&config.channel.endpoint, &client_id(&config, &hostname))
        .context("Unusable channel endpoint")?;

    let agent = TelemetryAgent::builder()
        .config(&config)
        .hostname(hostname)
        .channel(channel)
        .build()
        .context("Failed to build agent")?;

    let probe = HostProbe::new();
    agent.add_metric("memory", probe.memory())?;
    agent.add_metric("cpu", probe.cpu())?;
    agent.add_metric("rss", probe.process_rss())?;
    agent.add_metric("load", host::load_average())?;
    agent.add_metric("uptime", host::uptime())?;

    let logger = tokio::spawn(log_events(agent.subscribe()));

    agent
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.channel.endpoint))?;

    tracing::info!(agent_id = agent.identity(), "Running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    agent.disconnect().await;
    logger.abort();

    Ok(())
}

/// MQTT client id: the configured identity, else host and pid
fn client_id(config: &AgentConfig, hostname: &str) -> String {
    match &config.agent.uuid {
        Some(uuid) => format!("beacon-{}", uuid),
        None => format!("beacon-{}-{}", hostname, std::process::id()),
    }
}

async fn log_events(mut events: broadcast::Receiver<AgentEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::info!(event = event.name(), "{}", describe(&event)),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn describe(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Connected { agent_id } => format!("connected as {}", agent_id),
        AgentEvent::Disconnected { agent_id } => format!("{} disconnected", agent_id),
        AgentEvent::Reconnecting => "reconnecting".to_string(),
        AgentEvent::Message(envelope) => {
            format!("published {}", envelope.metric_names().join(", "))
        }
        peer => match peer.peer_envelope() {
            Some(envelope) => format!(
                "{} from {}: {}",
                peer.name(),
                envelope.agent.uuid,
                envelope.metric_names().join(", ")
            ),
            None => format!(
                "{}: {}",
                peer.name(),
                peer.peer_payload().map(ToString::to_string).unwrap_or_default()
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_id() {
        let mut config = AgentConfig::default();
        let generated = client_id(&config, "edge-01");
        assert!(generated.starts_with("beacon-edge-01-"));

        config.agent.uuid = Some("rack-12".to_string());
        assert_eq!(client_id(&config, "edge-01"), "beacon-rack-12");
    }

    #[test]
    fn test_describe_local_events() {
        let event = AgentEvent::Connected {
            agent_id: "a-1".to_string(),
        };
        assert_eq!(describe(&event), "connected as a-1");
        assert_eq!(describe(&AgentEvent::Reconnecting), "reconnecting");
    }

    #[test]
    fn test_describe_peer_events() {
        let message = AgentEvent::PeerMessage(json!({
            "agent": {"uuid": "p-1", "hostname": "h", "pid": 2},
            "metrics": [{"type": "heartbeat", "value": true}],
            "timestamp": 5
        }));
        assert_eq!(describe(&message), "agent/message from p-1: heartbeat");

        let joined = AgentEvent::PeerConnected(json!({"agent": {"uuid": "p-1"}}));
        assert_eq!(
            describe(&joined),
            r#"agent/connected: {"agent":{"uuid":"p-1"}}"#
        );
    }
}
