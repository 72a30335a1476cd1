//! Telemetry agent
//!
//! Wires the registry, envelope builder, scheduler and identity filter to a
//! [`MessageChannel`] and exposes the result through an [`EventBus`].

use async_trait::async_trait;
use beacon_channel::{topic, ChannelError, ChannelEvent, ChannelEvents, MessageChannel};
use beacon_core::AgentConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::{
    AgentDescriptor, AgentEvent, AgentEventKind, Announcement, Classification, CycleRunner,
    CycleScheduler, CycleState, EnvelopeBuilder, EventBus, EventSubscription, IdentityFilter,
    MetricProducer, MetricRegistry, Result, SchedulerHandle, TelemetryError,
};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
const DEFAULT_ENDPOINT: &str = "mqtt://localhost";
const DEFAULT_EVENT_CAPACITY: usize = 1000;
/// Longest disconnect waits for an in-flight cycle
const CYCLE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for [`TelemetryAgent`]
pub struct TelemetryAgentBuilder {
    identity: Option<String>,
    name: Option<String>,
    hostname: Option<String>,
    pid: Option<u32>,
    interval: Duration,
    endpoint: String,
    announce: bool,
    event_capacity: usize,
    channel: Option<Arc<dyn MessageChannel>>,
}

impl TelemetryAgentBuilder {
    pub fn new() -> Self {
        Self {
            identity: None,
            name: None,
            hostname: None,
            pid: None,
            interval: DEFAULT_INTERVAL,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            announce: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            channel: None,
        }
    }

    /// Apply the `agent` and `channel` sections of a loaded config
    pub fn config(mut self, config: &AgentConfig) -> Self {
        self.identity = config.agent.uuid.clone();
        self.name = config.agent.name.clone();
        self.interval = config.agent.interval();
        self.announce = config.agent.announce;
        self.endpoint = config.channel.endpoint.clone();
        self
    }

    /// Agent identity; a random UUID is used when not set
    pub fn identity<S: Into<String>>(mut self, identity: S) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Hostname reported in the agent descriptor (default: `localhost`)
    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Process id reported in the agent descriptor (default: this process)
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Delay between the end of a cycle and the start of the next
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Publish lifecycle announcements on connect/disconnect
    pub fn announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn build(self) -> Result<TelemetryAgent> {
        let channel = self
            .channel
            .ok_or_else(|| TelemetryError::config("a message channel is required"))?;

        if self.interval.is_zero() {
            return Err(TelemetryError::config("interval must be greater than zero"));
        }

        let identity = self
            .identity
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if identity.trim().is_empty() {
            return Err(TelemetryError::config("agent identity must not be empty"));
        }

        let agent = AgentDescriptor {
            uuid: identity.clone(),
            name: self.name,
            hostname: self.hostname.unwrap_or_else(|| "localhost".to_string()),
            pid: self.pid.unwrap_or_else(std::process::id),
        };

        Ok(TelemetryAgent {
            inner: Arc::new(AgentInner {
                filter: IdentityFilter::new(identity),
                agent,
                endpoint: self.endpoint,
                interval: self.interval,
                announce: self.announce,
                registry: MetricRegistry::new(),
                channel,
                bus: EventBus::new(self.event_capacity),
                started: AtomicBool::new(false),
                scheduler: Mutex::new(None),
            }),
        })
    }
}

impl Default for TelemetryAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically publishes local metrics and re-emits peer traffic
///
/// # Example
///
/// ```no_run
/// use beacon_agent::{MetricProducer, TelemetryAgent};
/// use beacon_channel::{InProcessBroker, InProcessChannel};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn run() -> beacon_agent::Result<()> {
/// let channel = Arc::new(InProcessChannel::new(InProcessBroker::new()));
/// let agent = TelemetryAgent::builder().channel(channel).build()?;
///
/// agent.add_metric("answer", MetricProducer::direct(|| json!(42)))?;
/// agent.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct TelemetryAgent {
    inner: Arc<AgentInner>,
}

impl TelemetryAgent {
    pub fn builder() -> TelemetryAgentBuilder {
        TelemetryAgentBuilder::new()
    }

    pub fn identity(&self) -> &str {
        &self.inner.agent.uuid
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.inner.agent
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Register or replace a metric producer
    pub fn add_metric<S: Into<String>>(&self, name: S, producer: MetricProducer) -> Result<()> {
        self.inner.registry.add(name, producer)
    }

    /// Remove a metric producer (no-op if absent)
    pub fn remove_metric(&self, name: &str) -> bool {
        self.inner.registry.remove(name)
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.inner.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.inner.bus.subscribe()
    }

    pub fn subscribe_to(&self, kind: AgentEventKind) -> EventSubscription {
        self.inner.bus.subscribe_to(kind)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn cycle_state(&self) -> CycleState {
        self.inner
            .scheduler_slot()
            .as_ref()
            .map(SchedulerHandle::state)
            .unwrap_or(CycleState::Stopped)
    }

    /// Connect the channel and subscribe to the agent topics
    ///
    /// Cycling starts when the channel reports the connection. Calling
    /// `connect` on a started agent does nothing.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            tracing::debug!(agent_id = %inner.agent.uuid, "Agent already started");
            return Ok(());
        }

        let events = match inner.channel.connect(&inner.endpoint).await {
            Ok(events) => events,
            Err(e) => {
                inner.started.store(false, Ordering::SeqCst);
                tracing::error!(endpoint = %inner.endpoint, error = %e, "Connection failed");
                return Err(e.into());
            }
        };

        for name in topic::AGENT_TOPICS {
            if let Err(e) = inner.channel.subscribe(name).await {
                inner.started.store(false, Ordering::SeqCst);
                let _ = inner.channel.disconnect().await;
                return Err(e.into());
            }
        }

        tracing::info!(
            agent_id = %inner.agent.uuid,
            endpoint = %inner.endpoint,
            channel = inner.channel.name(),
            "Agent connecting"
        );

        tokio::spawn(Arc::clone(inner).run_events(events));
        Ok(())
    }

    /// Stop cycling, emit `disconnected` and release the channel
    ///
    /// A cycle already in flight is awaited first, so its envelope is
    /// published before the announcement and never on a later session.
    /// Calling `disconnect` on a stopped agent does nothing.
    pub async fn disconnect(&self) {
        self.inner.shutdown().await;
    }
}

impl Drop for TelemetryAgent {
    fn drop(&mut self) {
        if !self.is_started() {
            return;
        }
        // Best-effort teardown when the embedder forgot to disconnect
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            runtime.spawn(async move { inner.shutdown().await });
        }
    }
}

struct AgentInner {
    agent: AgentDescriptor,
    endpoint: String,
    interval: Duration,
    announce: bool,
    registry: MetricRegistry,
    channel: Arc<dyn MessageChannel>,
    bus: EventBus,
    filter: IdentityFilter,
    started: AtomicBool,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl AgentInner {
    fn scheduler_slot(&self) -> MutexGuard<'_, Option<SchedulerHandle>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_events(self: Arc<Self>, mut events: ChannelEvents) {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Connected => self.on_connected().await,
                ChannelEvent::Message { topic, payload } => self.on_message(&topic, &payload),
                ChannelEvent::Reconnecting => {
                    tracing::info!(agent_id = %self.agent.uuid, "Channel reconnecting");
                    self.bus.emit(AgentEvent::Reconnecting);
                }
                ChannelEvent::Error(reason) => {
                    let err = TelemetryError::Transport(ChannelError::transport(reason));
                    tracing::error!(
                        agent_id = %self.agent.uuid,
                        error = %err,
                        "Channel failed, disconnecting"
                    );
                    self.shutdown().await;
                    break;
                }
            }
        }
        tracing::debug!(agent_id = %self.agent.uuid, "Channel event loop ended");
    }

    async fn on_connected(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }

        tracing::info!(agent_id = %self.agent.uuid, "Agent connected");
        self.bus.emit(AgentEvent::Connected {
            agent_id: self.agent.uuid.clone(),
        });

        if self.announce {
            self.publish_announcement(topic::AGENT_CONNECTED).await;
        }

        let mut slot = self.scheduler_slot();
        if slot.is_some() {
            tracing::debug!("Cycle scheduler already running");
            return;
        }
        // Disconnected while announcing
        if !self.started.load(Ordering::SeqCst) {
            return;
        }

        let runner = Arc::new(PublishCycle {
            builder: EnvelopeBuilder::new(self.registry.clone(), self.agent.clone()),
            channel: Arc::clone(&self.channel),
            bus: self.bus.clone(),
        });
        *slot = Some(CycleScheduler::new(self.interval).start(runner));
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        match self.filter.classify(topic, payload) {
            Classification::Emit { topic, payload } => {
                if let Some(event) = AgentEvent::peer(&topic, payload) {
                    self.bus.emit(event);
                }
            }
            Classification::Suppress(reason) => {
                tracing::trace!(topic, ?reason, "Inbound message suppressed");
            }
        }
    }

    async fn shutdown(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }

        let scheduler = self.scheduler_slot().take();
        if let Some(handle) = scheduler {
            if tokio::time::timeout(CYCLE_DRAIN_TIMEOUT, handle.shutdown())
                .await
                .is_err()
            {
                tracing::warn!(
                    agent_id = %self.agent.uuid,
                    "In-flight cycle still running after {:?}, detaching it",
                    CYCLE_DRAIN_TIMEOUT
                );
            }
        }

        tracing::info!(agent_id = %self.agent.uuid, "Agent disconnected");
        self.bus.emit(AgentEvent::Disconnected {
            agent_id: self.agent.uuid.clone(),
        });

        if self.announce {
            self.publish_announcement(topic::AGENT_DISCONNECTED).await;
        }

        if let Err(e) = self.channel.disconnect().await {
            tracing::warn!(error = %e, "Channel disconnect failed");
        }
    }

    async fn publish_announcement(&self, name: &str) {
        let payload = match Announcement::new(self.agent.clone()).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(topic = name, error = %e, "Could not encode announcement");
                return;
            }
        };

        if let Err(e) = self.channel.publish(name, payload).await {
            tracing::warn!(topic = name, error = %e, "Announcement not published");
        }
    }
}

/// One collect-and-publish pass
struct PublishCycle {
    builder: EnvelopeBuilder,
    channel: Arc<dyn MessageChannel>,
    bus: EventBus,
}

#[async_trait]
impl CycleRunner for PublishCycle {
    async fn run_cycle(&self) {
        let Some(report) = self.builder.build().await else {
            tracing::debug!("No metrics registered, skipping publish");
            return;
        };

        let payload = match report.envelope.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode envelope");
                return;
            }
        };

        match self.channel.publish(topic::AGENT_MESSAGE, payload).await {
            Ok(()) => {
                tracing::debug!(
                    metrics = report.envelope.metrics.len(),
                    failed = report.failures.len(),
                    "Envelope published"
                );
                self.bus.emit(AgentEvent::Message(report.envelope));
            }
            Err(e) => {
                let err = TelemetryError::PublishFailure(e);
                tracing::warn!(error = %err, "Envelope not published, next cycle retries");
            }
        }
    }
}
