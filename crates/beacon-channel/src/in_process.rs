//! In-process channel using Tokio channels
//!
//! [`InProcessBroker`] plays the role of the shared pub/sub server: every
//! [`InProcessChannel`] attached to the same broker sees every publish on
//! the topics it subscribed to, including its own.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::{ChannelError, ChannelEvent, ChannelEvents, MessageChannel, Result};

/// A message routed through the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Shared in-memory pub/sub hub
#[derive(Clone)]
pub struct InProcessBroker {
    /// Topics (topic -> broadcast sender)
    topics: Arc<DashMap<String, broadcast::Sender<Delivery>>>,
    capacity: usize,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Create a broker whose per-topic buffers hold `capacity` messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Delivery> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .clone()
    }

    /// Get a raw subscriber for a topic
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Delivery> {
        self.sender(topic).subscribe()
    }

    /// Publish to every current subscriber of `topic`
    ///
    /// Returns the number of subscribers reached. Publishing to a topic
    /// nobody listens on is not an error.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> usize {
        let delivery = Delivery {
            topic: topic.to_string(),
            payload,
        };
        self.sender(topic).send(delivery).unwrap_or(0)
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// One client connection to an [`InProcessBroker`]
///
/// Besides the [`MessageChannel`] contract it exposes knobs to simulate
/// transport behavior: refused connections, rejected publishes and
/// injected lifecycle events.
pub struct InProcessChannel {
    broker: InProcessBroker,

    /// Event stream of the current session (None while disconnected)
    events: Mutex<Option<mpsc::UnboundedSender<ChannelEvent>>>,

    /// Forwarding tasks (topic -> task moving broker deliveries into the event stream)
    forwarders: DashMap<String, JoinHandle<()>>,

    refuse_connect: AtomicBool,
    fail_publish: AtomicBool,
    published: AtomicUsize,
}

impl InProcessChannel {
    pub fn new(broker: InProcessBroker) -> Self {
        Self {
            broker,
            events: Mutex::new(None),
            forwarders: DashMap::new(),
            refuse_connect: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            published: AtomicUsize::new(0),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<ChannelEvent>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_forwarders(&self) {
        for entry in self.forwarders.iter() {
            entry.value().abort();
        }
        self.forwarders.clear();
    }

    /// Broker this channel is attached to
    pub fn broker(&self) -> &InProcessBroker {
        &self.broker
    }

    /// Whether a session is currently open
    pub fn is_connected(&self) -> bool {
        self.session().is_some()
    }

    /// Make subsequent `connect` calls fail
    pub fn set_refuse_connect(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Make subsequent `publish` calls fail
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Number of publishes accepted so far
    pub fn publish_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    /// Push a lifecycle event into the current session's stream
    ///
    /// Returns false when there is no open session.
    pub fn inject(&self, event: ChannelEvent) -> bool {
        match self.session().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl MessageChannel for InProcessChannel {
    async fn connect(&self, endpoint: &str) -> Result<ChannelEvents> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(ChannelError::connection_failed(endpoint, "connection refused"));
        }

        self.abort_forwarders();

        let (tx, rx) = mpsc::unbounded_channel();
        // The stream is ours until the receiver is dropped
        let _ = tx.send(ChannelEvent::Connected);
        *self.session() = Some(tx);

        tracing::debug!("In-process channel connected to {}", endpoint);
        Ok(rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let tx = self
            .session()
            .as_ref()
            .cloned()
            .ok_or(ChannelError::NotConnected)?;
        let mut deliveries = self.broker.subscribe(topic);
        let name = topic.to_string();

        let handle = tokio::spawn(async move {
            loop {
                match deliveries.recv().await {
                    Ok(delivery) => {
                        let event = ChannelEvent::Message {
                            topic: delivery.topic,
                            payload: delivery.payload,
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            topic = %name,
                            skipped,
                            "Subscriber lagged, messages dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.forwarders.insert(topic.to_string(), handle) {
            previous.abort();
        }

        tracing::debug!("Subscribed to topic: {}", topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ChannelError::publish_failed(topic, "publish rejected"));
        }

        let reached = self.broker.publish(topic, payload);
        self.published.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(topic, reached, "Published");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let session = self.session().take();
        self.abort_forwarders();

        if session.is_some() {
            tracing::debug!("In-process channel disconnected");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "in_process"
    }
}

impl Drop for InProcessChannel {
    fn drop(&mut self) {
        self.abort_forwarders();
    }
}
