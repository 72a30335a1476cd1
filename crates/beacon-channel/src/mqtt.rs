//! MQTT channel backed by `rumqttc`
//!
//! The client's event loop runs in its own task and is translated into
//! [`ChannelEvent`]s. rumqttc reconnects when the loop is polled again after
//! an error; a lost connection is reported once as `Reconnecting`, every
//! successful CONNACK as `Connected`. A broker refusing the session ends it
//! with `Error`.

use async_trait::async_trait;
use dashmap::DashSet;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{ChannelError, ChannelEvent, ChannelEvents, Endpoint, MessageChannel, Result};

const REQUEST_CAPACITY: usize = 64;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);
/// rumqttc rejects shorter keep-alives
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

struct Session {
    client: AsyncClient,
    task: JoinHandle<()>,
}

/// [`MessageChannel`] over an MQTT broker
pub struct MqttChannel {
    client_id: String,
    keep_alive: Duration,
    qos: QoS,
    session: Mutex<Option<Session>>,
    topics: Arc<DashSet<String>>,
}

impl MqttChannel {
    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            qos: QoS::AtLeastOnce,
            session: Mutex::new(None),
            topics: Arc::new(DashSet::new()),
        }
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive.max(MIN_KEEP_ALIVE);
        self
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Result<AsyncClient> {
        self.session()
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or(ChannelError::NotConnected)
    }
}

#[async_trait]
impl MessageChannel for MqttChannel {
    async fn connect(&self, endpoint: &str) -> Result<ChannelEvents> {
        let (host, port) = match Endpoint::parse(endpoint)? {
            Endpoint::Mqtt { host, port } => (host, port),
            other => {
                return Err(ChannelError::connection_failed(
                    endpoint,
                    format!("{} endpoint given to the MQTT channel", other.scheme()),
                ))
            }
        };

        let previous = self.session().take();
        if let Some(previous) = previous {
            previous.task.abort();
        }

        let mut options = MqttOptions::new(self.client_id.clone(), host.clone(), port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(
            eventloop,
            client.clone(),
            Arc::clone(&self.topics),
            self.qos,
            tx,
        ));
        *self.session() = Some(Session { client, task });

        tracing::debug!(%host, port, client_id = %self.client_id, "MQTT channel connecting");
        Ok(rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let client = self.client()?;
        client
            .subscribe(topic, self.qos)
            .await
            .map_err(|e| ChannelError::transport(e.to_string()))?;
        self.topics.insert(topic.to_string());

        tracing::debug!("Subscribed to topic: {}", topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let client = self.client()?;
        client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| ChannelError::publish_failed(topic, e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        let session = self.session().take();
        let Some(session) = session else {
            return Ok(());
        };
        self.topics.clear();

        if let Err(e) = session.client.disconnect().await {
            tracing::debug!(error = %e, "MQTT disconnect request not queued");
        }

        // Queued publishes go out before the DISCONNECT packet
        let abort = session.task.abort_handle();
        if tokio::time::timeout(DISCONNECT_GRACE, session.task).await.is_err() {
            tracing::warn!("MQTT event loop did not finish, aborting");
            abort.abort();
        }

        tracing::debug!("MQTT channel disconnected");
        Ok(())
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

impl Drop for MqttChannel {
    fn drop(&mut self) {
        if let Some(session) = self.session().take() {
            session.task.abort();
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Arc<DashSet<String>>,
    qos: QoS,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut reported_down = false;

    loop {
        let notice = match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(event) => {
                if matches!(event, Event::Incoming(Packet::ConnAck(_))) {
                    reported_down = false;
                    resubscribe(&client, &topics, qos);
                }
                translate(event)
            }
            Err(ConnectionError::ConnectionRefused(code)) => {
                let reason = format!("broker refused connection: {:?}", code);
                let _ = events.send(ChannelEvent::Error(reason));
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "MQTT connection lost");
                let notice = (!reported_down).then_some(ChannelEvent::Reconnecting);
                reported_down = true;
                if let Some(notice) = notice {
                    if events.send(notice).is_err() {
                        break;
                    }
                }
                tokio::time::sleep(RETRY_DELAY).await;
                None
            }
        };

        if let Some(notice) = notice {
            if events.send(notice).is_err() {
                break;
            }
        }
    }

    tracing::debug!("MQTT event loop ended");
}

/// A clean session forgets subscriptions; restore them after a reconnect
fn resubscribe(client: &AsyncClient, topics: &DashSet<String>, qos: QoS) {
    for topic in topics.iter() {
        if let Err(e) = client.try_subscribe(topic.key().as_str(), qos) {
            tracing::warn!(topic = %topic.key(), error = %e, "Resubscribe failed");
        }
    }
}

fn translate(event: Event) -> Option<ChannelEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(ChannelEvent::Connected),
        Event::Incoming(Packet::Publish(publish)) => Some(ChannelEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }),
        _ => None,
    }
}
