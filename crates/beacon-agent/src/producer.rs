//! Metric producers
//!
//! A producer is either *direct* (called with no arguments, returns a
//! value or a deferred value) or *callback* (handed an error-first
//! [`Completion`]). [`MetricProducer::resolve`] turns both into one
//! `async` result. A producer that panics fails like one that reports an
//! error.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Failure reported by a producer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ProducerError(String);

impl ProducerError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProducerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ProducerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// What a direct producer returns
pub enum ProducerReturn {
    /// Value available immediately
    Ready(Value),

    /// Value available once the future settles
    Deferred(BoxFuture<'static, Result<Value, ProducerError>>),
}

impl ProducerReturn {
    pub fn ready<V: Into<Value>>(value: V) -> Self {
        Self::Ready(value.into())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, ProducerError>> + Send + 'static,
    {
        Self::Deferred(future.boxed())
    }
}

impl From<Value> for ProducerReturn {
    fn from(value: Value) -> Self {
        Self::Ready(value)
    }
}

/// Error-first completion handed to callback producers
///
/// Exactly one of the `done`/`ok`/`fail` methods consumes it. Dropping it
/// without completing counts as a failure.
pub struct Completion {
    tx: oneshot::Sender<Result<Value, ProducerError>>,
}

impl Completion {
    /// Complete with `(error, value)`: a present error wins, otherwise the
    /// value (or `null` when absent) is the result.
    pub fn done(self, error: Option<ProducerError>, value: Option<Value>) {
        let outcome = match error {
            Some(error) => Err(error),
            None => Ok(value.unwrap_or(Value::Null)),
        };
        // Receiver gone means the cycle no longer waits for us
        let _ = self.tx.send(outcome);
    }

    pub fn ok<V: Into<Value>>(self, value: V) {
        self.done(None, Some(value.into()));
    }

    pub fn fail<E: Into<ProducerError>>(self, error: E) {
        self.done(Some(error.into()), None);
    }
}

type DirectFn = dyn Fn() -> ProducerReturn + Send + Sync;
type CallbackFn = dyn Fn(Completion) + Send + Sync;

/// A registered unit of work yielding one metric value
#[derive(Clone)]
pub enum MetricProducer {
    /// Zero-argument producer
    Direct(Arc<DirectFn>),

    /// Producer completing through an error-first callback
    Callback(Arc<CallbackFn>),
}

impl MetricProducer {
    /// Producer returning a value, or a [`ProducerReturn::Deferred`]
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_agent::MetricProducer;
    /// use serde_json::json;
    ///
    /// let uptime = MetricProducer::direct(|| json!(42));
    /// ```
    pub fn direct<F, R>(produce: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Into<ProducerReturn>,
    {
        Self::Direct(Arc::new(move || produce().into()))
    }

    /// Producer returning a future
    pub fn deferred<F, Fut, T, E>(produce: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Value>,
        E: Into<ProducerError>,
    {
        Self::Direct(Arc::new(move || {
            let pending = produce().map(|outcome| outcome.map(Into::into).map_err(Into::into));
            ProducerReturn::deferred(pending)
        }))
    }

    /// Producer completing through a [`Completion`]
    ///
    /// The completion may be moved into a spawned task and completed later.
    pub fn callback<F>(produce: F) -> Self
    where
        F: Fn(Completion) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(produce))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Callback(_) => "callback",
        }
    }

    /// Invoke the producer and wait for its value
    pub async fn resolve(&self) -> Result<Value, ProducerError> {
        match self {
            Self::Direct(produce) => {
                let returned =
                    panic::catch_unwind(AssertUnwindSafe(|| produce())).map_err(panicked)?;
                match returned {
                    ProducerReturn::Ready(value) => Ok(value),
                    ProducerReturn::Deferred(pending) => AssertUnwindSafe(pending)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panicked(payload))),
                }
            }
            Self::Callback(produce) => {
                let (tx, rx) = oneshot::channel();
                panic::catch_unwind(AssertUnwindSafe(|| produce(Completion { tx })))
                    .map_err(panicked)?;
                rx.await.unwrap_or_else(|_| {
                    Err(ProducerError::new("callback dropped without completing"))
                })
            }
        }
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> ProducerError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    ProducerError::new(format!("producer panicked: {}", detail))
}

impl fmt::Debug for MetricProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetricProducer::{}", self.kind())
    }
}
