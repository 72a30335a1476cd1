//! Wire types
//!
//! ```text
//! {
//!   "agent":   { "uuid": "...", "hostname": "...", "pid": 1234 },
//!   "metrics": [ { "type": "rss", "value": 1024 }, ... ],
//!   "timestamp": 1700000000000
//! }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Identity of the publishing agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub uuid: String,

    /// Optional human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub hostname: String,
    pub pid: u32,
}

/// Outcome of one producer, classified for envelope assembly
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    /// Primitives, null and arrays
    Scalar(Value),

    /// JSON objects; their fields are merged into the metric record
    Structured(Map<String, Value>),
}

impl ResolvedValue {
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

impl From<Value> for ResolvedValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::Structured(fields),
            other => Self::Scalar(other),
        }
    }
}

/// One metric as it appears in the envelope
///
/// Structured values are repeated as top-level fields next to `type` and
/// `value`. `type` and `value` always keep their base meaning: a
/// structured value's own `type`/`value` keys are not lifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(rename = "type")]
    pub metric_type: String,

    pub value: Value,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetricRecord {
    pub fn new<S: Into<String>>(name: S, resolved: ResolvedValue) -> Self {
        match resolved {
            ResolvedValue::Scalar(value) => Self {
                metric_type: name.into(),
                value,
                fields: Map::new(),
            },
            ResolvedValue::Structured(structured) => {
                let fields = structured
                    .iter()
                    .filter(|(key, _)| key.as_str() != "type" && key.as_str() != "value")
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Self {
                    metric_type: name.into(),
                    value: Value::Object(structured),
                    fields,
                }
            }
        }
    }

    /// Merged field lifted from a structured value
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// One cycle's published message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub agent: AgentDescriptor,
    pub metrics: Vec<MetricRecord>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Envelope {
    /// Stamp metrics with the agent descriptor and the current time
    pub fn new(agent: AgentDescriptor, metrics: Vec<MetricRecord>) -> Self {
        Self {
            agent,
            metrics,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<&MetricRecord> {
        self.metrics.iter().find(|m| m.metric_type == name)
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.metric_type.as_str()).collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Payload of `agent/connected` and `agent/disconnected`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub agent: AgentDescriptor,
    pub timestamp: i64,
}

impl Announcement {
    pub fn new(agent: AgentDescriptor) -> Self {
        Self {
            agent,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
