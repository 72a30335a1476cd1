//! Envelope assembly for one collection cycle

use crate::{
    AgentDescriptor, Envelope, MetricProducer, MetricRecord, MetricRegistry, ResolvedValue,
    Result, TelemetryError,
};

/// Result of one cycle's resolution step
#[derive(Debug)]
pub struct CycleReport {
    /// Envelope holding every metric that resolved
    pub envelope: Envelope,

    /// Producers that failed this cycle (omitted from the envelope)
    pub failures: Vec<TelemetryError>,
}

impl CycleReport {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Resolve one producer into its envelope record
pub async fn resolve_metric(name: &str, producer: &MetricProducer) -> Result<MetricRecord> {
    let value = producer
        .resolve()
        .await
        .map_err(|source| TelemetryError::producer(name, source))?;
    Ok(MetricRecord::new(name, ResolvedValue::from(value)))
}

/// Builds envelopes from a registry snapshot
#[derive(Clone)]
pub struct EnvelopeBuilder {
    registry: MetricRegistry,
    agent: AgentDescriptor,
}

impl EnvelopeBuilder {
    pub fn new(registry: MetricRegistry, agent: AgentDescriptor) -> Self {
        Self { registry, agent }
    }

    pub fn agent(&self) -> &AgentDescriptor {
        &self.agent
    }

    /// Run the resolution step of one cycle
    ///
    /// Producers resolve one at a time in registration order. Returns
    /// `None` when nothing is registered; the caller skips publishing.
    pub async fn build(&self) -> Option<CycleReport> {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            return None;
        }

        let mut metrics = Vec::with_capacity(snapshot.len());
        let mut failures = Vec::new();

        for (name, producer) in snapshot.iter() {
            match resolve_metric(name, producer).await {
                Ok(record) => metrics.push(record),
                Err(e) => {
                    tracing::warn!(metric = name, error = %e, "Metric producer failed, omitting");
                    failures.push(e);
                }
            }
        }

        tracing::debug!(
            resolved = metrics.len(),
            failed = failures.len(),
            "Cycle metrics resolved"
        );

        Some(CycleReport {
            envelope: Envelope::new(self.agent.clone(), metrics),
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProducerError, ProducerReturn};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn descriptor() -> AgentDescriptor {
        AgentDescriptor {
            uuid: "local".to_string(),
            name: None,
            hostname: "host".to_string(),
            pid: 7,
        }
    }

    #[tokio::test]
    async fn test_empty_registry_builds_nothing() {
        let builder = EnvelopeBuilder::new(MetricRegistry::new(), descriptor());
        assert!(builder.build().await.is_none());
    }

    #[tokio::test]
    async fn test_metrics_follow_registration_order() {
        let registry = MetricRegistry::new();
        // Slowest first: order must not depend on completion time
        registry
            .add(
                "slow",
                MetricProducer::direct(|| {
                    ProducerReturn::deferred(async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(json!(1))
                    })
                }),
            )
            .unwrap();
        registry.add("fast", MetricProducer::direct(|| json!(2))).unwrap();
        registry
            .add("callback", MetricProducer::callback(|done| done.ok(3)))
            .unwrap();

        let report = EnvelopeBuilder::new(registry, descriptor()).build().await.unwrap();
        assert_eq!(report.envelope.metric_names(), vec!["slow", "fast", "callback"]);
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn test_sequential_resolution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = MetricRegistry::new();

        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            registry
                .add(
                    name,
                    MetricProducer::direct(move || {
                        let log = Arc::clone(&log);
                        ProducerReturn::deferred(async move {
                            log.lock().unwrap().push(format!("start {}", name));
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            log.lock().unwrap().push(format!("end {}", name));
                            Ok(Value::Null)
                        })
                    }),
                )
                .unwrap();
        }

        EnvelopeBuilder::new(registry, descriptor()).build().await.unwrap();

        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec!["start a", "end a", "start b", "end b", "start c", "end c"]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let registry = MetricRegistry::new();
        registry.add("plain", MetricProducer::direct(|| json!(5))).unwrap();
        registry
            .add(
                "rejected",
                MetricProducer::deferred(|| async { Err::<Value, _>("no data") }),
            )
            .unwrap();
        registry
            .add(
                "errback",
                MetricProducer::callback(|done| done.done(Some(ProducerError::new("eio")), None)),
            )
            .unwrap();
        registry
            .add(
                "promised",
                MetricProducer::deferred(|| async { Ok::<_, ProducerError>(json!(5)) }),
            )
            .unwrap();

        let report = EnvelopeBuilder::new(registry, descriptor()).build().await.unwrap();

        assert_eq!(report.envelope.metric_names(), vec!["plain", "promised"]);
        assert_eq!(report.envelope.metrics[0].value, report.envelope.metrics[1].value);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            &report.failures[0],
            TelemetryError::ProducerFailure { metric, .. } if metric == "rejected"
        ));
        assert!(report.is_degraded());
    }

    #[tokio::test]
    async fn test_all_failed_still_builds() {
        let registry = MetricRegistry::new();
        registry
            .add("broken", MetricProducer::callback(|done| done.fail("down")))
            .unwrap();

        let report = EnvelopeBuilder::new(registry, descriptor()).build().await.unwrap();
        assert!(report.envelope.metrics.is_empty());
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_envelope_stamped_with_agent() {
        let registry = MetricRegistry::new();
        registry.add("rss", MetricProducer::direct(|| json!({"unit": "MB"}))).unwrap();

        let report = EnvelopeBuilder::new(registry, descriptor()).build().await.unwrap();
        let envelope = report.envelope;

        assert_eq!(envelope.agent, descriptor());
        assert!(envelope.timestamp > 0);
        assert_eq!(
            serde_json::to_value(&envelope.metrics[0]).unwrap(),
            json!({"type": "rss", "value": {"unit": "MB"}, "unit": "MB"})
        );
    }

    #[tokio::test]
    async fn test_resolve_metric_error_names_metric() {
        let producer = MetricProducer::callback(|done| done.fail("timeout"));
        let err = resolve_metric("disk", &producer).await.unwrap_err();
        assert_eq!(err.to_string(), "Metric 'disk' failed: timeout");
    }
}
