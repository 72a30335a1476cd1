//! Metric registry
//!
//! Name -> producer map in registration order. The registry may change at
//! any time; each cycle works on a [`RegistrySnapshot`] taken once at the
//! start of the cycle.

use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{MetricProducer, Result, TelemetryError};

/// Registry of metric producers
///
/// Thread-safe and cheap to clone; clones share the same producers.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    producers: Arc<RwLock<IndexMap<String, MetricProducer>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, MetricProducer>> {
        self.producers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, MetricProducer>> {
        self.producers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a producer, replacing any producer already under `name`
    ///
    /// A replaced producer keeps its original position in resolution order.
    ///
    /// # Returns
    /// `TelemetryError::Configuration` if the name is empty
    pub fn add<S: Into<String>>(&self, name: S, producer: MetricProducer) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TelemetryError::config("metric name must not be empty"));
        }

        let kind = producer.kind();
        let replaced = self.write().insert(name.clone(), producer).is_some();

        if replaced {
            tracing::debug!(metric = %name, kind, "Replaced metric producer");
        } else {
            tracing::debug!(metric = %name, kind, "Registered metric producer");
        }
        Ok(())
    }

    /// Remove a producer. Returns whether one was registered.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.write().shift_remove(name).is_some();
        if removed {
            tracing::debug!(metric = %name, "Removed metric producer");
        }
        removed
    }

    /// Ordered copy of the current producers
    pub fn snapshot(&self) -> RegistrySnapshot {
        let entries = self
            .read()
            .iter()
            .map(|(name, producer)| (name.clone(), producer.clone()))
            .collect();
        RegistrySnapshot { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered names in resolution order
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }
}

/// Immutable, ordered view of the registry at one point in time
#[derive(Clone, Debug)]
pub struct RegistrySnapshot {
    entries: Vec<(String, MetricProducer)>,
}

impl RegistrySnapshot {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricProducer)> {
        self.entries
            .iter()
            .map(|(name, producer)| (name.as_str(), producer))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
