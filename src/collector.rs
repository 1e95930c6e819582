// Collector module - pull-on-demand collection of a single JSON document
//
// A DocumentCollector owns an ordered set of metric definitions plus one
// liveness indicator. Every exposition request calls `collect`, which issues
// a fresh upstream request; nothing is cached between requests.
//
// # Life cycle
// - Unregistered: definitions may be added
// - Registered: entered on the first `describe`, never left; adding fails
//
// # Collect algorithm
// 1. Fetch the document (bounded by the source's timeout)
// 2. On fetch or decode failure emit liveness = 0 and stop
// 3. Otherwise emit liveness = 1 and evaluate every definition independently,
//    skipping (not zeroing) the ones that fail

use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::metrics::{Descriptor, ExtractError, MetricDefinition, Observation};
use crate::source::DocumentSource;

/// Errors returned when configuring a collector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("can't add metrics to an already registered collector")]
    AlreadyRegistered,

    #[error("metric '{name}' with label values {label_values:?} is already defined")]
    DuplicateMetric {
        name: String,
        label_values: Vec<String>,
    },

    #[error("metric '{name}' is already defined with a different help text or label schema")]
    DescriptorConflict { name: String },
}

struct State {
    // The liveness indicator is always at index 0
    metrics: Vec<Arc<MetricDefinition>>,
    registered: bool,
}

/// Pull-on-demand collector for one endpoint
pub struct DocumentCollector {
    name: String,
    endpoint: String,
    source: Arc<dyn DocumentSource>,
    liveness: Arc<MetricDefinition>,
    state: RwLock<State>,
}

impl DocumentCollector {
    /// Creates an unregistered collector holding only its liveness indicator
    ///
    /// # Arguments
    /// * `name` - Collector name used in log messages (e.g. "cluster_health")
    /// * `endpoint` - Path below the source's base URL (e.g. "/_cluster/health")
    /// * `source` - Where documents are fetched from
    /// * `liveness` - The reserved up/down indicator
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        source: Arc<dyn DocumentSource>,
        liveness: MetricDefinition,
    ) -> Self {
        let liveness = Arc::new(liveness);
        DocumentCollector {
            name: name.into(),
            endpoint: endpoint.into(),
            source,
            liveness: Arc::clone(&liveness),
            state: RwLock::new(State {
                metrics: vec![liveness],
                registered: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_registered(&self) -> bool {
        self.state.read().registered
    }

    /// Number of definitions, liveness included
    pub fn metric_count(&self) -> usize {
        self.state.read().metrics.len()
    }

    /// Adds a definition before registration
    ///
    /// # Errors
    /// * `AlreadyRegistered` - `describe` has already been called; nothing changes
    /// * `DuplicateMetric` - same name and label values as an existing definition
    /// * `DescriptorConflict` - same name but a different help text or label schema
    pub fn add_metric(&self, definition: MetricDefinition) -> Result<(), CollectorError> {
        let mut state = self.state.write();
        if state.registered {
            return Err(CollectorError::AlreadyRegistered);
        }

        for existing in &state.metrics {
            if existing.name() != definition.name() {
                continue;
            }
            if existing.descriptor() != definition.descriptor() {
                return Err(CollectorError::DescriptorConflict {
                    name: definition.name().to_string(),
                });
            }
            if existing.label_values() == definition.label_values() {
                return Err(CollectorError::DuplicateMetric {
                    name: definition.name().to_string(),
                    label_values: definition.label_values().to_vec(),
                });
            }
        }

        state.metrics.push(Arc::new(definition));
        Ok(())
    }

    /// Adds several definitions, stopping at the first error
    pub fn add_metrics<I>(&self, definitions: I) -> Result<(), CollectorError>
    where
        I: IntoIterator<Item = MetricDefinition>,
    {
        for definition in definitions {
            self.add_metric(definition)?;
        }
        Ok(())
    }

    /// Enumerates the descriptors, liveness first, and marks the collector registered
    ///
    /// Definitions sharing a name (one per label value) yield one descriptor.
    pub fn describe(&self) -> Vec<Descriptor> {
        let state = self.state.upgradable_read();
        let state = if state.registered {
            RwLockUpgradableReadGuard::downgrade(state)
        } else {
            let mut state = RwLockUpgradableReadGuard::upgrade(state);
            state.registered = true;
            RwLockWriteGuard::downgrade(state)
        };

        let mut seen = HashSet::new();
        state
            .metrics
            .iter()
            .filter(|m| seen.insert(m.name().to_string()))
            .map(|m| m.descriptor().clone())
            .collect()
    }

    /// Fetches the document and evaluates every definition against it
    ///
    /// Always returns exactly one liveness observation, first.
    pub async fn collect(&self) -> Vec<Observation> {
        let metrics: Vec<Arc<MetricDefinition>> = self.state.read().metrics.clone();
        let mut observations = Vec::with_capacity(metrics.len());

        let document = match self.source.fetch(&self.endpoint).await {
            Ok(document) => document,
            Err(e) => {
                error!("Collector '{}' failed to fetch document: {}", self.name, e);
                observations.push(self.liveness.observe_liveness(false));
                return observations;
            }
        };

        observations.push(self.liveness.observe_liveness(true));

        for metric in metrics.iter().filter(|m| !m.is_liveness()) {
            let value = match metric.extract(&document) {
                Ok(value) => value,
                Err(e @ ExtractError::PathNotFound { .. }) => {
                    debug!("Collector '{}' skipped '{}': {}", self.name, metric.name(), e);
                    continue;
                }
                Err(e) => {
                    warn!("Collector '{}' skipped '{}': {}", self.name, metric.name(), e);
                    continue;
                }
            };

            match metric.observe(value) {
                Ok(observation) => observations.push(observation),
                Err(e) => warn!("Collector '{}' could not emit '{}': {}", self.name, metric.name(), e),
            }
        }

        debug!(
            "Collector '{}' produced {} observation(s)",
            self.name,
            observations.len()
        );
        observations
    }
}

impl std::fmt::Debug for DocumentCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCollector")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("metrics", &self.metric_count())
            .field("registered", &self.is_registered())
            .finish()
    }
}
