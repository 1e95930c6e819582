// Node stats module - timer-driven, per-node evaluation into long-lived gauges
//
// Unlike the pull-on-demand DocumentCollector, a NodeStatsScraper is driven
// by the scheduler. Each pass fetches one node-keyed document, evaluates
// every definition once per node and writes the results into gauge families
// that exposition requests read without triggering any I/O.
//
// The label of every sample is derived from the node's own document (its
// `host` field), so a node without a usable host name is skipped entirely
// rather than published under a placeholder label.
//
// The families only ever hold what the latest pass saw. Series that a pass
// did not write are removed, and a failed pass empties every family.

use clap::ValueEnum;
use parking_lot::Mutex;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::metrics::{Descriptor, ExtractError, MetricDefinition, Observation};
use crate::source::{DocumentSource, NodeStatsDocument};

/// Label set of a per-node gauge: `[(label name, label value)]`
pub type NodeLabels = Vec<(String, String)>;

/// Floating point gauge family keyed by node label
pub type NodeGaugeFamily = Family<NodeLabels, Gauge<f64, AtomicU64>>;

/// Errors raised while building a per-node gauge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeGaugeError {
    #[error("per-node metric '{name}' must declare exactly one label, found {found}")]
    LabelSchema { name: String, found: usize },
}

/// How the node label value is derived from a node's document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NodeLabel {
    /// The node's `host` field
    #[default]
    Host,

    /// `<host>/<node id>`, for clusters where several nodes share a host
    HostAndId,
}

impl NodeLabel {
    /// Derives the label value, or `None` when `host` is absent or not a string
    pub fn resolve(&self, node_id: &str, node: &Value) -> Option<String> {
        let host = node.get("host")?.as_str()?;
        Some(match self {
            NodeLabel::Host => host.to_string(),
            NodeLabel::HostAndId => format!("{}/{}", host, node_id),
        })
    }
}

/// A per-node metric definition bound to its gauge family
#[derive(Debug)]
pub struct NodeGauge {
    definition: MetricDefinition,
    label: NodeLabel,
    family: NodeGaugeFamily,
    // label sets currently present in `family`
    published: Mutex<HashSet<NodeLabels>>,
}

impl NodeGauge {
    /// # Errors
    /// The definition must declare exactly one label name (the node label).
    pub fn new(definition: MetricDefinition, label: NodeLabel) -> Result<Self, NodeGaugeError> {
        let found = definition.descriptor().label_names().len();
        if found != 1 {
            return Err(NodeGaugeError::LabelSchema {
                name: definition.name().to_string(),
                found,
            });
        }

        Ok(NodeGauge {
            definition,
            label,
            family: NodeGaugeFamily::default(),
            published: Mutex::new(HashSet::new()),
        })
    }

    pub fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    pub fn family(&self) -> &NodeGaugeFamily {
        &self.family
    }

    /// Removes every series whose label set is not in `current`
    fn retain_only(&self, current: HashSet<NodeLabels>) {
        let mut published = self.published.lock();
        for stale in published.difference(&current) {
            self.family.remove(stale);
        }
        *published = current;
    }

    fn clear(&self) {
        let mut published = self.published.lock();
        self.family.clear();
        published.clear();
    }
}

/// Counts from one scrape pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub nodes: usize,
    pub observed: usize,
    pub skipped: usize,
}

/// Timer-driven scraper of one node statistics endpoint
pub struct NodeStatsScraper {
    name: String,
    endpoint: String,
    source: Arc<dyn DocumentSource>,
    liveness: MetricDefinition,
    up: Gauge<f64, AtomicU64>,
    gauges: Vec<NodeGauge>,
}

impl NodeStatsScraper {
    /// Creates a scraper; the liveness gauge starts at 0 until the first pass succeeds
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        source: Arc<dyn DocumentSource>,
        liveness: MetricDefinition,
        gauges: Vec<NodeGauge>,
    ) -> Self {
        NodeStatsScraper {
            name: name.into(),
            endpoint: endpoint.into(),
            source,
            liveness,
            up: Gauge::default(),
            gauges,
        }
    }

    /// Wraps every definition with the same label mode
    pub fn with_definitions(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        source: Arc<dyn DocumentSource>,
        liveness: MetricDefinition,
        definitions: Vec<MetricDefinition>,
        label: NodeLabel,
    ) -> Result<Self, NodeGaugeError> {
        let gauges = definitions
            .into_iter()
            .map(|definition| NodeGauge::new(definition, label))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, endpoint, source, liveness, gauges))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value of the liveness gauge
    pub fn is_up(&self) -> bool {
        self.up.get() >= 1.0
    }

    /// Descriptors of every gauge, liveness first
    pub fn describe(&self) -> Vec<Descriptor> {
        std::iter::once(self.liveness.descriptor().clone())
            .chain(self.gauges.iter().map(|g| g.definition.descriptor().clone()))
            .collect()
    }

    /// Registers the liveness gauge and every family with `registry`
    ///
    /// The registered metrics share state with this scraper, so later
    /// passes are visible through the registry.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            self.liveness.name(),
            self.liveness.descriptor().help(),
            self.up.clone(),
        );
        for gauge in &self.gauges {
            let descriptor = gauge.definition.descriptor();
            registry.register(descriptor.name(), descriptor.help(), gauge.family.clone());
        }
    }

    /// Runs one fetch-and-update pass
    ///
    /// Returns the observations written during this pass. On a fetch or
    /// decode failure the liveness gauge is set to 0 and every family is
    /// emptied, so no value from an earlier pass outlives the failure.
    pub async fn scrape(&self) -> Vec<Observation> {
        let url = self.source.url_for(&self.endpoint);

        let document = match self.source.fetch(&self.endpoint).await {
            Ok(value) => NodeStatsDocument::from_value(&url, value),
            Err(e) => Err(e),
        };

        let document = match document {
            Ok(document) => document,
            Err(e) => {
                error!("Scraper '{}' failed: {}", self.name, e);
                for gauge in &self.gauges {
                    gauge.clear();
                }
                self.up.set(0.0);
                return Vec::new();
            }
        };

        let (observations, summary) = self.observe(&document);
        self.up.set(1.0);

        debug!(
            "Scraper '{}' observed {} value(s) across {} node(s), {} skipped",
            self.name, summary.observed, summary.nodes, summary.skipped
        );
        observations
    }

    /// Evaluates every gauge against every node and updates the families
    ///
    /// Series of departed nodes and of values the document no longer
    /// carries are removed.
    pub fn observe(&self, document: &NodeStatsDocument) -> (Vec<Observation>, ScrapeSummary) {
        let mut observations = Vec::new();
        let mut written: Vec<HashSet<NodeLabels>> = vec![HashSet::new(); self.gauges.len()];
        let mut summary = ScrapeSummary {
            nodes: document.nodes.len(),
            ..ScrapeSummary::default()
        };

        for (node_id, node) in &document.nodes {
            for (index, gauge) in self.gauges.iter().enumerate() {
                let Some(label_value) = gauge.label.resolve(node_id, node) else {
                    warn!(
                        "Scraper '{}' skipped '{}' for node {}: host label is missing or not a string",
                        self.name,
                        gauge.definition.name(),
                        node_id
                    );
                    summary.skipped += 1;
                    continue;
                };

                let value = match gauge.definition.extract(node) {
                    Ok(value) => value,
                    Err(e) => {
                        match e {
                            ExtractError::PathNotFound { .. } => debug!(
                                "Scraper '{}' skipped '{}' for node {}: {}",
                                self.name,
                                gauge.definition.name(),
                                node_id,
                                e
                            ),
                            ExtractError::TypeMismatch { .. } => warn!(
                                "Scraper '{}' skipped '{}' for node {}: {}",
                                self.name,
                                gauge.definition.name(),
                                node_id,
                                e
                            ),
                        }
                        summary.skipped += 1;
                        continue;
                    }
                };

                let observation = match gauge
                    .definition
                    .observe_with_labels(vec![label_value], value)
                {
                    Ok(observation) => observation,
                    Err(e) => {
                        warn!("Scraper '{}' could not emit: {}", self.name, e);
                        summary.skipped += 1;
                        continue;
                    }
                };

                let labels = observation.labels();
                gauge.family.get_or_create(&labels).set(observation.value());
                written[index].insert(labels);
                summary.observed += 1;
                observations.push(observation);
            }
        }

        for (gauge, current) in self.gauges.iter().zip(written) {
            gauge.retain_only(current);
        }

        (observations, summary)
    }
}

impl std::fmt::Debug for NodeStatsScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStatsScraper")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("gauges", &self.gauges.len())
            .finish()
    }
}
