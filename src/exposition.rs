// Exposition module - serves the OpenMetrics text endpoint
//
// This module is responsible for:
// 1. Owning every collector and scraper explicitly (no global registry)
// 2. Rejecting metric names published by more than one source at startup
// 3. Rendering one text exposition per request: pull-on-demand collectors
//    fetch fresh documents, timer-driven gauges are read as they are
// 4. Exposing the axum router for the HTTP server

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::future::join_all;
use prometheus_client::collector::Collector;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::DescriptorEncoder;
use prometheus_client::metrics::MetricType;
use prometheus_client::registry::Registry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::collector::DocumentCollector;
use crate::metrics::{Descriptor, Observation};
use crate::node_stats::NodeStatsScraper;

/// Content type of the rendered exposition
pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Errors raised while assembling the exporter at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("metric '{name}' is published by both '{first}' and '{second}'")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },
}

/// Every metric source served by the exposition endpoint
#[derive(Debug, Default)]
pub struct ExporterRegistry {
    collectors: Vec<Arc<DocumentCollector>>,
    descriptors: Vec<Descriptor>,
    scrapers: Vec<Arc<NodeStatsScraper>>,
    owners: HashMap<String, String>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pull-on-demand collector
    ///
    /// This enumerates the collector's descriptors, which closes it to
    /// further `add_metric` calls.
    ///
    /// # Errors
    /// `RegistryError::DuplicateName` when one of its names is already taken.
    pub fn register_collector(
        &mut self,
        collector: Arc<DocumentCollector>,
    ) -> Result<(), RegistryError> {
        let descriptors = collector.describe();
        self.claim(collector.name(), &descriptors)?;

        info!(
            "Registered collector '{}' with {} metric(s)",
            collector.name(),
            descriptors.len()
        );
        self.descriptors.extend(descriptors);
        self.collectors.push(collector);
        Ok(())
    }

    /// Registers a timer-driven scraper
    ///
    /// # Errors
    /// `RegistryError::DuplicateName` when one of its names is already taken.
    pub fn register_scraper(&mut self, scraper: Arc<NodeStatsScraper>) -> Result<(), RegistryError> {
        let descriptors = scraper.describe();
        self.claim(scraper.name(), &descriptors)?;

        info!(
            "Registered scraper '{}' with {} metric(s)",
            scraper.name(),
            descriptors.len()
        );
        self.scrapers.push(scraper);
        Ok(())
    }

    // Checks every name first so a rejected source leaves no partial claim behind
    fn claim(&mut self, owner: &str, descriptors: &[Descriptor]) -> Result<(), RegistryError> {
        let mut claimed: HashMap<&str, &str> = HashMap::new();
        for descriptor in descriptors {
            let name = descriptor.name();
            let first = self
                .owners
                .get(name)
                .map(String::as_str)
                .or_else(|| claimed.get(name).copied());
            if let Some(first) = first {
                return Err(RegistryError::DuplicateName {
                    name: name.to_string(),
                    first: first.to_string(),
                    second: owner.to_string(),
                });
            }
            claimed.insert(name, owner);
        }

        for descriptor in descriptors {
            self.owners
                .insert(descriptor.name().to_string(), owner.to_string());
        }
        Ok(())
    }

    /// Renders the full exposition for one request
    ///
    /// Every collector fetches concurrently; a failing collector only
    /// reports its own liveness as 0.
    pub async fn render(&self) -> Result<String, fmt::Error> {
        let passes = join_all(self.collectors.iter().map(|c| c.collect())).await;
        let observations: Vec<Observation> = passes.into_iter().flatten().collect();
        debug!("Collected {} observation(s) on demand", observations.len());

        let mut registry = Registry::default();
        for scraper in &self.scrapers {
            scraper.register(&mut registry);
        }
        registry.register_collector(Box::new(ObservationSet {
            descriptors: self.descriptors.clone(),
            observations,
        }));

        let mut body = String::new();
        encode(&mut body, &registry)?;
        Ok(body)
    }
}

/// Observations of one request, encoded as constant gauges
#[derive(Debug)]
struct ObservationSet {
    descriptors: Vec<Descriptor>,
    observations: Vec<Observation>,
}

impl Collector for ObservationSet {
    fn encode(&self, mut encoder: DescriptorEncoder) -> Result<(), fmt::Error> {
        for descriptor in &self.descriptors {
            let samples: Vec<&Observation> = self
                .observations
                .iter()
                .filter(|o| o.name() == descriptor.name())
                .collect();

            let mut metric_encoder = encoder.encode_descriptor(
                descriptor.name(),
                descriptor.help(),
                None,
                MetricType::Gauge,
            )?;

            // an empty label set would still render as `name{}`
            if descriptor.label_names().is_empty() {
                if let Some(sample) = samples.first() {
                    metric_encoder.encode_gauge(&sample.value())?;
                }
                continue;
            }

            for sample in samples {
                let labels = sample.labels();
                metric_encoder
                    .encode_family(&labels)?
                    .encode_gauge(&sample.value())?;
            }
        }
        Ok(())
    }
}

/// Builds the exposition router
pub fn router(registry: Arc<ExporterRegistry>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(serve_metrics))
        .with_state(registry)
}

async fn index() -> &'static str {
    "Elasticsearch exporter. Metrics are served at /metrics\n"
}

async fn serve_metrics(State(registry): State<Arc<ExporterRegistry>>) -> Response {
    match registry.render().await {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
