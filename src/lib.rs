// Elasticsearch Exporter - library crate
//
// Turns Elasticsearch JSON statistics into Prometheus gauges. Two
// collection strategies share the same metric definitions:
// - DocumentCollector: fetches one document on every exposition request
// - NodeStatsScraper: fetches node statistics on a timer and keeps gauges
//   labelled by each node's own host name
//
// The binary in main.rs wires configuration, sources, collectors, the
// scheduler and the HTTP server together.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod metrics;
pub mod node_stats;
pub mod path;
pub mod scheduler;
pub mod source;
