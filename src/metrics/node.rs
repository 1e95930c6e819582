// Node statistics metric definitions
//
// Evaluated once per node by the timer-driven scraper against
// `/_nodes/stats`. Every definition declares a single `node` label whose
// value is derived from the node's own document at scrape time.

use super::{metric_name, DefinitionError, Descriptor, MetricDefinition};

/// Node statistics endpoint, relative to the cluster URL
pub const ENDPOINT: &str = "/_nodes/stats";

/// Name of the label identifying the originating node
pub const NODE_LABEL: &str = "node";

/// Thread pools exported by default
pub const THREAD_POOLS: [&str; 6] = ["search", "write", "get", "refresh", "flush", "management"];

const THREAD_POOL_FIELDS: [&str; 6] = ["threads", "queue", "active", "rejected", "largest", "completed"];

/// Operations exported as a `_total` / `_time_in_millis` pair
pub const TIMED_OPERATIONS: [&str; 5] = [
    "indices.search.query",
    "indices.search.fetch",
    "indices.search.scroll",
    "indices.indexing.index",
    "indices.indexing.delete",
];

/// Liveness indicator of the node stats scraper
pub fn liveness() -> MetricDefinition {
    MetricDefinition::liveness(metric_name("up"), "Current status of ES")
}

/// Builds a per-node definition with the `node` label schema
pub fn node_metric(name: &str, help: &str, path: &str) -> Result<MetricDefinition, DefinitionError> {
    MetricDefinition::new(
        path,
        Descriptor::new(name, help).with_label_names([NODE_LABEL]),
    )
}

/// Turns a path into a metric name: `indices.get.total` -> `es_indices_get_total`
pub fn raw_metric_name(path: &str) -> String {
    let sanitized: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    metric_name(&sanitized)
}

/// A metric named after its own path, with the path as help text
pub fn raw_metric(path: &str) -> Result<MetricDefinition, DefinitionError> {
    node_metric(&raw_metric_name(path), path, path)
}

/// `<op>_total` and `<op>_time_in_millis` for one operation
pub fn total_and_millis_metrics(op: &str) -> Result<Vec<MetricDefinition>, DefinitionError> {
    Ok(vec![
        raw_metric(&format!("{}_total", op))?,
        raw_metric(&format!("{}_time_in_millis", op))?,
    ])
}

/// Counters of one thread pool
pub fn thread_pool_metrics(pool: &str) -> Result<Vec<MetricDefinition>, DefinitionError> {
    THREAD_POOL_FIELDS
        .iter()
        .map(|field| {
            node_metric(
                &metric_name(&format!("thread_pool_{}_{}", pool, field)),
                "See thread_pool ES doc",
                &format!("thread_pool.{}.{}", pool, field),
            )
        })
        .collect()
}

/// Thread pools, timed operations and recovery throttling
pub fn default_metrics() -> Result<Vec<MetricDefinition>, DefinitionError> {
    let mut metrics = Vec::new();
    for pool in THREAD_POOLS {
        metrics.extend(thread_pool_metrics(pool)?);
    }
    for op in TIMED_OPERATIONS {
        metrics.extend(total_and_millis_metrics(op)?);
    }
    metrics.push(raw_metric("indices.recovery.throttle_time_in_millis")?);
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_metric_naming() {
        let metric = raw_metric("indices.recovery.throttle_time_in_millis").unwrap();
        assert_eq!(metric.name(), "es_indices_recovery_throttle_time_in_millis");
        assert_eq!(metric.descriptor().help(), "indices.recovery.throttle_time_in_millis");
        assert_eq!(metric.descriptor().label_names(), ["node".to_string()]);
        assert_eq!(raw_metric_name("fs.data[0].\"Free\""), "es_fs_data_0___free_");
    }

    #[test]
    fn test_total_and_millis_pair() {
        let names: Vec<String> = total_and_millis_metrics("indices.search.query")
            .unwrap()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "es_indices_search_query_total",
                "es_indices_search_query_time_in_millis"
            ]
        );
    }

    #[test]
    fn test_thread_pool_paths() {
        let metrics = thread_pool_metrics("search").unwrap();
        assert_eq!(metrics.len(), 6);
        assert_eq!(metrics[1].name(), "es_thread_pool_search_queue");
        assert_eq!(metrics[1].path(), Some("thread_pool.search.queue"));
    }

    #[test]
    fn test_invalid_raw_path_fails() {
        assert!(raw_metric("indices..get").is_err());
    }
}
