// Cluster health metric definitions
//
// Evaluated by a pull-on-demand collector against `/_cluster/health`.
// The three-valued `status` field is projected into one indicator per
// color, all sharing the `es_cluster_status` name and told apart by the
// `color` label.

use super::{metric_name, DefinitionError, Descriptor, MetricDefinition, Transform};

/// Cluster health endpoint, relative to the cluster URL
pub const ENDPOINT: &str = "/_cluster/health";

/// Every value the `status` field can take
pub const STATUSES: [&str; 3] = ["green", "yellow", "red"];

// (metric suffix, document field, help)
const GAUGES: &[(&str, &str, &str)] = &[
    ("cluster_nodes", "number_of_nodes", "Number of nodes in the cluster"),
    ("cluster_data_nodes", "number_of_data_nodes", "Number of data nodes in the cluster"),
    ("cluster_pending_tasks", "number_of_pending_tasks", "Cluster-level changes not yet executed"),
    ("cluster_in_flight_fetches", "number_of_in_flight_fetch", "Unfinished shard fetches"),
    (
        "cluster_task_max_waiting_in_queue_millis",
        "task_max_waiting_in_queue_millis",
        "Time the oldest pending task has been waiting, in milliseconds",
    ),
    (
        "cluster_active_shards_percent",
        "active_shards_percent_as_number",
        "Ratio of active shards in the cluster, as a percentage",
    ),
];

// (state label value, document field)
const SHARDS: &[(&str, &str)] = &[
    ("active_primary", "active_primary_shards"),
    ("active", "active_shards"),
    ("relocating", "relocating_shards"),
    ("initializing", "initializing_shards"),
    ("unassigned", "unassigned_shards"),
    ("delayed_unassigned", "delayed_unassigned_shards"),
];

/// Liveness indicator of the cluster health collector
pub fn liveness() -> MetricDefinition {
    MetricDefinition::liveness(
        metric_name("cluster_health_up"),
        "Whether the last cluster health request succeeded",
    )
}

/// One indicator per status color, 1 for the current color and 0 otherwise
pub fn status_metrics() -> Result<Vec<MetricDefinition>, DefinitionError> {
    let descriptor = Descriptor::new(
        metric_name("cluster_status"),
        "Cluster health status, 1 for the current color",
    )
    .with_label_names(["color"]);

    STATUSES
        .iter()
        .map(|color| -> Result<MetricDefinition, DefinitionError> {
            Ok(MetricDefinition::new("status", descriptor.clone())?
                .with_label_values([*color])?
                .with_transform(Transform::CategoricalEquals(color.to_string())))
        })
        .collect()
}

/// Shard counts keyed by shard state
pub fn shard_metrics() -> Result<Vec<MetricDefinition>, DefinitionError> {
    let descriptor = Descriptor::new(metric_name("cluster_shards"), "Number of shards by state")
        .with_label_names(["state"]);

    SHARDS
        .iter()
        .map(|(state, field)| {
            MetricDefinition::new(field, descriptor.clone())?.with_label_values([*state])
        })
        .collect()
}

/// All cluster health definitions, liveness excluded
pub fn all_metrics() -> Result<Vec<MetricDefinition>, DefinitionError> {
    let mut metrics = status_metrics()?;
    metrics.extend(shard_metrics()?);
    for (name, field, help) in GAUGES {
        metrics.push(MetricDefinition::new(
            field,
            Descriptor::new(metric_name(name), *help),
        )?);
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_indicators() {
        let doc = json!({"status": "red"});
        let values: Vec<f64> = status_metrics()
            .unwrap()
            .iter()
            .map(|m| m.extract(&doc).unwrap())
            .collect();
        assert_eq!(values, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_catalog_builds_with_unique_identities() {
        let metrics = all_metrics().unwrap();
        assert_eq!(metrics.len(), STATUSES.len() + SHARDS.len() + GAUGES.len());

        let mut identities: Vec<(String, Vec<String>)> = metrics
            .iter()
            .map(|m| (m.name().to_string(), m.label_values().to_vec()))
            .collect();
        identities.sort();
        identities.dedup();
        assert_eq!(identities.len(), metrics.len());
        assert!(metrics.iter().all(|m| m.name().starts_with("es_")));
    }
}
