// Snapshot metric definitions
//
// Describe the most recent snapshot of one repository. The last element of
// the `snapshots` array is addressed with a negative index; an empty
// repository leaves these metrics absent instead of reporting zeros.

use super::{metric_name, DefinitionError, Descriptor, MetricDefinition, Transform};

/// Snapshot listing endpoint for `repository`
pub fn endpoint(repository: &str) -> String {
    format!("/_snapshot/{}/_all", repository)
}

pub fn liveness() -> MetricDefinition {
    MetricDefinition::liveness(
        metric_name("snapshot_up"),
        "Whether the last snapshot listing request succeeded",
    )
}

pub fn all_metrics() -> Result<Vec<MetricDefinition>, DefinitionError> {
    Ok(vec![
        MetricDefinition::new(
            "snapshots[-1].state",
            Descriptor::new(
                metric_name("snapshot_last_successful"),
                "Indicates whether the last snapshot was successful (1 for success, 0 for failure)",
            ),
        )?
        .with_transform(Transform::CategoricalEquals("SUCCESS".to_string())),
        MetricDefinition::new(
            "snapshots[-1].start_time_in_millis",
            Descriptor::new(
                metric_name("snapshot_last_start_timestamp"),
                "Unix timestamp of the last snapshot start time",
            ),
        )?
        .with_transform(Transform::divided_by(1000.0)),
        MetricDefinition::new(
            "snapshots[-1].duration_in_millis",
            Descriptor::new(
                metric_name("snapshot_last_duration_seconds"),
                "Duration in seconds of the last snapshot",
            ),
        )?
        .with_transform(Transform::divided_by(1000.0)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_snapshot_is_used() {
        let doc = json!({"snapshots": [
            {"state": "SUCCESS", "start_time_in_millis": 1000, "duration_in_millis": 500},
            {"state": "FAILED", "start_time_in_millis": 1700000000000_i64, "duration_in_millis": 1500}
        ]});
        let values: Vec<f64> = all_metrics()
            .unwrap()
            .iter()
            .map(|m| m.extract(&doc).unwrap())
            .collect();
        assert_eq!(values, vec![0.0, 1700000000.0, 1.5]);
    }

    #[test]
    fn test_empty_repository_is_not_found() {
        let doc = json!({"snapshots": []});
        assert!(all_metrics()
            .unwrap()
            .iter()
            .all(|m| m.extract(&doc).is_err()));
        assert_eq!(endpoint("nightly"), "/_snapshot/nightly/_all");
    }
}
