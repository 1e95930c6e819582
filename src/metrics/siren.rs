// Siren Federate metric definitions
//
// Read per node from the Siren Federate plugin's own node statistics.

use super::node::node_metric;
use super::{metric_name, DefinitionError, MetricDefinition, Transform};

/// Siren Federate node statistics endpoint
pub const ENDPOINT: &str = "/_siren/nodes/stats";

pub fn liveness() -> MetricDefinition {
    MetricDefinition::liveness(metric_name("siren_up"), "Current status of Siren Federate")
}

/// Off-heap memory peak and limit, plus license validity
pub fn all_metrics() -> Result<Vec<MetricDefinition>, DefinitionError> {
    Ok(vec![
        node_metric(
            &metric_name("siren_federate_memory_peak"),
            "Peak memory usage of Siren Federate off-heap storage",
            "memory.root_allocator_dump_peak_in_bytes",
        )?,
        node_metric(
            &metric_name("siren_federate_memory_limit"),
            "Memory limit of Siren Federate off-heap storage",
            "memory.root_allocator_dump_limit_in_bytes",
        )?,
        node_metric(
            &metric_name("siren_license_valid"),
            "Siren license validation status (1 if valid, 0 if invalid)",
            "license_validation.is_valid",
        )?
        .with_transform(Transform::boolean()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_license_flag_is_mapped_to_indicator() {
        let metrics = all_metrics().unwrap();
        let license = &metrics[2];
        assert_eq!(
            license.extract(&json!({"license_validation": {"is_valid": true}})),
            Ok(1.0)
        );
        assert_eq!(
            license.extract(&json!({"license_validation": {"is_valid": false}})),
            Ok(0.0)
        );
        assert!(license
            .extract(&json!({"license_validation": {"is_valid": "yes"}}))
            .is_err());
    }
}
