// JVM metric collector definitions
//
// Heap, memory pool and garbage collector statistics for each node,
// read from the `jvm` section of `/_nodes/stats`.

use super::node::node_metric;
use super::{metric_name, DefinitionError, MetricDefinition};

pub const HEAP_KINDS: [&str; 3] = ["used", "committed", "max"];
pub const MEMORY_POOLS: [&str; 3] = ["young", "survivor", "old"];
pub const POOL_KINDS: [&str; 2] = ["used", "max"];
pub const GC_COLLECTORS: [&str; 2] = ["young", "old"];

pub fn heap_metric(kind: &str) -> Result<MetricDefinition, DefinitionError> {
    node_metric(
        &metric_name(&format!("memory_heap_{}_bytes", kind)),
        &format!("{} heap in bytes", kind),
        &format!("jvm.mem.heap_{}_in_bytes", kind),
    )
}

pub fn memory_pool_metric(pool: &str, kind: &str) -> Result<MetricDefinition, DefinitionError> {
    node_metric(
        &metric_name(&format!("memory_pool_{}_{}_bytes", pool, kind)),
        &format!("{} memory of pool {}", kind, pool),
        &format!("jvm.mem.pools.{}.{}_in_bytes", pool, kind),
    )
}

pub fn gc_time_metric(collector: &str) -> Result<MetricDefinition, DefinitionError> {
    node_metric(
        &metric_name(&format!("gc_{}_collection_time_ms", collector)),
        &format!("Time of collections of {} GC", collector),
        &format!("jvm.gc.collectors.{}.collection_time_in_millis", collector),
    )
}

pub fn gc_count_metric(collector: &str) -> Result<MetricDefinition, DefinitionError> {
    node_metric(
        &metric_name(&format!("gc_{}_collection_count", collector)),
        &format!("Number of collections of {} GC", collector),
        &format!("jvm.gc.collectors.{}.collection_count", collector),
    )
}

/// Every JVM definition: heap, pools and collectors
pub fn all_metrics() -> Result<Vec<MetricDefinition>, DefinitionError> {
    let mut metrics = Vec::new();

    for kind in HEAP_KINDS {
        metrics.push(heap_metric(kind)?);
    }
    for pool in MEMORY_POOLS {
        for kind in POOL_KINDS {
            metrics.push(memory_pool_metric(pool, kind)?);
        }
    }
    for collector in GC_COLLECTORS {
        metrics.push(gc_time_metric(collector)?);
        metrics.push(gc_count_metric(collector)?);
    }

    Ok(metrics)
}
