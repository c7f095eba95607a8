//! Metric snapshots and the aggregation that produces them

pub mod aggregator;
pub mod snapshot;

pub use aggregator::{aggregate, refresh_snapshot, AggregationWorker, GenerationLog};
pub use snapshot::{MetricSnapshot, METRIC_NAMES};
