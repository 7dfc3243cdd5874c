// Domain models: series identities, raw host series and accumulators

mod aggregate;
mod metric;

pub use aggregate::{AggregateStats, MetricAggregate, MetricClusterAggregate, MetricHostAggregate};
pub use metric::{
    HOST_APP_ID, MetricType, TimelineClusterMetric, TimelineHostMetric, TimelineMetric,
};
