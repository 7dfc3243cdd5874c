// Storage seam for the aggregation tiers. The SQLite backend lives in `sqlite`.

pub mod condition;
pub mod schema;
mod sqlite;

pub use condition::{Condition, TimeRange};
pub use sqlite::SqliteMetricStore;

use crate::models::{
    MetricClusterAggregate, MetricHostAggregate, TimelineClusterMetric, TimelineHostMetric,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// One row of any metric table. Columns a table does not carry stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRow {
    pub metric_name: Option<String>,
    pub app_id: Option<String>,
    pub instance_id: Option<String>,
    pub hostname: Option<String>,
    pub server_time: Option<i64>,
    pub start_time: Option<i64>,
    pub units: Option<String>,
    pub metric_type: Option<String>,
    /// JSON object of sample time -> value (precision table only).
    pub metrics: Option<String>,
    pub metric_sum: Option<f64>,
    pub metric_max: Option<f64>,
    pub metric_min: Option<f64>,
    pub metric_count: Option<i64>,
    pub hosts_count: Option<i64>,
}

/// Result of a windowed query: the rows read, or the rows touched by a mutating statement.
#[derive(Debug, Default)]
pub struct RowCursor {
    pub rows: Vec<MetricRow>,
    pub rows_affected: u64,
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn execute_windowed_query(&self, condition: &Condition) -> anyhow::Result<RowCursor>;

    async fn save_host_aggregates(
        &self,
        aggregates: &HashMap<TimelineHostMetric, MetricHostAggregate>,
        table: &'static str,
    ) -> anyhow::Result<()>;

    async fn save_cluster_aggregates(
        &self,
        aggregates: &HashMap<TimelineClusterMetric, MetricClusterAggregate>,
        table: &'static str,
    ) -> anyhow::Result<()>;

    async fn save_cluster_time_aggregates(
        &self,
        aggregates: &HashMap<TimelineClusterMetric, MetricHostAggregate>,
        table: &'static str,
    ) -> anyhow::Result<()>;
}
