// MetricRow -> domain types. Missing numeric columns read as 0.

use crate::models::{
    MetricClusterAggregate, MetricHostAggregate, MetricType, TimelineClusterMetric,
    TimelineHostMetric, TimelineMetric,
};
use crate::store::MetricRow;
use std::collections::BTreeMap;
use tracing::warn;

pub fn timeline_metric(row: &MetricRow) -> TimelineMetric {
    let metric_values = row
        .metrics
        .as_deref()
        .map(|json| decode_values(json, row))
        .unwrap_or_default();
    TimelineMetric {
        metric_name: row.metric_name.clone().unwrap_or_default(),
        app_id: row.app_id.clone().unwrap_or_default(),
        instance_id: row.instance_id.clone(),
        hostname: row.hostname.clone().unwrap_or_default(),
        timestamp: row.server_time.unwrap_or(0),
        start_time: row.start_time,
        units: row.units.clone(),
        metric_type: MetricType::from_column(row.metric_type.as_deref()),
        metric_values,
    }
}

fn decode_values(json: &str, row: &MetricRow) -> BTreeMap<i64, Option<f64>> {
    match serde_json::from_str(json) {
        Ok(values) => values,
        Err(e) => {
            warn!(
                metric = row.metric_name.as_deref().unwrap_or(""),
                host = row.hostname.as_deref().unwrap_or(""),
                error = %e,
                "undecodable metric values, treating as empty"
            );
            BTreeMap::new()
        }
    }
}

pub fn cluster_metric(row: &MetricRow) -> TimelineClusterMetric {
    TimelineClusterMetric {
        metric_name: row.metric_name.clone().unwrap_or_default(),
        app_id: row.app_id.clone().unwrap_or_default(),
        instance_id: row.instance_id.clone(),
        timestamp: row.server_time.unwrap_or(0),
    }
}

pub fn host_metric(row: &MetricRow) -> TimelineHostMetric {
    TimelineHostMetric {
        metric_name: row.metric_name.clone().unwrap_or_default(),
        hostname: row.hostname.clone().unwrap_or_default(),
        app_id: row.app_id.clone().unwrap_or_default(),
        instance_id: row.instance_id.clone(),
        timestamp: row.server_time.unwrap_or(0),
    }
}

/// Host aggregate from a precision or host aggregate row.
pub fn host_aggregate(row: &MetricRow) -> MetricHostAggregate {
    MetricHostAggregate::new(
        row.metric_sum.unwrap_or(0.0),
        row.metric_count.unwrap_or(0),
        0.0,
        row.metric_max.unwrap_or(0.0),
        row.metric_min.unwrap_or(0.0),
    )
}

/// Cluster aggregate from a cluster-second row (`HOSTS_COUNT`).
pub fn cluster_aggregate(row: &MetricRow) -> MetricClusterAggregate {
    MetricClusterAggregate::new(
        row.metric_sum.unwrap_or(0.0),
        row.hosts_count.unwrap_or(0) as i32,
        0.0,
        row.metric_max.unwrap_or(0.0),
        row.metric_min.unwrap_or(0.0),
    )
}

/// Cluster aggregate from a cluster-time row, where `METRIC_COUNT` carries the host count.
/// Second-tier rows carry `HOSTS_COUNT` instead; either is accepted.
pub fn cluster_time_aggregate(row: &MetricRow) -> MetricClusterAggregate {
    MetricClusterAggregate::new(
        row.metric_sum.unwrap_or(0.0),
        row.hosts_count.or(row.metric_count).unwrap_or(0) as i32,
        0.0,
        row.metric_max.unwrap_or(0.0),
        row.metric_min.unwrap_or(0.0),
    )
}
