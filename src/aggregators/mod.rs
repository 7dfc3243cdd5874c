// Aggregation tiers. One generic cycle runner per tier, parameterised by a strategy.

pub mod app_aggregator;
pub mod cluster_second;
pub mod cluster_time;
pub mod downsampler;
pub mod factory;
pub mod host;
pub mod read_helper;
pub mod runner;
pub mod time_slicer;

use crate::models::{
    MetricClusterAggregate, MetricHostAggregate, TimelineClusterMetric, TimelineHostMetric,
};
use crate::store::schema::*;
use crate::store::{Condition, MetricRow};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregatorTier {
    HostMinute,
    HostHourly,
    HostDaily,
    ClusterSecond,
    ClusterMinute,
    ClusterHourly,
    ClusterDaily,
}

impl AggregatorTier {
    pub const ALL: [AggregatorTier; 7] = [
        AggregatorTier::HostMinute,
        AggregatorTier::HostHourly,
        AggregatorTier::HostDaily,
        AggregatorTier::ClusterSecond,
        AggregatorTier::ClusterMinute,
        AggregatorTier::ClusterHourly,
        AggregatorTier::ClusterDaily,
    ];

    /// Config key and log name.
    pub fn name(&self) -> &'static str {
        match self {
            AggregatorTier::HostMinute => "host_minute",
            AggregatorTier::HostHourly => "host_hourly",
            AggregatorTier::HostDaily => "host_daily",
            AggregatorTier::ClusterSecond => "cluster_second",
            AggregatorTier::ClusterMinute => "cluster_minute",
            AggregatorTier::ClusterHourly => "cluster_hourly",
            AggregatorTier::ClusterDaily => "cluster_daily",
        }
    }

    pub fn checkpoint_file(&self) -> &'static str {
        match self {
            AggregatorTier::HostMinute => "timeline-metrics-host-aggregator-checkpoint",
            AggregatorTier::HostHourly => "timeline-metrics-host-aggregator-hourly-checkpoint",
            AggregatorTier::HostDaily => "timeline-metrics-host-aggregator-daily-checkpoint",
            AggregatorTier::ClusterSecond => "timeline-metrics-cluster-aggregator-checkpoint",
            AggregatorTier::ClusterMinute => "timeline-metrics-cluster-aggregator-minute-checkpoint",
            AggregatorTier::ClusterHourly => "timeline-metrics-cluster-aggregator-hourly-checkpoint",
            AggregatorTier::ClusterDaily => "timeline-metrics-cluster-aggregator-daily-checkpoint",
        }
    }

    pub fn input_table(&self) -> &'static str {
        match self {
            AggregatorTier::HostMinute => METRICS_RECORD_TABLE,
            AggregatorTier::HostHourly => METRICS_RECORD_MINUTE_TABLE,
            AggregatorTier::HostDaily => METRICS_RECORD_HOURLY_TABLE,
            AggregatorTier::ClusterSecond => METRICS_RECORD_TABLE,
            AggregatorTier::ClusterMinute => METRICS_CLUSTER_AGGREGATE_TABLE,
            AggregatorTier::ClusterHourly => METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE,
            AggregatorTier::ClusterDaily => METRICS_CLUSTER_AGGREGATE_HOURLY_TABLE,
        }
    }

    pub fn output_table(&self) -> &'static str {
        match self {
            AggregatorTier::HostMinute => METRICS_RECORD_MINUTE_TABLE,
            AggregatorTier::HostHourly => METRICS_RECORD_HOURLY_TABLE,
            AggregatorTier::HostDaily => METRICS_RECORD_DAILY_TABLE,
            AggregatorTier::ClusterSecond => METRICS_CLUSTER_AGGREGATE_TABLE,
            AggregatorTier::ClusterMinute => METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE,
            AggregatorTier::ClusterHourly => METRICS_CLUSTER_AGGREGATE_HOURLY_TABLE,
            AggregatorTier::ClusterDaily => METRICS_CLUSTER_AGGREGATE_DAILY_TABLE,
        }
    }

    pub fn default_sleep_interval_secs(&self) -> u64 {
        match self {
            AggregatorTier::HostMinute | AggregatorTier::ClusterMinute => 300,
            AggregatorTier::HostHourly | AggregatorTier::ClusterHourly => 3600,
            AggregatorTier::HostDaily | AggregatorTier::ClusterDaily => 86400,
            AggregatorTier::ClusterSecond => 120,
        }
    }

    pub fn default_checkpoint_cutoff_multiplier(&self) -> u32 {
        match self {
            AggregatorTier::HostMinute => 3,
            AggregatorTier::HostDaily | AggregatorTier::ClusterDaily => 1,
            _ => 2,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(
            self,
            AggregatorTier::HostMinute | AggregatorTier::HostHourly | AggregatorTier::HostDaily
        )
    }
}

impl fmt::Display for AggregatorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregation window `[start, end)` in ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

/// What one cycle produced, ready to be saved to the tier's output table.
#[derive(Debug)]
pub enum AggregationOutcome {
    HostAggregates(HashMap<TimelineHostMetric, MetricHostAggregate>),
    ClusterAggregates(HashMap<TimelineClusterMetric, MetricClusterAggregate>),
    ClusterTimeAggregates(HashMap<TimelineClusterMetric, MetricHostAggregate>),
    /// A group-by statement already wrote this many rows.
    Updated(u64),
}

impl AggregationOutcome {
    pub fn len(&self) -> u64 {
        match self {
            AggregationOutcome::HostAggregates(m) => m.len() as u64,
            AggregationOutcome::ClusterAggregates(m) => m.len() as u64,
            AggregationOutcome::ClusterTimeAggregates(m) => m.len() as u64,
            AggregationOutcome::Updated(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tier-specific half of a cycle: what to read and how to fold it.
pub trait AggregationStrategy: Send + Sync {
    fn prepare_query(&self, window: &Window) -> Condition;

    fn aggregate(
        &mut self,
        rows: Vec<MetricRow>,
        window: &Window,
    ) -> anyhow::Result<AggregationOutcome>;
}
