// Cluster second tier: slice raw host series, then fold slice values across hosts.

use super::app_aggregator::{AppAggregationCycle, TimelineMetricAppAggregator};
use super::time_slicer::{TimeSlice, slice_timeline_metric, time_slices};
use super::{AggregationOutcome, AggregationStrategy, AggregatorTier, Window, read_helper};
use crate::models::{MetricClusterAggregate, TimelineClusterMetric, TimelineMetric};
use crate::store::{Condition, MetricRow, TimeRange};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const LIVE_HOSTS_METRIC: &str = "live_hosts";

const CLUSTER_SECOND_ORDER_BY: [&str; 5] = [
    "METRIC_NAME",
    "HOSTNAME",
    "APP_ID",
    "INSTANCE_ID",
    "SERVER_TIME",
];

pub struct ClusterSecondStrategy {
    slice_interval_ms: i64,
    time_shift_adjustment_ms: i64,
    interpolation_enabled: bool,
    fetch_size: usize,
    skip_patterns: Vec<String>,
    app_aggregator: TimelineMetricAppAggregator,
}

impl ClusterSecondStrategy {
    pub fn new(
        slice_interval_ms: i64,
        time_shift_adjustment_ms: i64,
        interpolation_enabled: bool,
        fetch_size: usize,
        skip_patterns: Vec<String>,
        app_aggregator: TimelineMetricAppAggregator,
    ) -> Self {
        Self {
            slice_interval_ms,
            time_shift_adjustment_ms,
            interpolation_enabled,
            fetch_size,
            skip_patterns,
            app_aggregator,
        }
    }

    fn slices(&self, window: &Window) -> Vec<TimeSlice> {
        time_slices(
            window.start - self.time_shift_adjustment_ms,
            window.end,
            self.slice_interval_ms,
        )
    }
}

impl AggregationStrategy for ClusterSecondStrategy {
    fn prepare_query(&self, window: &Window) -> Condition {
        Condition::new(
            AggregatorTier::ClusterSecond.input_table(),
            window.start - self.time_shift_adjustment_ms,
            window.end,
            TimeRange::IntervalOpen,
        )
        .order_by(&CLUSTER_SECOND_ORDER_BY)
        .fetch_size(self.fetch_size)
        .exclude_metrics(&self.skip_patterns)
        .no_limit()
    }

    fn aggregate(
        &mut self,
        rows: Vec<MetricRow>,
        window: &Window,
    ) -> anyhow::Result<AggregationOutcome> {
        let slices = self.slices(window);
        let mut folder = SliceFolder {
            slices: &slices,
            interpolation_enabled: self.interpolation_enabled,
            aggregates: HashMap::new(),
            hosts_by_app: HashMap::new(),
        };
        let mut cycle = self.app_aggregator.init();

        let mut current: Option<TimelineMetric> = None;
        for row in &rows {
            let metric = read_helper::timeline_metric(row);
            if let Some(open) = current.as_mut()
                && open.equals_except_time(&metric)
            {
                open.add_metric_values(metric.metric_values);
                continue;
            }
            if let Some(done) = current.replace(metric) {
                folder.fold(&done, &mut cycle);
            }
        }
        if let Some(done) = current {
            folder.fold(&done, &mut cycle);
        }

        let SliceFolder {
            mut aggregates,
            hosts_by_app,
            ..
        } = folder;
        aggregates.extend(cycle.cleanup());

        if let Some(last) = slices.last() {
            for (app_id, hosts) in hosts_by_app {
                let count = hosts.len() as f64;
                aggregates.insert(
                    TimelineClusterMetric::new(LIVE_HOSTS_METRIC, app_id, None, last.end),
                    MetricClusterAggregate::new(count, 1, 0.0, count, count),
                );
            }
        }
        debug!(
            rows = rows.len(),
            aggregates = aggregates.len(),
            "cluster second aggregation"
        );
        Ok(AggregationOutcome::ClusterAggregates(aggregates))
    }
}

struct SliceFolder<'s> {
    slices: &'s [TimeSlice],
    interpolation_enabled: bool,
    aggregates: HashMap<TimelineClusterMetric, MetricClusterAggregate>,
    hosts_by_app: HashMap<String, HashSet<String>>,
}

impl SliceFolder<'_> {
    fn fold(&mut self, metric: &TimelineMetric, cycle: &mut AppAggregationCycle<'_>) {
        let sliced = slice_timeline_metric(metric, self.slices, self.interpolation_enabled);
        for (key, value) in sliced {
            cycle.process_timeline_cluster_metric(&key, &metric.hostname, value);
            self.aggregates
                .entry(key)
                .and_modify(|a| a.add_host_value(value))
                .or_insert_with(|| MetricClusterAggregate::from_value(value));
        }
        self.hosts_by_app
            .entry(metric.app_id.clone())
            .or_default()
            .insert(metric.hostname.clone());
    }
}
