// Cluster minute/hourly/daily tiers: roll the finer cluster table into slices of the tier interval.

use super::downsampler::EventDownsampler;
use super::time_slicer::{
    SliceBoundary, TimeSlice, average_into_slices, slice_for, sum_into_slices, time_slices,
};
use super::{AggregationOutcome, AggregationStrategy, AggregatorTier, Window, read_helper};
use crate::models::{
    AggregateStats, MetricClusterAggregate, MetricHostAggregate, TimelineClusterMetric,
};
use crate::store::{Condition, MetricRow, TimeRange};
use std::collections::HashMap;

const CLUSTER_ORDER_BY: [&str; 4] = ["METRIC_NAME", "APP_ID", "INSTANCE_ID", "SERVER_TIME"];

pub struct ClusterTimeStrategy {
    tier: AggregatorTier,
    fetch_size: usize,
    skip_patterns: Vec<String>,
    events: Vec<EventDownsampler>,
}

impl ClusterTimeStrategy {
    pub fn new(
        tier: AggregatorTier,
        fetch_size: usize,
        skip_patterns: Vec<String>,
        events: Vec<EventDownsampler>,
    ) -> Self {
        Self {
            tier,
            fetch_size,
            skip_patterns,
            events,
        }
    }

    fn is_event(&self, metric_name: &str) -> bool {
        self.events.iter().any(|e| e.matches(metric_name))
    }
}

impl AggregationStrategy for ClusterTimeStrategy {
    fn prepare_query(&self, window: &Window) -> Condition {
        Condition::new(
            self.tier.input_table(),
            window.start,
            window.end,
            TimeRange::HalfOpen,
        )
        .order_by(&CLUSTER_ORDER_BY)
        .fetch_size(self.fetch_size)
        .exclude_metrics(&self.skip_patterns)
        .no_limit()
    }

    fn aggregate(
        &mut self,
        rows: Vec<MetricRow>,
        window: &Window,
    ) -> anyhow::Result<AggregationOutcome> {
        let slices = time_slices(window.start, window.end, window.end - window.start);
        let mut out = HashMap::new();

        let mut series: Vec<(TimelineClusterMetric, MetricClusterAggregate)> = Vec::new();
        for row in &rows {
            let key = read_helper::cluster_metric(row);
            if series
                .first()
                .is_some_and(|(first, _)| !first.equals_except_time(&key))
            {
                self.fold_series(&series, &slices, &mut out);
                series.clear();
            }
            series.push((key, read_helper::cluster_time_aggregate(row)));
        }
        if !series.is_empty() {
            self.fold_series(&series, &slices, &mut out);
        }
        Ok(AggregationOutcome::ClusterTimeAggregates(out))
    }
}

impl ClusterTimeStrategy {
    /// One series' rows -> one aggregate per touched slice: mean sum (or total for
    /// event metrics), mean host count, extreme max/min.
    fn fold_series(
        &self,
        series: &[(TimelineClusterMetric, MetricClusterAggregate)],
        slices: &[TimeSlice],
        out: &mut HashMap<TimelineClusterMetric, MetricHostAggregate>,
    ) {
        let Some((first, _)) = series.first() else {
            return;
        };
        let event = self.is_event(&first.metric_name);
        let sums = sum_into_slices(series.iter().map(|(k, a)| (k.timestamp, a.sum())), slices);
        let hosts = average_into_slices(
            series
                .iter()
                .map(|(k, a)| (k.timestamp, a.number_of_hosts() as f64)),
            slices,
        );
        let mut extremes: HashMap<usize, MetricHostAggregate> = HashMap::new();
        for (key, agg) in series {
            if let Some(idx) = slice_for(slices, key.timestamp, SliceBoundary::HalfOpen) {
                let e = extremes.entry(idx).or_default();
                e.update_max(agg.max());
                e.update_min(agg.min());
            }
        }

        for (idx, (sum, count)) in sums {
            let value = if event { sum } else { sum / count as f64 };
            let host_count = hosts.get(&idx).copied().unwrap_or(0.0).round() as i64;
            let (max, min) = extremes
                .get(&idx)
                .map(|e| (e.max(), e.min()))
                .unwrap_or((0.0, 0.0));
            out.insert(
                first.with_timestamp(slices[idx].end),
                MetricHostAggregate::new(value, host_count, 0.0, max, min),
            );
        }
    }
}
