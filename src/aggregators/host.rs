// Host tiers: per-host rollup of the finer table over one window.

use super::downsampler::TopNDownsampler;
use super::{AggregationOutcome, AggregationStrategy, AggregatorTier, Window, read_helper};
use crate::models::{MetricHostAggregate, TimelineHostMetric};
use crate::store::{Condition, MetricRow, TimeRange};
use std::collections::HashMap;

pub const HOST_ORDER_BY: [&str; 5] = [
    "METRIC_NAME",
    "HOSTNAME",
    "APP_ID",
    "INSTANCE_ID",
    "SERVER_TIME",
];

pub struct HostAggregationStrategy {
    tier: AggregatorTier,
    fetch_size: usize,
    skip_patterns: Vec<String>,
    use_group_by: bool,
    top_n: Vec<TopNDownsampler>,
}

impl HostAggregationStrategy {
    pub fn new(
        tier: AggregatorTier,
        fetch_size: usize,
        skip_patterns: Vec<String>,
        use_group_by: bool,
        top_n: Vec<TopNDownsampler>,
    ) -> Self {
        Self {
            tier,
            fetch_size,
            skip_patterns,
            use_group_by,
            top_n,
        }
    }
}

impl AggregationStrategy for HostAggregationStrategy {
    fn prepare_query(&self, window: &Window) -> Condition {
        let condition = Condition::new(
            self.tier.input_table(),
            window.start,
            window.end,
            TimeRange::HalfOpen,
        )
        .order_by(&HOST_ORDER_BY)
        .fetch_size(self.fetch_size)
        .exclude_metrics(&self.skip_patterns)
        .no_limit();
        if self.use_group_by {
            condition.update_into(self.tier.output_table())
        } else {
            condition
        }
    }

    fn aggregate(
        &mut self,
        rows: Vec<MetricRow>,
        window: &Window,
    ) -> anyhow::Result<AggregationOutcome> {
        let mut aggregates = aggregate_host_rows(&rows, window.end);
        for d in &self.top_n {
            d.apply(&mut aggregates);
        }
        Ok(AggregationOutcome::HostAggregates(aggregates))
    }
}

/// Single pass over rows sorted by host series; each series folds into one aggregate
/// stamped with `end`.
pub fn aggregate_host_rows(
    rows: &[MetricRow],
    end: i64,
) -> HashMap<TimelineHostMetric, MetricHostAggregate> {
    let mut out = HashMap::new();
    let mut current: Option<(TimelineHostMetric, MetricHostAggregate)> = None;
    for row in rows {
        let key = read_helper::host_metric(row).with_timestamp(end);
        let agg = read_helper::host_aggregate(row);
        if let Some((open, acc)) = current.as_mut()
            && open.equals_except_time(&key)
        {
            acc.update_aggregates(&agg);
            continue;
        }
        if let Some((k, a)) = current.replace((key, agg)) {
            out.insert(k, a);
        }
    }
    if let Some((k, a)) = current {
        out.insert(k, a);
    }
    out
}
