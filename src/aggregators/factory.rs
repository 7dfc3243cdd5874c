// Builds the seven tier runners from configuration.

use super::app_aggregator::{HostedAppsCache, TimelineMetricAppAggregator};
use super::cluster_second::ClusterSecondStrategy;
use super::cluster_time::ClusterTimeStrategy;
use super::downsampler::{Downsampler, EventDownsampler, TopNDownsampler, parse_downsamplers};
use super::host::HostAggregationStrategy;
use super::runner::{TierSettings, TimelineAggregator};
use super::{AggregationStrategy, AggregatorTier};
use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::store::MetricStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct AggregatorFactory {
    config: AppConfig,
    store: Arc<dyn MetricStore>,
    clock: Arc<dyn Clock>,
    hosted_apps: HostedAppsCache,
    downsamplers: Vec<Downsampler>,
}

impl AggregatorFactory {
    pub fn new(config: &AppConfig, store: Arc<dyn MetricStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: config.clone(),
            store,
            clock,
            hosted_apps: HostedAppsCache::new(),
            downsamplers: parse_downsamplers(&config.downsamplers),
        }
    }

    pub fn hosted_apps(&self) -> &HostedAppsCache {
        &self.hosted_apps
    }

    pub fn downsamplers(&self) -> &[Downsampler] {
        &self.downsamplers
    }

    pub fn settings(&self, tier: AggregatorTier) -> TierSettings {
        let tiers = &self.config.tiers;
        TierSettings {
            tier,
            sleep_interval_ms: (tiers.sleep_interval_secs(tier) * 1000) as i64,
            checkpoint_cutoff_multiplier: tiers.checkpoint_cutoff_multiplier(tier) as i64,
            disabled: tiers.get(tier).disabled,
            query_timeout: Duration::from_secs(self.config.database.query_timeout_secs),
        }
    }

    fn top_n(&self) -> Vec<TopNDownsampler> {
        self.downsamplers
            .iter()
            .filter_map(|d| match d {
                Downsampler::TopN(t) => Some(t.clone()),
                Downsampler::Event(_) => None,
            })
            .collect()
    }

    fn events(&self) -> Vec<EventDownsampler> {
        self.downsamplers
            .iter()
            .filter_map(|d| match d {
                Downsampler::Event(e) => Some(e.clone()),
                Downsampler::TopN(_) => None,
            })
            .collect()
    }

    fn strategy(&self, tier: AggregatorTier) -> Box<dyn AggregationStrategy> {
        let agg = &self.config.aggregation;
        let fetch_size = self.config.database.result_fetch_size;
        let skip = agg.skip_metric_patterns.clone();
        match tier {
            AggregatorTier::HostMinute | AggregatorTier::HostHourly | AggregatorTier::HostDaily => {
                Box::new(HostAggregationStrategy::new(
                    tier,
                    fetch_size,
                    skip,
                    agg.use_group_by_aggregators,
                    self.top_n(),
                ))
            }
            AggregatorTier::ClusterSecond => Box::new(ClusterSecondStrategy::new(
                (self.config.tiers.timeslice_interval_secs() * 1000) as i64,
                agg.time_shift_adjustment_ms,
                agg.interpolation_enabled,
                fetch_size,
                skip,
                TimelineMetricAppAggregator::new(agg.app_ids.clone(), self.hosted_apps.clone()),
            )),
            AggregatorTier::ClusterMinute
            | AggregatorTier::ClusterHourly
            | AggregatorTier::ClusterDaily => Box::new(ClusterTimeStrategy::new(
                tier,
                fetch_size,
                skip,
                self.events(),
            )),
        }
    }

    pub fn create(&self, tier: AggregatorTier) -> TimelineAggregator {
        let checkpoint = CheckpointStore::new(
            Path::new(&self.config.aggregation.checkpoint_dir).join(tier.checkpoint_file()),
        );
        TimelineAggregator::new(
            self.settings(tier),
            checkpoint,
            self.clock.clone(),
            self.store.clone(),
            self.strategy(tier),
        )
    }

    pub fn create_all(&self) -> Vec<TimelineAggregator> {
        AggregatorTier::ALL.iter().map(|t| self.create(*t)).collect()
    }
}
