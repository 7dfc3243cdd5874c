// Per-app cluster rollups derived from HOST metrics, using host -> app membership
// learned in earlier cycles.

use crate::models::{HOST_APP_ID, MetricClusterAggregate, TimelineClusterMetric};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Host -> app ids seen running there. Shared by handle; lives as long as the factory that made it.
#[derive(Debug, Clone, Default)]
pub struct HostedAppsCache {
    inner: Arc<Mutex<HashMap<String, HashSet<String>>>>,
}

impl HostedAppsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apps_for(&self, hostname: &str) -> Option<HashSet<String>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hostname)
            .cloned()
    }

    /// Returns true when the pairing was new.
    pub fn record(&self, hostname: &str, app_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(hostname.to_string())
            .or_default()
            .insert(app_id.to_string())
    }

    pub fn host_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct TimelineMetricAppAggregator {
    app_ids: HashSet<String>,
    cache: HostedAppsCache,
    aggregates: HashMap<TimelineClusterMetric, MetricClusterAggregate>,
}

impl TimelineMetricAppAggregator {
    pub fn new(app_ids: impl IntoIterator<Item = String>, cache: HostedAppsCache) -> Self {
        Self {
            app_ids: app_ids.into_iter().collect(),
            cache,
            aggregates: HashMap::new(),
        }
    }

    /// Open a cycle. The guard holds the aggregator exclusively until `cleanup` or drop.
    pub fn init(&mut self) -> AppAggregationCycle<'_> {
        self.aggregates.clear();
        AppAggregationCycle { aggregator: self }
    }
}

pub struct AppAggregationCycle<'a> {
    aggregator: &'a mut TimelineMetricAppAggregator,
}

impl AppAggregationCycle<'_> {
    /// Feed one host's slice value. HOST metrics fold into every app known on that host;
    /// candidate app metrics only teach the cache which host runs them.
    pub fn process_timeline_cluster_metric(
        &mut self,
        metric: &TimelineClusterMetric,
        hostname: &str,
        value: f64,
    ) {
        let agg = &mut *self.aggregator;
        if metric.app_id == HOST_APP_ID {
            let Some(apps) = agg.cache.apps_for(hostname) else {
                return;
            };
            for app in apps {
                let key = TimelineClusterMetric {
                    app_id: app,
                    ..metric.clone()
                };
                agg.aggregates
                    .entry(key)
                    .and_modify(|a| a.add_host_value(value))
                    .or_insert_with(|| MetricClusterAggregate::from_value(value));
            }
        } else if agg.app_ids.contains(&metric.app_id) && agg.cache.record(hostname, &metric.app_id)
        {
            debug!(host = hostname, app = %metric.app_id, "learned hosted app");
        }
    }

    pub fn aggregate_cluster_metrics(&self) -> &HashMap<TimelineClusterMetric, MetricClusterAggregate> {
        &self.aggregator.aggregates
    }

    /// Close the cycle and hand back the per-app aggregates.
    pub fn cleanup(mut self) -> HashMap<TimelineClusterMetric, MetricClusterAggregate> {
        std::mem::take(&mut self.aggregator.aggregates)
    }
}

impl Drop for AppAggregationCycle<'_> {
    fn drop(&mut self) {
        self.aggregator.aggregates.clear();
    }
}
