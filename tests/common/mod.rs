// Shared test helpers

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use timeline_aggregator::models::*;
use timeline_aggregator::store::{Condition, MetricRow, MetricStore, RowCursor, SqliteMetricStore};

pub fn metric(
    name: &str,
    app_id: &str,
    host: &str,
    server_time: i64,
    metric_type: MetricType,
    samples: &[(i64, f64)],
) -> TimelineMetric {
    TimelineMetric {
        metric_name: name.to_string(),
        app_id: app_id.to_string(),
        instance_id: None,
        hostname: host.to_string(),
        timestamp: server_time,
        start_time: Some(server_time),
        units: None,
        metric_type,
        metric_values: samples
            .iter()
            .map(|(ts, v)| (*ts, Some(*v)))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// SQLite store in a temp dir. Keep the TempDir alive for the duration of the test.
pub async fn temp_store() -> (TempDir, SqliteMetricStore) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("metrics.db");
    let store = SqliteMetricStore::connect(path.to_str().expect("utf8 path"), 2, 5760)
        .await
        .expect("connect");
    store.init().await.expect("init");
    (dir, store)
}

/// Every row of `table` (wide window, no limit).
pub async fn read_all(store: &dyn MetricStore, table: &'static str) -> Vec<MetricRow> {
    let condition = Condition::new(
        table,
        i64::MIN,
        i64::MAX,
        timeline_aggregator::store::TimeRange::HalfOpen,
    )
    .order_by(&["METRIC_NAME", "APP_ID", "SERVER_TIME"])
    .no_limit();
    store
        .execute_windowed_query(&condition)
        .await
        .expect("query")
        .rows
}

/// In-memory store: serves canned rows, records what it was asked and what it saved.
#[derive(Default)]
pub struct FakeStore {
    pub rows: Mutex<Vec<MetricRow>>,
    pub fail_queries: AtomicBool,
    pub fail_saves: AtomicBool,
    pub conditions: Mutex<Vec<Condition>>,
    pub host_saves: Mutex<Vec<HashMap<TimelineHostMetric, MetricHostAggregate>>>,
    pub cluster_saves: Mutex<Vec<HashMap<TimelineClusterMetric, MetricClusterAggregate>>>,
    pub cluster_time_saves: Mutex<Vec<HashMap<TimelineClusterMetric, MetricHostAggregate>>>,
}

impl FakeStore {
    pub fn set_failing(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn set_failing_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn check_save(&self) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("simulated write failure");
        }
        Ok(())
    }

    pub fn query_count(&self) -> usize {
        self.conditions.lock().unwrap().len()
    }

    pub fn last_condition(&self) -> Option<Condition> {
        self.conditions.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MetricStore for FakeStore {
    async fn execute_windowed_query(&self, condition: &Condition) -> anyhow::Result<RowCursor> {
        self.conditions.lock().unwrap().push(condition.clone());
        if self.fail_queries.load(Ordering::SeqCst) {
            anyhow::bail!("simulated storage failure");
        }
        let rows = self.rows.lock().unwrap().clone();
        Ok(RowCursor {
            rows_affected: rows.len() as u64,
            rows,
        })
    }

    async fn save_host_aggregates(
        &self,
        aggregates: &HashMap<TimelineHostMetric, MetricHostAggregate>,
        _table: &'static str,
    ) -> anyhow::Result<()> {
        self.check_save()?;
        self.host_saves.lock().unwrap().push(aggregates.clone());
        Ok(())
    }

    async fn save_cluster_aggregates(
        &self,
        aggregates: &HashMap<TimelineClusterMetric, MetricClusterAggregate>,
        _table: &'static str,
    ) -> anyhow::Result<()> {
        self.check_save()?;
        self.cluster_saves.lock().unwrap().push(aggregates.clone());
        Ok(())
    }

    async fn save_cluster_time_aggregates(
        &self,
        aggregates: &HashMap<TimelineClusterMetric, MetricHostAggregate>,
        _table: &'static str,
    ) -> anyhow::Result<()> {
        self.check_save()?;
        self.cluster_time_saves.lock().unwrap().push(aggregates.clone());
        Ok(())
    }
}
