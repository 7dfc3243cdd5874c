// SQLite metric store. Pooled, WAL journal; every save is one transaction of INSERT OR REPLACE.

use super::schema::{self, METRICS_RECORD_TABLE};
use super::{Condition, MetricRow, MetricStore, RowCursor};
use crate::models::{
    AggregateStats, MetricClusterAggregate, MetricHostAggregate, TimelineClusterMetric,
    TimelineHostMetric, TimelineMetric,
};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, instrument};

pub struct SqliteMetricStore {
    pool: SqlitePool,
    result_limit: usize,
}

impl SqliteMetricStore {
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        result_limit: usize,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size.max(1))
            .connect_with(opts)
            .await?;
        Ok(Self { pool, result_limit })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        schema::create_tables(&self.pool).await
    }

    /// Write raw host series into the precision table, deriving the row's sum/count/max/min.
    #[instrument(skip(self, metrics), fields(repo = "metrics", operation = "insert_metric_records", count = metrics.len()))]
    pub async fn insert_metric_records(&self, metrics: &[TimelineMetric]) -> anyhow::Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for m in metrics {
            let mut agg = MetricHostAggregate::default();
            let mut count = 0i64;
            for (_, v) in m.present_values() {
                agg.update_sum(v);
                agg.update_max(v);
                agg.update_min(v);
                count += 1;
            }
            let json = serde_json::to_string(&m.metric_values)?;
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO {METRICS_RECORD_TABLE} \
                 (METRIC_NAME, HOSTNAME, SERVER_TIME, APP_ID, INSTANCE_ID, START_TIME, UNITS, \
                 METRIC_TYPE, METRIC_SUM, METRIC_COUNT, METRIC_MAX, METRIC_MIN, METRICS) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
            ))
            .bind(&m.metric_name)
            .bind(&m.hostname)
            .bind(m.timestamp)
            .bind(&m.app_id)
            .bind(m.instance_id.as_deref().unwrap_or(""))
            .bind(m.start_time)
            .bind(m.units.as_deref())
            .bind(m.metric_type.as_str())
            .bind(agg.sum())
            .bind(count)
            .bind(agg.max())
            .bind(agg.min())
            .bind(&json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete rows older than `cutoff` (ms) from one table.
    #[instrument(skip(self), fields(repo = "metrics", operation = "prune_table"))]
    pub async fn prune_table(&self, table: &'static str, cutoff: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE SERVER_TIME < $1"))
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(repo = "metrics", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    async fn read_pages(&self, condition: &Condition) -> anyhow::Result<Vec<MetricRow>> {
        let page = condition.fetch_size.map(|s| s.max(1) as i64);
        let cap = (!condition.no_limit).then_some(self.result_limit as i64);
        let mut rows = Vec::new();
        let mut offset = 0i64;
        loop {
            let limit = match (page, cap) {
                (Some(p), Some(c)) => Some(p.min(c - offset)),
                (Some(p), None) => Some(p),
                (None, Some(c)) => Some(c - offset),
                (None, None) => None,
            };
            if limit.is_some_and(|l| l <= 0) {
                debug!(table = condition.table, limit = self.result_limit, "result limit reached");
                break;
            }
            let mut qb = condition.select_query(limit, offset);
            let fetched = qb.build().fetch_all(&self.pool).await?;
            let n = fetched.len() as i64;
            rows.extend(fetched.iter().map(parse_row));
            offset += n;
            match limit {
                Some(l) if n == l => continue,
                _ => break,
            }
        }
        Ok(rows)
    }
}

fn opt<'r, T>(row: &'r SqliteRow, column: &str) -> Option<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<Option<T>, _>(column).ok().flatten()
}

fn parse_row(row: &SqliteRow) -> MetricRow {
    MetricRow {
        metric_name: opt(row, "METRIC_NAME"),
        app_id: opt(row, "APP_ID"),
        instance_id: opt::<String>(row, "INSTANCE_ID").filter(|s| !s.is_empty()),
        hostname: opt(row, "HOSTNAME"),
        server_time: opt(row, "SERVER_TIME"),
        start_time: opt(row, "START_TIME"),
        units: opt(row, "UNITS"),
        metric_type: opt(row, "METRIC_TYPE"),
        metrics: opt(row, "METRICS"),
        metric_sum: opt(row, "METRIC_SUM"),
        metric_max: opt(row, "METRIC_MAX"),
        metric_min: opt(row, "METRIC_MIN"),
        metric_count: opt(row, "METRIC_COUNT"),
        hosts_count: opt(row, "HOSTS_COUNT"),
    }
}

#[async_trait]
impl MetricStore for SqliteMetricStore {
    #[instrument(skip(self, condition), fields(repo = "metrics", operation = "execute_windowed_query", table = condition.table, do_update = condition.do_update))]
    async fn execute_windowed_query(&self, condition: &Condition) -> anyhow::Result<RowCursor> {
        if condition.do_update {
            let Some(mut qb) = condition.host_group_by_query() else {
                anyhow::bail!("group-by query on {} has no output table", condition.table);
            };
            let result = qb.build().execute(&self.pool).await?;
            return Ok(RowCursor {
                rows: Vec::new(),
                rows_affected: result.rows_affected(),
            });
        }
        let rows = self.read_pages(condition).await?;
        Ok(RowCursor {
            rows_affected: rows.len() as u64,
            rows,
        })
    }

    #[instrument(skip(self, aggregates), fields(repo = "metrics", operation = "save_host_aggregates", count = aggregates.len()))]
    async fn save_host_aggregates(
        &self,
        aggregates: &HashMap<TimelineHostMetric, MetricHostAggregate>,
        table: &'static str,
    ) -> anyhow::Result<()> {
        if aggregates.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {table} \
             (METRIC_NAME, HOSTNAME, APP_ID, INSTANCE_ID, SERVER_TIME, \
             METRIC_SUM, METRIC_COUNT, METRIC_MAX, METRIC_MIN) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        );
        let mut tx = self.pool.begin().await?;
        for (key, agg) in aggregates {
            sqlx::query(&sql)
                .bind(&key.metric_name)
                .bind(&key.hostname)
                .bind(&key.app_id)
                .bind(key.instance_id.as_deref().unwrap_or(""))
                .bind(key.timestamp)
                .bind(agg.sum())
                .bind(agg.number_of_samples())
                .bind(agg.max())
                .bind(agg.min())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, aggregates), fields(repo = "metrics", operation = "save_cluster_aggregates", count = aggregates.len()))]
    async fn save_cluster_aggregates(
        &self,
        aggregates: &HashMap<TimelineClusterMetric, MetricClusterAggregate>,
        table: &'static str,
    ) -> anyhow::Result<()> {
        if aggregates.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {table} \
             (METRIC_NAME, APP_ID, INSTANCE_ID, SERVER_TIME, \
             METRIC_SUM, HOSTS_COUNT, METRIC_MAX, METRIC_MIN) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        let mut tx = self.pool.begin().await?;
        for (key, agg) in aggregates {
            sqlx::query(&sql)
                .bind(&key.metric_name)
                .bind(&key.app_id)
                .bind(key.instance_id.as_deref().unwrap_or(""))
                .bind(key.timestamp)
                .bind(agg.sum())
                .bind(agg.number_of_hosts())
                .bind(agg.max())
                .bind(agg.min())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, aggregates), fields(repo = "metrics", operation = "save_cluster_time_aggregates", count = aggregates.len()))]
    async fn save_cluster_time_aggregates(
        &self,
        aggregates: &HashMap<TimelineClusterMetric, MetricHostAggregate>,
        table: &'static str,
    ) -> anyhow::Result<()> {
        if aggregates.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {table} \
             (METRIC_NAME, APP_ID, INSTANCE_ID, SERVER_TIME, \
             METRIC_SUM, METRIC_COUNT, METRIC_MAX, METRIC_MIN) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        let mut tx = self.pool.begin().await?;
        for (key, agg) in aggregates {
            sqlx::query(&sql)
                .bind(&key.metric_name)
                .bind(&key.app_id)
                .bind(key.instance_id.as_deref().unwrap_or(""))
                .bind(key.timestamp)
                .bind(agg.sum())
                .bind(agg.number_of_samples())
                .bind(agg.max())
                .bind(agg.min())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
