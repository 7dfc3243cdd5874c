// SQLite metric store: ingestion, windowed reads, upserts, pruning

mod common;

use common::{metric, read_all, temp_store};
use std::collections::HashMap;
use timeline_aggregator::models::*;
use timeline_aggregator::store::schema::*;
use timeline_aggregator::store::{Condition, MetricStore, TimeRange};

#[tokio::test]
async fn test_insert_and_read_precision_rows() {
    let (_dir, store) = temp_store().await;
    let mut m = metric(
        "cpu_user",
        HOST_APP_ID,
        "h1",
        1_000,
        MetricType::Counter,
        &[(900, 1.0), (950, 3.0)],
    );
    m.instance_id = Some("i-1".into());
    store
        .insert_metric_records(&[
            m,
            metric("cpu_user", HOST_APP_ID, "h2", 1_000, MetricType::Gauge, &[]),
        ])
        .await
        .expect("insert");

    let rows = read_all(&store, METRICS_RECORD_TABLE).await;
    assert_eq!(rows.len(), 2);
    let h1 = rows
        .iter()
        .find(|r| r.hostname.as_deref() == Some("h1"))
        .unwrap();
    assert_eq!(h1.metric_sum, Some(4.0));
    assert_eq!(h1.metric_count, Some(2));
    assert_eq!(h1.metric_max, Some(3.0));
    assert_eq!(h1.metric_min, Some(1.0));
    assert_eq!(h1.metric_type.as_deref(), Some("COUNTER"));
    assert_eq!(h1.instance_id.as_deref(), Some("i-1"));
    assert_eq!(h1.start_time, Some(1_000));
    let h2 = rows
        .iter()
        .find(|r| r.hostname.as_deref() == Some("h2"))
        .unwrap();
    assert_eq!(h2.instance_id, None);
    assert_eq!(h2.metric_count, Some(0));
}

#[tokio::test]
async fn test_time_range_conventions() {
    let (_dir, store) = temp_store().await;
    let metrics: Vec<_> = [100, 200, 300]
        .iter()
        .map(|ts| metric("m", "app", "h1", *ts, MetricType::Gauge, &[(*ts, 1.0)]))
        .collect();
    store.insert_metric_records(&metrics).await.unwrap();

    let half_open = Condition::new(METRICS_RECORD_TABLE, 100, 300, TimeRange::HalfOpen)
        .order_by(&["SERVER_TIME"]);
    let rows = store.execute_windowed_query(&half_open).await.unwrap().rows;
    let times: Vec<_> = rows.iter().filter_map(|r| r.server_time).collect();
    assert_eq!(times, vec![100, 200]);

    let interval_open = Condition::new(METRICS_RECORD_TABLE, 100, 300, TimeRange::IntervalOpen)
        .order_by(&["SERVER_TIME"]);
    let rows = store.execute_windowed_query(&interval_open).await.unwrap().rows;
    let times: Vec<_> = rows.iter().filter_map(|r| r.server_time).collect();
    assert_eq!(times, vec![200, 300]);
}

#[tokio::test]
async fn test_metric_name_filters() {
    let (_dir, store) = temp_store().await;
    store
        .insert_metric_records(&[
            metric("jvm.gc", "app", "h1", 10, MetricType::Gauge, &[(10, 1.0)]),
            metric("cpu_user", "app", "h1", 10, MetricType::Gauge, &[(10, 1.0)]),
            metric("cpu_idle", "app", "h1", 10, MetricType::Gauge, &[(10, 1.0)]),
        ])
        .await
        .unwrap();

    let excluded = Condition::new(METRICS_RECORD_TABLE, 0, 100, TimeRange::HalfOpen)
        .exclude_metrics(&["jvm.%".to_string()]);
    assert_eq!(
        store.execute_windowed_query(&excluded).await.unwrap().rows.len(),
        2
    );

    let included = Condition::new(METRICS_RECORD_TABLE, 0, 100, TimeRange::HalfOpen)
        .include_metrics(&["cpu_u%".to_string()]);
    let rows = store.execute_windowed_query(&included).await.unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metric_name.as_deref(), Some("cpu_user"));
}

#[tokio::test]
async fn test_pagination_and_result_limit() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("m.db");
    let store = timeline_aggregator::store::SqliteMetricStore::connect(path.to_str().unwrap(), 1, 5)
        .await
        .unwrap();
    store.init().await.unwrap();
    let metrics: Vec<_> = (0..12)
        .map(|i| metric("m", "app", "h1", i, MetricType::Gauge, &[(i, 1.0)]))
        .collect();
    store.insert_metric_records(&metrics).await.unwrap();

    let limited = Condition::new(METRICS_RECORD_TABLE, 0, 100, TimeRange::HalfOpen)
        .order_by(&["SERVER_TIME"])
        .fetch_size(2);
    let cursor = store.execute_windowed_query(&limited).await.unwrap();
    assert_eq!(cursor.rows.len(), 5);

    let all = limited.clone().no_limit();
    let rows = store.execute_windowed_query(&all).await.unwrap().rows;
    assert_eq!(rows.len(), 12);
    let times: Vec<_> = rows.iter().filter_map(|r| r.server_time).collect();
    assert_eq!(times, (0..12).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_save_paths_upsert() {
    let (_dir, store) = temp_store().await;

    let host_key = TimelineHostMetric {
        metric_name: "mem".into(),
        hostname: "h1".into(),
        app_id: HOST_APP_ID.into(),
        instance_id: None,
        timestamp: 300,
    };
    let mut host = HashMap::new();
    host.insert(host_key.clone(), MetricHostAggregate::new(10.0, 5, 0.0, 4.0, 1.0));
    store
        .save_host_aggregates(&host, METRICS_RECORD_MINUTE_TABLE)
        .await
        .unwrap();
    host.insert(host_key, MetricHostAggregate::new(20.0, 5, 0.0, 4.0, 1.0));
    store
        .save_host_aggregates(&host, METRICS_RECORD_MINUTE_TABLE)
        .await
        .unwrap();
    let rows = read_all(&store, METRICS_RECORD_MINUTE_TABLE).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metric_sum, Some(20.0));
    assert_eq!(rows[0].metric_count, Some(5));

    let key = TimelineClusterMetric::new("mem", "hbase", Some("i1".into()), 300);
    let mut cluster = HashMap::new();
    cluster.insert(key.clone(), MetricClusterAggregate::new(8.0, 2, 0.0, 6.0, 2.0));
    store
        .save_cluster_aggregates(&cluster, METRICS_CLUSTER_AGGREGATE_TABLE)
        .await
        .unwrap();
    let rows = read_all(&store, METRICS_CLUSTER_AGGREGATE_TABLE).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].hosts_count, Some(2));
    assert_eq!(rows[0].instance_id.as_deref(), Some("i1"));
    assert_eq!(rows[0].metric_count, None);

    let mut cluster_time = HashMap::new();
    cluster_time.insert(key, MetricHostAggregate::new(4.0, 2, 0.0, 4.0, 0.0));
    store
        .save_cluster_time_aggregates(&cluster_time, METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE)
        .await
        .unwrap();
    let rows = read_all(&store, METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metric_count, Some(2));
    assert_eq!(rows[0].hosts_count, None);
}

#[tokio::test]
async fn test_prune_and_vacuum() {
    let (_dir, store) = temp_store().await;
    store
        .insert_metric_records(&[
            metric("m", "app", "h1", 100, MetricType::Gauge, &[(100, 1.0)]),
            metric("m", "app", "h1", 500, MetricType::Gauge, &[(500, 1.0)]),
        ])
        .await
        .unwrap();
    let pruned = store.prune_table(METRICS_RECORD_TABLE, 200).await.unwrap();
    assert_eq!(pruned, 1);
    assert_eq!(read_all(&store, METRICS_RECORD_TABLE).await.len(), 1);
    store.vacuum().await.expect("vacuum");
}
