// Background loops: tier tasks seed and stop on shutdown, maintenance prunes by TTL

mod common;

use common::{metric, read_all, temp_store};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use timeline_aggregator::aggregation_worker::{
    VacuumSchedule, prune_expired, spawn_maintenance, spawn_tiers,
};
use timeline_aggregator::aggregators::AggregatorTier;
use timeline_aggregator::aggregators::factory::AggregatorFactory;
use timeline_aggregator::checkpoint::CheckpointStore;
use timeline_aggregator::clock::ManualClock;
use timeline_aggregator::config::{AppConfig, RetentionConfig};
use timeline_aggregator::models::MetricType;
use timeline_aggregator::store::MetricStore;
use timeline_aggregator::store::schema::*;
use tokio::sync::watch;

const DAY: i64 = 24 * 60 * 60 * 1000;
const NOW: i64 = 1_000_000_000_000;

#[tokio::test]
async fn test_prune_expired_applies_per_table_ttl() {
    let (_dir, store) = temp_store().await;
    store
        .insert_metric_records(&[
            metric("m", "app", "h1", NOW - 2 * DAY, MetricType::Gauge, &[(NOW - 2 * DAY, 1.0)]),
            metric("m", "app", "h1", NOW - 60_000, MetricType::Gauge, &[(NOW - 60_000, 1.0)]),
        ])
        .await
        .unwrap();

    let retention = RetentionConfig::default();
    let pruned = prune_expired(&store, &retention, NOW).await.unwrap();
    assert_eq!(pruned, 1);
    let left = read_all(&store, METRICS_RECORD_TABLE).await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].server_time, Some(NOW - 60_000));
}

#[tokio::test]
async fn test_prune_disabled_is_noop() {
    let (_dir, store) = temp_store().await;
    store
        .insert_metric_records(&[metric(
            "m",
            "app",
            "h1",
            0,
            MetricType::Gauge,
            &[(0, 1.0)],
        )])
        .await
        .unwrap();
    let retention = RetentionConfig {
        enabled: false,
        ..Default::default()
    };
    assert_eq!(prune_expired(&store, &retention, NOW).await.unwrap(), 0);
    assert_eq!(read_all(&store, METRICS_RECORD_TABLE).await.len(), 1);
}

async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_spawn_tiers_seeds_checkpoints_and_stops_on_shutdown() {
    let (_db, store) = temp_store().await;
    let dir = TempDir::new().unwrap();
    let checkpoint_dir = dir.path().join("checkpoints");
    let config = AppConfig::load_from_str(&format!(
        "[database]\npath = \"unused.db\"\n\n[aggregation]\ncheckpoint_dir = \"{}\"\n\n[tiers.cluster_daily]\ndisabled = true\n",
        checkpoint_dir.display()
    ))
    .unwrap();
    let factory = AggregatorFactory::new(
        &config,
        Arc::new(store),
        Arc::new(ManualClock::new(NOW)),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_tiers(factory.create_all(), shutdown_rx);
    assert_eq!(handles.len(), 6);

    let host_minute = CheckpointStore::new(checkpoint_dir.join(AggregatorTier::HostMinute.checkpoint_file()));
    assert!(wait_for(|| host_minute.read().is_some()).await);
    assert_eq!(host_minute.read(), Some(NOW - NOW % 300_000));
    let cluster_daily =
        CheckpointStore::new(checkpoint_dir.join(AggregatorTier::ClusterDaily.checkpoint_file()));
    assert_eq!(cluster_daily.read(), None);

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("tier task stops after shutdown")
            .unwrap();
    }
}

#[tokio::test]
async fn test_maintenance_prunes_on_first_tick() {
    let (_dir, store) = temp_store().await;
    let store = Arc::new(store);
    store
        .insert_metric_records(&[metric(
            "m",
            "app",
            "h1",
            NOW - 3 * DAY,
            MetricType::Gauge,
            &[(NOW - 3 * DAY, 1.0)],
        )])
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_maintenance(
        store.clone(),
        RetentionConfig::default(),
        Arc::new(ManualClock::new(NOW)),
        shutdown_rx,
    );

    let mut remaining = usize::MAX;
    for _ in 0..100 {
        remaining = read_all(store.as_ref() as &dyn MetricStore, METRICS_RECORD_TABLE)
            .await
            .len();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("maintenance stops after shutdown")
        .unwrap();
}

#[test]
fn test_vacuum_schedule_from_retention() {
    let every = VacuumSchedule::from_retention(&RetentionConfig {
        vacuum_interval_secs: 600,
        ..Default::default()
    });
    assert!(matches!(every, VacuumSchedule::Every(d) if d == Duration::from_secs(600)));
    assert_eq!(every.next_delay(), Some(Duration::from_secs(600)));

    let cron = VacuumSchedule::from_retention(&RetentionConfig {
        vacuum_schedule: Some("0 0 3 * * *".into()),
        ..Default::default()
    });
    assert!(matches!(cron, VacuumSchedule::Cron(_)));
    let delay = cron.next_delay().expect("daily schedule has a next run");
    assert!(delay <= Duration::from_secs(25 * 60 * 60));

    let invalid = VacuumSchedule::from_retention(&RetentionConfig {
        vacuum_schedule: Some("not a cron".into()),
        ..Default::default()
    });
    assert!(matches!(invalid, VacuumSchedule::Off));
    assert_eq!(invalid.next_delay(), None);
}
