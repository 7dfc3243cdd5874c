// Background tasks: one cycle loop per enabled tier, plus a maintenance loop that prunes
// expired rows and runs VACUUM on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::aggregators::runner::{CycleOutcome, TimelineAggregator};
use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::store::SqliteMetricStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Spawns one task per enabled tier. Disabled tiers are logged and skipped.
pub fn spawn_tiers(
    aggregators: Vec<TimelineAggregator>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    aggregators
        .into_iter()
        .filter(|a| {
            if a.is_disabled() {
                info!(tier = %a.tier(), "tier disabled");
            }
            !a.is_disabled()
        })
        .map(|a| spawn(a, shutdown.clone()))
        .collect()
}

/// Spawns the cycle loop for one tier. Returns a join handle.
pub fn spawn(aggregator: TimelineAggregator, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        run(aggregator, shutdown).await;
    })
}

#[instrument(skip_all, fields(tier = %aggregator.tier()))]
async fn run(mut aggregator: TimelineAggregator, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(aggregator.sleep_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(
        interval_ms = aggregator.settings().sleep_interval_ms,
        "aggregator started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = aggregator.run_once().await;
                if matches!(outcome, CycleOutcome::TooYoung { .. }) {
                    debug!(?outcome, "cycle skipped");
                }
            }
            _ = shutdown.changed() => {
                info!("aggregator stopping");
                break;
            }
        }
    }
}

/// Spawns the retention/VACUUM loop.
pub fn spawn_maintenance(
    store: Arc<SqliteMetricStore>,
    retention: RetentionConfig,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_maintenance(store, retention, clock, shutdown).await;
    })
}

#[instrument(skip_all, fields(prune_interval_secs = retention.prune_interval_secs))]
async fn run_maintenance(
    store: Arc<SqliteMetricStore>,
    retention: RetentionConfig,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut prune_interval =
        tokio::time::interval(Duration::from_secs(retention.prune_interval_secs));
    prune_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let scheduler = tokio::spawn(vacuum_scheduler(
        VacuumSchedule::from_retention(&retention),
        vacuum_tx,
    ));

    loop {
        tokio::select! {
            _ = prune_interval.tick() => {
                match prune_expired(&store, &retention, clock.now_millis()).await {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned, "pruned expired rows"),
                    Err(e) => warn!(error = %e, "prune failed"),
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = store.vacuum().await {
                    warn!(error = %e, "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    scheduler.abort();
}

/// When VACUUM runs: a cron schedule in local time, a fixed period, or never.
#[derive(Debug, Clone)]
pub enum VacuumSchedule {
    Cron(cron::Schedule),
    Every(Duration),
    Off,
}

impl VacuumSchedule {
    /// A cron expression takes precedence over the fixed period. An invalid one disables VACUUM.
    pub fn from_retention(retention: &RetentionConfig) -> Self {
        match retention.vacuum_schedule.as_deref() {
            Some(expr) => match cron::Schedule::from_str(expr) {
                Ok(schedule) => VacuumSchedule::Cron(schedule),
                Err(e) => {
                    warn!(cron = %expr, error = %e, "invalid vacuum_schedule; VACUUM disabled");
                    VacuumSchedule::Off
                }
            },
            None => VacuumSchedule::Every(Duration::from_secs(retention.vacuum_interval_secs.max(1))),
        }
    }

    /// Delay until the next run, or `None` when there is none.
    pub fn next_delay(&self) -> Option<Duration> {
        match self {
            VacuumSchedule::Cron(schedule) => {
                let now = chrono::Local::now();
                let next = schedule.after(&now).next()?;
                Some((next - now).to_std().unwrap_or(Duration::from_secs(1)))
            }
            VacuumSchedule::Every(period) => Some(*period),
            VacuumSchedule::Off => None,
        }
    }
}

/// Signals `tx` at each VACUUM time until the schedule runs out or the receiver is gone.
async fn vacuum_scheduler(schedule: VacuumSchedule, tx: tokio::sync::mpsc::Sender<()>) {
    while let Some(delay) = schedule.next_delay() {
        debug!(delay_secs = delay.as_secs(), "next VACUUM scheduled");
        tokio::time::sleep(delay).await;
        if tx.send(()).await.is_err() {
            break;
        }
    }
}

/// Deletes rows older than each table's TTL relative to `now_ms`. Returns rows removed.
pub async fn prune_expired(
    store: &SqliteMetricStore,
    retention: &RetentionConfig,
    now_ms: i64,
) -> anyhow::Result<u64> {
    if !retention.enabled {
        return Ok(0);
    }
    let mut pruned = 0;
    for (table, ttl_days) in retention.table_ttls() {
        let cutoff = now_ms - (ttl_days as i64) * MS_PER_DAY;
        pruned += store.prune_table(table, cutoff).await?;
    }
    Ok(pruned)
}
