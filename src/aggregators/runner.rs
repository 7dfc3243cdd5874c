// One tier's checkpointed cycle: decide the window, run the strategy, persist, advance.

use super::{AggregationOutcome, AggregationStrategy, AggregatorTier, Window};
use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::store::MetricStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolved per-tier settings.
#[derive(Debug, Clone)]
pub struct TierSettings {
    pub tier: AggregatorTier,
    pub sleep_interval_ms: i64,
    pub checkpoint_cutoff_multiplier: i64,
    pub disabled: bool,
    pub query_timeout: Duration,
}

/// Result of one `run_once` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No checkpoint existed; one was written and nothing ran.
    Seeded { checkpoint: i64 },
    /// Checkpoint was past the cutoff; a fresh one was written and nothing ran.
    Reseeded { checkpoint: i64 },
    /// The next boundary has not been reached yet.
    TooYoung { checkpoint: i64 },
    Aggregated { window: Window, records: u64 },
    /// Storage failed; the checkpoint stays put and the window is retried next cycle.
    Failed { window: Window },
    /// The new checkpoint could not be written; the next cycle starts from the last durable one.
    CheckpointNotPersisted { checkpoint: i64 },
}

pub struct TimelineAggregator {
    settings: TierSettings,
    checkpoint: CheckpointStore,
    clock: Arc<dyn Clock>,
    store: Arc<dyn MetricStore>,
    strategy: Box<dyn AggregationStrategy>,
}

impl TimelineAggregator {
    pub fn new(
        settings: TierSettings,
        checkpoint: CheckpointStore,
        clock: Arc<dyn Clock>,
        store: Arc<dyn MetricStore>,
        strategy: Box<dyn AggregationStrategy>,
    ) -> Self {
        Self {
            settings,
            checkpoint,
            clock,
            store,
            strategy,
        }
    }

    pub fn tier(&self) -> AggregatorTier {
        self.settings.tier
    }

    pub fn settings(&self) -> &TierSettings {
        &self.settings
    }

    pub fn is_disabled(&self) -> bool {
        self.settings.disabled
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.settings.sleep_interval_ms.max(1) as u64)
    }

    fn floor(&self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.settings.sleep_interval_ms)
    }

    fn persist(&self, checkpoint: i64) -> Result<(), CycleOutcome> {
        self.checkpoint.write(checkpoint).map_err(|e| {
            warn!(
                tier = %self.settings.tier,
                checkpoint,
                path = %self.checkpoint.path().display(),
                error = %e,
                "failed to persist checkpoint"
            );
            CycleOutcome::CheckpointNotPersisted { checkpoint }
        })
    }

    pub async fn run_once(&mut self) -> CycleOutcome {
        let tier = self.settings.tier;
        let interval = self.settings.sleep_interval_ms;
        let now = self.clock.now_millis();

        let Some(checkpoint) = self.checkpoint.read() else {
            let first = self.floor(now);
            if let Err(outcome) = self.persist(first) {
                return outcome;
            }
            info!(%tier, checkpoint = first, "seeded checkpoint, skipping cycle");
            return CycleOutcome::Seeded { checkpoint: first };
        };

        if now - checkpoint > self.settings.checkpoint_cutoff_multiplier * interval {
            let fresh = self.floor(now) - interval;
            if let Err(outcome) = self.persist(fresh) {
                return outcome;
            }
            warn!(
                %tier,
                stale = checkpoint,
                checkpoint = fresh,
                "checkpoint older than cutoff, reseeded; unaggregated backlog dropped"
            );
            return CycleOutcome::Reseeded { checkpoint: fresh };
        }

        let checkpoint = self.floor(checkpoint);
        if self.floor(now) <= checkpoint {
            debug!(%tier, checkpoint, now, "next boundary not reached");
            return CycleOutcome::TooYoung { checkpoint };
        }

        let window = Window {
            start: checkpoint,
            end: checkpoint + interval,
        };
        match self.do_work(window).await {
            Ok(records) => {
                if let Err(outcome) = self.persist(window.end) {
                    return outcome;
                }
                info!(
                    %tier,
                    start = window.start,
                    end = window.end,
                    records,
                    "aggregated window"
                );
                CycleOutcome::Aggregated { window, records }
            }
            Err(e) => {
                warn!(
                    %tier,
                    start = window.start,
                    end = window.end,
                    error = %e,
                    "aggregation failed, checkpoint not advanced"
                );
                CycleOutcome::Failed { window }
            }
        }
    }

    /// Read the window, fold it, and save the result. Returns the number of records written.
    pub async fn do_work(&mut self, window: Window) -> anyhow::Result<u64> {
        let condition = self.strategy.prepare_query(&window);
        let cursor = bounded(
            self.settings.query_timeout,
            "windowed query",
            self.store.execute_windowed_query(&condition),
        )
        .await?;
        if condition.do_update {
            return Ok(cursor.rows_affected);
        }

        let outcome = self.strategy.aggregate(cursor.rows, &window)?;
        let records = outcome.len();
        let table = self.settings.tier.output_table();
        let timeout = self.settings.query_timeout;
        match outcome {
            AggregationOutcome::HostAggregates(m) => {
                bounded(timeout, "save", self.store.save_host_aggregates(&m, table)).await?
            }
            AggregationOutcome::ClusterAggregates(m) => {
                bounded(timeout, "save", self.store.save_cluster_aggregates(&m, table)).await?
            }
            AggregationOutcome::ClusterTimeAggregates(m) => {
                bounded(
                    timeout,
                    "save",
                    self.store.save_cluster_time_aggregates(&m, table),
                )
                .await?
            }
            AggregationOutcome::Updated(_) => {}
        }
        Ok(records)
    }
}

async fn bounded<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", what, timeout))?
}
