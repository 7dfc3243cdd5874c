use anyhow::Result;
use chrono::SecondsFormat;
use std::sync::Arc;
use timeline_aggregator::aggregators::factory::AggregatorFactory;
use timeline_aggregator::clock::{Clock, SystemClock};
use timeline_aggregator::store::{MetricStore, SqliteMetricStore};
use timeline_aggregator::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Log timestamps in local time with millisecond precision and the UTC offset.
struct LocalMillis;

impl FormatTime for LocalMillis {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "{}", now.to_rfc3339_opts(SecondsFormat::Millis, false))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalMillis)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    tracing::info!(name = version::NAME, version = version::VERSION, "starting");
    let app_config = config::AppConfig::load()?;

    let store = Arc::new(
        SqliteMetricStore::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            app_config.database.result_limit,
        )
        .await?,
    );
    store.init().await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let factory = AggregatorFactory::new(
        &app_config,
        store.clone() as Arc<dyn MetricStore>,
        clock.clone(),
    );
    tracing::info!(
        downsamplers = factory.downsamplers().len(),
        checkpoint_dir = %app_config.aggregation.checkpoint_dir,
        "aggregators configured"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = aggregation_worker::spawn_tiers(factory.create_all(), shutdown_rx.clone());
    handles.push(aggregation_worker::spawn_maintenance(
        store.clone(),
        app_config.retention.clone(),
        clock,
        shutdown_rx,
    ));

    shutdown_signal().await;
    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
