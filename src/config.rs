use crate::aggregators::AggregatorTier;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Raw `[[downsamplers]]` entries; parsed leniently so one bad entry does not sink the rest.
    #[serde(default)]
    pub downsamplers: Vec<toml::Table>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    /// Page size of windowed reads.
    #[serde(default = "default_result_fetch_size")]
    pub result_fetch_size: usize,
    /// Row cap for windowed reads that do not ask for everything.
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_max_pool_size() -> u32 {
    4
}

fn default_result_fetch_size() -> usize {
    2000
}

fn default_result_limit() -> usize {
    5760
}

fn default_query_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
    /// How far before the window start the second tier reads, to catch late samples.
    #[serde(default = "default_time_shift_adjustment_ms")]
    pub time_shift_adjustment_ms: i64,
    #[serde(default = "default_true")]
    pub interpolation_enabled: bool,
    /// Apps that get per-app cluster rollups of HOST metrics.
    #[serde(default = "default_app_ids")]
    pub app_ids: Vec<String>,
    /// Metric-name LIKE patterns excluded from every aggregation.
    #[serde(default)]
    pub skip_metric_patterns: Vec<String>,
    #[serde(default)]
    pub use_group_by_aggregators: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            time_shift_adjustment_ms: default_time_shift_adjustment_ms(),
            interpolation_enabled: true,
            app_ids: default_app_ids(),
            skip_metric_patterns: Vec::new(),
            use_group_by_aggregators: false,
        }
    }
}

fn default_checkpoint_dir() -> String {
    "data/checkpoints".into()
}

fn default_time_shift_adjustment_ms() -> i64 {
    90_000
}

fn default_true() -> bool {
    true
}

fn default_app_ids() -> Vec<String> {
    vec!["datanode".into(), "nodemanager".into(), "hbase".into()]
}

/// Per-tier overrides. Unset fields fall back to the tier's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierConfig {
    pub sleep_interval_secs: Option<u64>,
    pub checkpoint_cutoff_multiplier: Option<u32>,
    #[serde(default)]
    pub disabled: bool,
    /// Slice width; second tier only.
    pub timeslice_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TiersConfig {
    #[serde(default)]
    pub host_minute: TierConfig,
    #[serde(default)]
    pub host_hourly: TierConfig,
    #[serde(default)]
    pub host_daily: TierConfig,
    #[serde(default)]
    pub cluster_second: TierConfig,
    #[serde(default)]
    pub cluster_minute: TierConfig,
    #[serde(default)]
    pub cluster_hourly: TierConfig,
    #[serde(default)]
    pub cluster_daily: TierConfig,
}

impl TiersConfig {
    pub fn get(&self, tier: AggregatorTier) -> &TierConfig {
        match tier {
            AggregatorTier::HostMinute => &self.host_minute,
            AggregatorTier::HostHourly => &self.host_hourly,
            AggregatorTier::HostDaily => &self.host_daily,
            AggregatorTier::ClusterSecond => &self.cluster_second,
            AggregatorTier::ClusterMinute => &self.cluster_minute,
            AggregatorTier::ClusterHourly => &self.cluster_hourly,
            AggregatorTier::ClusterDaily => &self.cluster_daily,
        }
    }

    pub fn sleep_interval_secs(&self, tier: AggregatorTier) -> u64 {
        self.get(tier)
            .sleep_interval_secs
            .unwrap_or_else(|| tier.default_sleep_interval_secs())
    }

    pub fn checkpoint_cutoff_multiplier(&self, tier: AggregatorTier) -> u32 {
        self.get(tier)
            .checkpoint_cutoff_multiplier
            .unwrap_or_else(|| tier.default_checkpoint_cutoff_multiplier())
    }

    pub fn timeslice_interval_secs(&self) -> u64 {
        self.cluster_second.timeslice_interval_secs.unwrap_or(30)
    }
}

/// Time-to-live per table, pruning cadence and VACUUM schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
    #[serde(default = "default_precision_ttl_days")]
    pub precision_ttl_days: u32,
    #[serde(default = "default_host_minute_ttl_days")]
    pub host_minute_ttl_days: u32,
    #[serde(default = "default_host_hourly_ttl_days")]
    pub host_hourly_ttl_days: u32,
    #[serde(default = "default_host_daily_ttl_days")]
    pub host_daily_ttl_days: u32,
    #[serde(default = "default_cluster_second_ttl_days")]
    pub cluster_second_ttl_days: u32,
    #[serde(default = "default_cluster_minute_ttl_days")]
    pub cluster_minute_ttl_days: u32,
    #[serde(default = "default_cluster_hourly_ttl_days")]
    pub cluster_hourly_ttl_days: u32,
    #[serde(default = "default_cluster_daily_ttl_days")]
    pub cluster_daily_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prune_interval_secs: default_prune_interval_secs(),
            vacuum_schedule: None,
            vacuum_interval_secs: default_vacuum_interval_secs(),
            precision_ttl_days: default_precision_ttl_days(),
            host_minute_ttl_days: default_host_minute_ttl_days(),
            host_hourly_ttl_days: default_host_hourly_ttl_days(),
            host_daily_ttl_days: default_host_daily_ttl_days(),
            cluster_second_ttl_days: default_cluster_second_ttl_days(),
            cluster_minute_ttl_days: default_cluster_minute_ttl_days(),
            cluster_hourly_ttl_days: default_cluster_hourly_ttl_days(),
            cluster_daily_ttl_days: default_cluster_daily_ttl_days(),
        }
    }
}

impl RetentionConfig {
    /// (table, ttl days) for every table.
    pub fn table_ttls(&self) -> [(&'static str, u32); 8] {
        use crate::store::schema::*;
        [
            (METRICS_RECORD_TABLE, self.precision_ttl_days),
            (METRICS_RECORD_MINUTE_TABLE, self.host_minute_ttl_days),
            (METRICS_RECORD_HOURLY_TABLE, self.host_hourly_ttl_days),
            (METRICS_RECORD_DAILY_TABLE, self.host_daily_ttl_days),
            (METRICS_CLUSTER_AGGREGATE_TABLE, self.cluster_second_ttl_days),
            (METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE, self.cluster_minute_ttl_days),
            (METRICS_CLUSTER_AGGREGATE_HOURLY_TABLE, self.cluster_hourly_ttl_days),
            (METRICS_CLUSTER_AGGREGATE_DAILY_TABLE, self.cluster_daily_ttl_days),
        ]
    }
}

fn default_prune_interval_secs() -> u64 {
    3600
}

fn default_vacuum_interval_secs() -> u64 {
    86400
}

fn default_precision_ttl_days() -> u32 {
    1
}

fn default_host_minute_ttl_days() -> u32 {
    7
}

fn default_host_hourly_ttl_days() -> u32 {
    30
}

fn default_host_daily_ttl_days() -> u32 {
    365
}

fn default_cluster_second_ttl_days() -> u32 {
    7
}

fn default_cluster_minute_ttl_days() -> u32 {
    30
}

fn default_cluster_hourly_ttl_days() -> u32 {
    365
}

fn default_cluster_daily_ttl_days() -> u32 {
    730
}

impl AppConfig {
    /// Load from the file named by `CONFIG_FILE`, falling back to `config.toml`.
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate a TOML document.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.result_fetch_size > 0,
            "database.result_fetch_size must be > 0, got {}",
            self.database.result_fetch_size
        );
        anyhow::ensure!(
            self.database.result_limit > 0,
            "database.result_limit must be > 0, got {}",
            self.database.result_limit
        );
        anyhow::ensure!(
            self.database.query_timeout_secs > 0,
            "database.query_timeout_secs must be > 0, got {}",
            self.database.query_timeout_secs
        );
        anyhow::ensure!(
            !self.aggregation.checkpoint_dir.is_empty(),
            "aggregation.checkpoint_dir must be non-empty"
        );
        anyhow::ensure!(
            self.aggregation.time_shift_adjustment_ms >= 0,
            "aggregation.time_shift_adjustment_ms must be >= 0, got {}",
            self.aggregation.time_shift_adjustment_ms
        );
        for tier in AggregatorTier::ALL {
            let interval = self.tiers.sleep_interval_secs(tier);
            anyhow::ensure!(
                interval > 0,
                "tiers.{}.sleep_interval_secs must be > 0, got {}",
                tier,
                interval
            );
            let multiplier = self.tiers.checkpoint_cutoff_multiplier(tier);
            anyhow::ensure!(
                multiplier > 0,
                "tiers.{}.checkpoint_cutoff_multiplier must be > 0, got {}",
                tier,
                multiplier
            );
        }
        let slice = self.tiers.timeslice_interval_secs();
        anyhow::ensure!(
            slice > 0,
            "tiers.cluster_second.timeslice_interval_secs must be > 0, got {}",
            slice
        );
        anyhow::ensure!(
            self.retention.prune_interval_secs > 0,
            "retention.prune_interval_secs must be > 0, got {}",
            self.retention.prune_interval_secs
        );
        anyhow::ensure!(
            self.retention.vacuum_interval_secs > 0,
            "retention.vacuum_interval_secs must be > 0, got {}",
            self.retention.vacuum_interval_secs
        );
        for (table, ttl) in self.retention.table_ttls() {
            anyhow::ensure!(ttl > 0, "retention ttl for {} must be > 0 days", table);
        }
        Ok(())
    }
}
