// Config loading and validation tests

use timeline_aggregator::aggregators::AggregatorTier;
use timeline_aggregator::config::AppConfig;

const VALID_CONFIG: &str = r#"
[database]
path = "data/metrics.db"
max_pool_size = 4
result_fetch_size = 500

[aggregation]
checkpoint_dir = "data/checkpoints"
time_shift_adjustment_ms = 60000
app_ids = ["datanode", "hbase"]
skip_metric_patterns = ["jvm.%"]

[tiers.host_minute]
sleep_interval_secs = 120
checkpoint_cutoff_multiplier = 4

[tiers.cluster_second]
timeslice_interval_secs = 15

[tiers.cluster_daily]
disabled = true

[retention]
precision_ttl_days = 2
vacuum_schedule = "0 0 3 * * *"

[[downsamplers]]
type = "topn"
metric_patterns = ["dfs.%"]
top_n = 5
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.database.path, "data/metrics.db");
    assert_eq!(config.database.result_fetch_size, 500);
    assert_eq!(config.database.result_limit, 5760);
    assert_eq!(config.aggregation.time_shift_adjustment_ms, 60000);
    assert_eq!(config.aggregation.app_ids, vec!["datanode", "hbase"]);
    assert_eq!(config.aggregation.skip_metric_patterns, vec!["jvm.%"]);
    assert!(config.aggregation.interpolation_enabled);
    assert!(!config.aggregation.use_group_by_aggregators);
    assert_eq!(config.retention.precision_ttl_days, 2);
    assert_eq!(config.retention.host_minute_ttl_days, 7);
    assert_eq!(config.retention.vacuum_schedule.as_deref(), Some("0 0 3 * * *"));
    assert_eq!(config.downsamplers.len(), 1);
}

#[test]
fn test_tier_overrides_and_defaults() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    let tiers = &config.tiers;
    assert_eq!(tiers.sleep_interval_secs(AggregatorTier::HostMinute), 120);
    assert_eq!(tiers.checkpoint_cutoff_multiplier(AggregatorTier::HostMinute), 4);
    assert_eq!(tiers.sleep_interval_secs(AggregatorTier::HostHourly), 3600);
    assert_eq!(tiers.checkpoint_cutoff_multiplier(AggregatorTier::HostDaily), 1);
    assert_eq!(tiers.sleep_interval_secs(AggregatorTier::ClusterSecond), 120);
    assert_eq!(tiers.timeslice_interval_secs(), 15);
    assert!(tiers.get(AggregatorTier::ClusterDaily).disabled);
    assert!(!tiers.get(AggregatorTier::ClusterMinute).disabled);
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = AppConfig::load_from_str("[database]\npath = \"m.db\"\n").expect("minimal");
    assert_eq!(config.database.max_pool_size, 4);
    assert_eq!(config.database.query_timeout_secs, 300);
    assert_eq!(config.aggregation.time_shift_adjustment_ms, 90000);
    assert_eq!(
        config.aggregation.app_ids,
        vec!["datanode", "nodemanager", "hbase"]
    );
    assert_eq!(config.tiers.timeslice_interval_secs(), 30);
    assert!(config.retention.enabled);
    assert!(config.downsamplers.is_empty());
}

#[test]
fn test_config_validation_rejects_empty_db_path() {
    let bad = VALID_CONFIG.replace("path = \"data/metrics.db\"", "path = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.path"));
}

#[test]
fn test_config_validation_rejects_max_pool_size_zero() {
    let bad = VALID_CONFIG.replace("max_pool_size = 4", "max_pool_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("max_pool_size"));
}

#[test]
fn test_config_validation_rejects_fetch_size_zero() {
    let bad = VALID_CONFIG.replace("result_fetch_size = 500", "result_fetch_size = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("result_fetch_size"));
}

#[test]
fn test_config_validation_rejects_negative_time_shift() {
    let bad = VALID_CONFIG.replace(
        "time_shift_adjustment_ms = 60000",
        "time_shift_adjustment_ms = -1",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("time_shift_adjustment_ms"));
}

#[test]
fn test_config_validation_rejects_zero_sleep_interval() {
    let bad = VALID_CONFIG.replace("sleep_interval_secs = 120", "sleep_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("tiers.host_minute.sleep_interval_secs"));
}

#[test]
fn test_config_validation_rejects_zero_cutoff_multiplier() {
    let bad = VALID_CONFIG.replace(
        "checkpoint_cutoff_multiplier = 4",
        "checkpoint_cutoff_multiplier = 0",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("checkpoint_cutoff_multiplier"));
}

#[test]
fn test_config_validation_rejects_zero_timeslice() {
    let bad = VALID_CONFIG.replace("timeslice_interval_secs = 15", "timeslice_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("timeslice_interval_secs"));
}

#[test]
fn test_config_validation_rejects_zero_ttl() {
    let bad = VALID_CONFIG.replace("precision_ttl_days = 2", "precision_ttl_days = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("METRIC_RECORD"));
}

#[test]
fn test_malformed_downsampler_does_not_fail_config() {
    let src = format!("{VALID_CONFIG}\n[[downsamplers]]\ntype = \"nonsense\"\n");
    let config = AppConfig::load_from_str(&src).expect("config still loads");
    assert_eq!(config.downsamplers.len(), 2);
}

#[test]
fn test_config_load_from_file_via_env() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    unsafe { std::env::set_var("CONFIG_FILE", path.to_str().unwrap()) };
    let result = AppConfig::load();
    unsafe { std::env::remove_var("CONFIG_FILE") };
    let config = result.expect("load from CONFIG_FILE");
    assert_eq!(config.database.path, "data/metrics.db");
}

#[test]
fn test_missing_config_file_names_the_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let err = AppConfig::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}
