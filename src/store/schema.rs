// Table names and DDL. Missing instance ids are stored as '' so they can sit in primary keys.

use sqlx::SqlitePool;

pub const METRICS_RECORD_TABLE: &str = "METRIC_RECORD";
pub const METRICS_RECORD_MINUTE_TABLE: &str = "METRIC_RECORD_MINUTE";
pub const METRICS_RECORD_HOURLY_TABLE: &str = "METRIC_RECORD_HOURLY";
pub const METRICS_RECORD_DAILY_TABLE: &str = "METRIC_RECORD_DAILY";
pub const METRICS_CLUSTER_AGGREGATE_TABLE: &str = "METRIC_AGGREGATE";
pub const METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE: &str = "METRIC_AGGREGATE_MINUTE";
pub const METRICS_CLUSTER_AGGREGATE_HOURLY_TABLE: &str = "METRIC_AGGREGATE_HOURLY";
pub const METRICS_CLUSTER_AGGREGATE_DAILY_TABLE: &str = "METRIC_AGGREGATE_DAILY";

pub const HOST_AGGREGATE_TABLES: [&str; 3] = [
    METRICS_RECORD_MINUTE_TABLE,
    METRICS_RECORD_HOURLY_TABLE,
    METRICS_RECORD_DAILY_TABLE,
];

pub const CLUSTER_TIME_AGGREGATE_TABLES: [&str; 3] = [
    METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE,
    METRICS_CLUSTER_AGGREGATE_HOURLY_TABLE,
    METRICS_CLUSTER_AGGREGATE_DAILY_TABLE,
];

pub const ALL_TABLES: [&str; 8] = [
    METRICS_RECORD_TABLE,
    METRICS_RECORD_MINUTE_TABLE,
    METRICS_RECORD_HOURLY_TABLE,
    METRICS_RECORD_DAILY_TABLE,
    METRICS_CLUSTER_AGGREGATE_TABLE,
    METRICS_CLUSTER_AGGREGATE_MINUTE_TABLE,
    METRICS_CLUSTER_AGGREGATE_HOURLY_TABLE,
    METRICS_CLUSTER_AGGREGATE_DAILY_TABLE,
];

pub(crate) async fn create_tables(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {METRICS_RECORD_TABLE} (
            METRIC_NAME TEXT NOT NULL,
            HOSTNAME TEXT NOT NULL,
            SERVER_TIME INTEGER NOT NULL,
            APP_ID TEXT NOT NULL,
            INSTANCE_ID TEXT NOT NULL DEFAULT '',
            START_TIME INTEGER,
            UNITS TEXT,
            METRIC_TYPE TEXT,
            METRIC_SUM REAL,
            METRIC_COUNT INTEGER,
            METRIC_MAX REAL,
            METRIC_MIN REAL,
            METRICS TEXT NOT NULL,
            PRIMARY KEY (METRIC_NAME, HOSTNAME, SERVER_TIME, APP_ID, INSTANCE_ID)
        )
        "#
    ))
    .execute(pool)
    .await?;

    for table in HOST_AGGREGATE_TABLES {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                METRIC_NAME TEXT NOT NULL,
                HOSTNAME TEXT NOT NULL,
                APP_ID TEXT NOT NULL,
                INSTANCE_ID TEXT NOT NULL DEFAULT '',
                SERVER_TIME INTEGER NOT NULL,
                METRIC_SUM REAL,
                METRIC_COUNT INTEGER,
                METRIC_MAX REAL,
                METRIC_MIN REAL,
                PRIMARY KEY (METRIC_NAME, HOSTNAME, APP_ID, INSTANCE_ID, SERVER_TIME)
            )
            "#
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {METRICS_CLUSTER_AGGREGATE_TABLE} (
            METRIC_NAME TEXT NOT NULL,
            APP_ID TEXT NOT NULL,
            INSTANCE_ID TEXT NOT NULL DEFAULT '',
            SERVER_TIME INTEGER NOT NULL,
            METRIC_SUM REAL,
            HOSTS_COUNT INTEGER,
            METRIC_MAX REAL,
            METRIC_MIN REAL,
            PRIMARY KEY (METRIC_NAME, APP_ID, INSTANCE_ID, SERVER_TIME)
        )
        "#
    ))
    .execute(pool)
    .await?;

    for table in CLUSTER_TIME_AGGREGATE_TABLES {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                METRIC_NAME TEXT NOT NULL,
                APP_ID TEXT NOT NULL,
                INSTANCE_ID TEXT NOT NULL DEFAULT '',
                SERVER_TIME INTEGER NOT NULL,
                METRIC_SUM REAL,
                METRIC_COUNT INTEGER,
                METRIC_MAX REAL,
                METRIC_MIN REAL,
                PRIMARY KEY (METRIC_NAME, APP_ID, INSTANCE_ID, SERVER_TIME)
            )
            "#
        ))
        .execute(pool)
        .await?;
    }

    for table in ALL_TABLES {
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_server_time ON {table}(SERVER_TIME)",
            table.to_ascii_lowercase()
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}
