// Metric identities and raw host series.

use std::collections::BTreeMap;

/// App id under which host-level metrics (cpu, memory, disk) are reported.
pub const HOST_APP_ID: &str = "HOST";

/// Metric value semantics; drives gap-fill behaviour in the second tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricType {
    Counter,
    #[default]
    Gauge,
}

impl MetricType {
    /// Parse the stored type column; anything unrecognised is a gauge.
    pub fn from_column(s: Option<&str>) -> Self {
        match s.map(|s| s.to_ascii_uppercase()) {
            Some(s) if s == "COUNTER" => MetricType::Counter,
            _ => MetricType::Gauge,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "COUNTER",
            MetricType::Gauge => "GAUGE",
        }
    }
}

/// One host series as read from the precision table: a batch of samples
/// for (metric, app, instance, host).
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineMetric {
    pub metric_name: String,
    pub app_id: String,
    pub instance_id: Option<String>,
    pub hostname: String,
    /// Server receive time of the row (SERVER_TIME).
    pub timestamp: i64,
    /// Client emit time of the row (START_TIME); missing when the row carried none.
    pub start_time: Option<i64>,
    pub units: Option<String>,
    pub metric_type: MetricType,
    /// Sample time -> value. `None` entries were stored as null and are skipped.
    pub metric_values: BTreeMap<i64, Option<f64>>,
}

impl TimelineMetric {
    /// True when both describe the same host series, ignoring time and values.
    pub fn equals_except_time(&self, other: &TimelineMetric) -> bool {
        self.metric_name == other.metric_name
            && self.hostname == other.hostname
            && self.app_id == other.app_id
            && self.instance_id == other.instance_id
    }

    /// Merge the values of a later row of the same series into this one.
    pub fn add_metric_values(&mut self, values: BTreeMap<i64, Option<f64>>) {
        self.metric_values.extend(values);
    }

    /// Non-null samples in time order.
    pub fn present_values(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.metric_values
            .iter()
            .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
    }

    pub fn cluster_metric(&self, timestamp: i64) -> TimelineClusterMetric {
        TimelineClusterMetric {
            metric_name: self.metric_name.clone(),
            app_id: self.app_id.clone(),
            instance_id: self.instance_id.clone(),
            timestamp,
        }
    }
}

/// Cluster-wide series key: (metric, app, instance) plus the bucket timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimelineClusterMetric {
    pub metric_name: String,
    pub app_id: String,
    pub instance_id: Option<String>,
    pub timestamp: i64,
}

impl TimelineClusterMetric {
    pub fn new(
        metric_name: impl Into<String>,
        app_id: impl Into<String>,
        instance_id: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            app_id: app_id.into(),
            instance_id,
            timestamp,
        }
    }

    /// Series identity check used to detect series boundaries in ordered scans.
    pub fn equals_except_time(&self, other: &TimelineClusterMetric) -> bool {
        self.metric_name == other.metric_name
            && self.app_id == other.app_id
            && self.instance_id == other.instance_id
    }

    pub fn with_timestamp(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// Per-host series key for host aggregate tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimelineHostMetric {
    pub metric_name: String,
    pub hostname: String,
    pub app_id: String,
    pub instance_id: Option<String>,
    pub timestamp: i64,
}

impl TimelineHostMetric {
    pub fn equals_except_time(&self, other: &TimelineHostMetric) -> bool {
        self.metric_name == other.metric_name
            && self.hostname == other.hostname
            && self.app_id == other.app_id
            && self.instance_id == other.instance_id
    }

    pub fn with_timestamp(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// Same series without the host dimension.
    pub fn cluster_metric(&self) -> TimelineClusterMetric {
        TimelineClusterMetric {
            metric_name: self.metric_name.clone(),
            app_id: self.app_id.clone(),
            instance_id: self.instance_id.clone(),
            timestamp: self.timestamp,
        }
    }
}
