// Running statistics for one (series, bucket). Created per bucket, dropped after save.

/// Base accumulator: sum, max, min and deviation.
///
/// max/min start unset and read back as 0.0 until a value has been folded in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricAggregate {
    sum: f64,
    max: Option<f64>,
    min: Option<f64>,
    deviation: f64,
}

impl MetricAggregate {
    pub fn new(sum: f64, deviation: f64, max: f64, min: f64) -> Self {
        Self {
            sum,
            max: Some(max),
            min: Some(min),
            deviation,
        }
    }
}

/// Shared accessors and folds for every accumulator flavour.
pub trait AggregateStats {
    fn base(&self) -> &MetricAggregate;
    fn base_mut(&mut self) -> &mut MetricAggregate;

    fn update_sum(&mut self, value: f64) {
        self.base_mut().sum += value;
    }

    fn update_max(&mut self, value: f64) {
        let base = self.base_mut();
        if base.max.is_none_or(|m| value > m) {
            base.max = Some(value);
        }
    }

    fn update_min(&mut self, value: f64) {
        let base = self.base_mut();
        if base.min.is_none_or(|m| value < m) {
            base.min = Some(value);
        }
    }

    fn sum(&self) -> f64 {
        self.base().sum
    }

    fn max(&self) -> f64 {
        self.base().max.unwrap_or(0.0)
    }

    fn min(&self) -> f64 {
        self.base().min.unwrap_or(0.0)
    }

    /// Always 0.0: no standard deviation is computed anywhere.
    fn deviation(&self) -> f64 {
        self.base().deviation
    }
}

impl AggregateStats for MetricAggregate {
    fn base(&self) -> &MetricAggregate {
        self
    }

    fn base_mut(&mut self) -> &mut MetricAggregate {
        self
    }
}

/// Per-host rollup over a coarser period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricHostAggregate {
    aggregate: MetricAggregate,
    number_of_samples: i64,
}

impl MetricHostAggregate {
    pub fn new(sum: f64, number_of_samples: i64, deviation: f64, max: f64, min: f64) -> Self {
        Self {
            aggregate: MetricAggregate::new(sum, deviation, max, min),
            number_of_samples,
        }
    }

    /// Stored sample count, reported as 1 when nothing was counted.
    pub fn number_of_samples(&self) -> i64 {
        if self.number_of_samples == 0 {
            1
        } else {
            self.number_of_samples
        }
    }

    pub fn update_number_of_samples(&mut self, count: i64) {
        self.number_of_samples += count;
    }

    pub fn avg(&self) -> f64 {
        self.sum() / self.number_of_samples() as f64
    }

    /// Fold another host aggregate (e.g. a finer-tier row) into this one.
    pub fn update_aggregates(&mut self, other: &MetricHostAggregate) {
        self.update_sum(other.sum());
        self.update_max(other.max());
        self.update_min(other.min());
        self.update_number_of_samples(other.number_of_samples);
    }
}

impl AggregateStats for MetricHostAggregate {
    fn base(&self) -> &MetricAggregate {
        &self.aggregate
    }

    fn base_mut(&mut self) -> &mut MetricAggregate {
        &mut self.aggregate
    }
}

/// Rollup across hosts for one (metric, app, instance, timestamp).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricClusterAggregate {
    aggregate: MetricAggregate,
    number_of_hosts: i32,
}

impl MetricClusterAggregate {
    pub fn new(sum: f64, number_of_hosts: i32, deviation: f64, max: f64, min: f64) -> Self {
        Self {
            aggregate: MetricAggregate::new(sum, deviation, max, min),
            number_of_hosts,
        }
    }

    /// First value from a single host.
    pub fn from_value(value: f64) -> Self {
        Self::new(value, 1, 0.0, value, value)
    }

    pub fn number_of_hosts(&self) -> i32 {
        self.number_of_hosts
    }

    pub fn update_number_of_hosts(&mut self, count: i32) {
        self.number_of_hosts += count;
    }

    /// Fold one more host's value.
    pub fn add_host_value(&mut self, value: f64) {
        self.update_sum(value);
        self.update_number_of_hosts(1);
        self.update_max(value);
        self.update_min(value);
    }
}

impl AggregateStats for MetricClusterAggregate {
    fn base(&self) -> &MetricAggregate {
        &self.aggregate
    }

    fn base_mut(&mut self) -> &mut MetricAggregate {
        &mut self.aggregate
    }
}
