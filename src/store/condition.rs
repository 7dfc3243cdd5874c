// Windowed query description, rendered to SQLite with sqlx::QueryBuilder.

use sqlx::{QueryBuilder, Sqlite};

/// Which end of the window is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    /// `start <= SERVER_TIME < end`
    HalfOpen,
    /// `start < SERVER_TIME <= end`
    IntervalOpen,
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub table: &'static str,
    pub start_time: i64,
    pub end_time: i64,
    pub time_range: TimeRange,
    pub order_by: Vec<&'static str>,
    /// Page size of the read; `None` reads in one go.
    pub fetch_size: Option<usize>,
    /// Metric-name LIKE patterns; when non-empty a row must match one.
    pub include_metric_patterns: Vec<String>,
    /// Metric-name LIKE patterns; a row matching any is skipped.
    pub exclude_metric_patterns: Vec<String>,
    /// Read everything in the window instead of stopping at the store's result limit.
    pub no_limit: bool,
    /// Run as one mutating group-by statement into `output_table` instead of returning rows.
    pub do_update: bool,
    pub output_table: Option<&'static str>,
}

impl Condition {
    pub fn new(table: &'static str, start_time: i64, end_time: i64, time_range: TimeRange) -> Self {
        Self {
            table,
            start_time,
            end_time,
            time_range,
            order_by: Vec::new(),
            fetch_size: None,
            include_metric_patterns: Vec::new(),
            exclude_metric_patterns: Vec::new(),
            no_limit: false,
            do_update: false,
            output_table: None,
        }
    }

    pub fn order_by(mut self, columns: &[&'static str]) -> Self {
        self.order_by = columns.to_vec();
        self
    }

    pub fn fetch_size(mut self, size: usize) -> Self {
        self.fetch_size = Some(size);
        self
    }

    pub fn exclude_metrics(mut self, patterns: &[String]) -> Self {
        self.exclude_metric_patterns.extend(patterns.iter().cloned());
        self
    }

    pub fn include_metrics(mut self, patterns: &[String]) -> Self {
        self.include_metric_patterns.extend(patterns.iter().cloned());
        self
    }

    pub fn no_limit(mut self) -> Self {
        self.no_limit = true;
        self
    }

    pub fn update_into(mut self, output_table: &'static str) -> Self {
        self.do_update = true;
        self.output_table = Some(output_table);
        self
    }

    /// Append the WHERE clause (time window plus name filters).
    pub fn push_where<'a>(&'a self, qb: &mut QueryBuilder<'a, Sqlite>) {
        let (lower, upper) = match self.time_range {
            TimeRange::HalfOpen => (">=", "<"),
            TimeRange::IntervalOpen => (">", "<="),
        };
        qb.push(" WHERE SERVER_TIME ")
            .push(lower)
            .push(" ")
            .push_bind(self.start_time)
            .push(" AND SERVER_TIME ")
            .push(upper)
            .push(" ")
            .push_bind(self.end_time);

        if !self.include_metric_patterns.is_empty() {
            qb.push(" AND (");
            for (i, pattern) in self.include_metric_patterns.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("METRIC_NAME LIKE ").push_bind(pattern.as_str());
            }
            qb.push(")");
        }
        for pattern in &self.exclude_metric_patterns {
            qb.push(" AND METRIC_NAME NOT LIKE ")
                .push_bind(pattern.as_str());
        }
    }

    /// `SELECT * ...` for one page of the window.
    pub fn select_query(&self, limit: Option<i64>, offset: i64) -> QueryBuilder<'_, Sqlite> {
        let mut qb = QueryBuilder::new(format!("SELECT * FROM {}", self.table));
        self.push_where(&mut qb);
        if !self.order_by.is_empty() {
            qb.push(" ORDER BY ").push(self.order_by.join(", "));
        }
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
            qb.push(" OFFSET ").push_bind(offset);
        }
        qb
    }

    /// Host rollup as one statement: group the window per host series, stamp it with the window end.
    pub fn host_group_by_query(&self) -> Option<QueryBuilder<'_, Sqlite>> {
        let output = self.output_table?;
        let mut qb = QueryBuilder::new(format!(
            "INSERT OR REPLACE INTO {output} \
             (METRIC_NAME, HOSTNAME, APP_ID, INSTANCE_ID, SERVER_TIME, \
             METRIC_SUM, METRIC_COUNT, METRIC_MAX, METRIC_MIN) \
             SELECT METRIC_NAME, HOSTNAME, APP_ID, INSTANCE_ID, "
        ));
        qb.push_bind(self.end_time);
        qb.push(format!(
            ", SUM(METRIC_SUM), SUM(METRIC_COUNT), MAX(METRIC_MAX), MIN(METRIC_MIN) \
             FROM {}",
            self.table
        ));
        self.push_where(&mut qb);
        qb.push(" GROUP BY METRIC_NAME, HOSTNAME, APP_ID, INSTANCE_ID");
        Some(qb)
    }
}
