// Configured downsamplers. `topn` keeps only the busiest hosts of matching metrics in the
// host tiers; `event` makes the cluster-time tiers sum matching metrics instead of averaging.

use crate::models::{AggregateStats, MetricHostAggregate, TimelineHostMetric};
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DownsamplerError {
    #[error("downsampler entry has no `type`")]
    MissingType,
    #[error("unknown downsampler type {0:?}")]
    UnknownType(String),
    #[error("downsampler has no `metric_patterns`")]
    MissingPatterns,
    #[error("topn downsampler needs a positive integer `top_n`")]
    InvalidTopN,
    #[error("unknown topn function {0:?}")]
    UnknownFunction(String),
    #[error("bad metric pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Metric names matched with SQL LIKE semantics (`%` any run, `_` one character).
#[derive(Debug, Clone)]
pub struct MetricPatterns {
    regexes: Vec<Regex>,
}

impl MetricPatterns {
    pub fn new(patterns: &[String]) -> Result<Self, DownsamplerError> {
        let regexes = patterns
            .iter()
            .map(|p| {
                Regex::new(&like_to_regex(p)).map_err(|source| DownsamplerError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { regexes })
    }

    pub fn matches(&self, metric_name: &str) -> bool {
        self.regexes.iter().any(|r| r.is_match(metric_name))
    }
}

fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopNFunction {
    Max,
    Min,
    Avg,
    Sum,
}

impl TopNFunction {
    fn value(&self, agg: &MetricHostAggregate) -> f64 {
        match self {
            TopNFunction::Max => agg.max(),
            TopNFunction::Min => agg.min(),
            TopNFunction::Avg => agg.avg(),
            TopNFunction::Sum => agg.sum(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopNDownsampler {
    patterns: MetricPatterns,
    top_n: usize,
    function: TopNFunction,
}

impl TopNDownsampler {
    pub fn new(patterns: MetricPatterns, top_n: usize, function: TopNFunction) -> Self {
        Self {
            patterns,
            top_n,
            function,
        }
    }

    /// Drop all but the `top_n` highest-ranked hosts of each matching series.
    pub fn apply(&self, aggregates: &mut HashMap<TimelineHostMetric, MetricHostAggregate>) {
        let mut groups: HashMap<(String, String, Option<String>, i64), Vec<(TimelineHostMetric, f64)>> =
            HashMap::new();
        for (key, agg) in aggregates.iter() {
            if self.patterns.matches(&key.metric_name) {
                groups
                    .entry((
                        key.metric_name.clone(),
                        key.app_id.clone(),
                        key.instance_id.clone(),
                        key.timestamp,
                    ))
                    .or_default()
                    .push((key.clone(), self.function.value(agg)));
            }
        }
        for (_, mut hosts) in groups {
            if hosts.len() <= self.top_n {
                continue;
            }
            hosts.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.hostname.cmp(&b.0.hostname)));
            for (key, _) in hosts.into_iter().skip(self.top_n) {
                aggregates.remove(&key);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventDownsampler {
    patterns: MetricPatterns,
}

impl EventDownsampler {
    pub fn matches(&self, metric_name: &str) -> bool {
        self.patterns.matches(metric_name)
    }
}

#[derive(Debug, Clone)]
pub enum Downsampler {
    TopN(TopNDownsampler),
    Event(EventDownsampler),
}

impl TryFrom<&toml::Table> for Downsampler {
    type Error = DownsamplerError;

    fn try_from(table: &toml::Table) -> Result<Self, Self::Error> {
        let kind = table
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(DownsamplerError::MissingType)?;
        let raw_patterns: Vec<String> = table
            .get("metric_patterns")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|p| p.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if raw_patterns.is_empty() {
            return Err(DownsamplerError::MissingPatterns);
        }
        let patterns = MetricPatterns::new(&raw_patterns)?;

        match kind.to_ascii_lowercase().as_str() {
            "topn" => {
                let top_n = table
                    .get("top_n")
                    .and_then(|v| v.as_integer())
                    .filter(|n| *n > 0)
                    .ok_or(DownsamplerError::InvalidTopN)? as usize;
                let function = match table.get("function").and_then(|v| v.as_str()) {
                    None => TopNFunction::Max,
                    Some(f) => match f.to_ascii_lowercase().as_str() {
                        "max" => TopNFunction::Max,
                        "min" => TopNFunction::Min,
                        "avg" => TopNFunction::Avg,
                        "sum" => TopNFunction::Sum,
                        _ => return Err(DownsamplerError::UnknownFunction(f.to_string())),
                    },
                };
                Ok(Downsampler::TopN(TopNDownsampler::new(patterns, top_n, function)))
            }
            "event" => Ok(Downsampler::Event(EventDownsampler { patterns })),
            other => Err(DownsamplerError::UnknownType(other.to_string())),
        }
    }
}

/// Parse every entry; bad entries are logged and skipped.
pub fn parse_downsamplers(entries: &[toml::Table]) -> Vec<Downsampler> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match Downsampler::try_from(entry) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(index, error = %e, "skipping malformed downsampler");
                None
            }
        })
        .collect()
}
