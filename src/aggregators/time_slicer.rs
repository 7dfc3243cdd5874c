// Fixed-width time slices, per-slice averaging and gap filling.

use crate::models::{MetricType, TimelineClusterMetric, TimelineMetric};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlice {
    pub start: i64,
    pub end: i64,
}

/// Which slice edge owns a boundary timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceBoundary {
    /// `[start, end)`; minute and coarser tiers.
    HalfOpen,
    /// `(start, end]`; second tier.
    IntervalOpen,
}

impl SliceBoundary {
    pub fn contains(&self, slice: &TimeSlice, ts: i64) -> bool {
        match self {
            SliceBoundary::HalfOpen => slice.start <= ts && ts < slice.end,
            SliceBoundary::IntervalOpen => slice.start < ts && ts <= slice.end,
        }
    }
}

/// Consecutive slices `start, start + interval, ...` while the slice start is before `end`.
/// The last slice is not clipped to `end`.
pub fn time_slices(start: i64, end: i64, interval: i64) -> Vec<TimeSlice> {
    if interval <= 0 {
        return Vec::new();
    }
    let mut slices = Vec::new();
    let mut s = start;
    while s < end {
        slices.push(TimeSlice {
            start: s,
            end: s + interval,
        });
        s += interval;
    }
    slices
}

/// Index of the slice owning `ts`. Slices must be sorted and contiguous.
pub fn slice_for(slices: &[TimeSlice], ts: i64, boundary: SliceBoundary) -> Option<usize> {
    let idx = match boundary {
        SliceBoundary::HalfOpen => slices.partition_point(|s| s.end <= ts),
        SliceBoundary::IntervalOpen => slices.partition_point(|s| s.end < ts),
    };
    slices
        .get(idx)
        .filter(|s| boundary.contains(s, ts))
        .map(|_| idx)
}

/// Running sum and count per slice index over `[start, end)` slices.
pub fn sum_into_slices<I>(samples: I, slices: &[TimeSlice]) -> BTreeMap<usize, (f64, u32)>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    let mut acc: BTreeMap<usize, (f64, u32)> = BTreeMap::new();
    for (ts, value) in samples {
        match slice_for(slices, ts, SliceBoundary::HalfOpen) {
            Some(idx) => {
                let entry = acc.entry(idx).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
            None => trace!(ts, "sample outside every slice, dropped"),
        }
    }
    acc
}

/// Minute-tier averaging: slice index -> mean of the samples landing in it.
pub fn average_into_slices<I>(samples: I, slices: &[TimeSlice]) -> BTreeMap<usize, f64>
where
    I: IntoIterator<Item = (i64, f64)>,
{
    sum_into_slices(samples, slices)
        .into_iter()
        .map(|(idx, (sum, count))| (idx, sum / count as f64))
        .collect()
}

/// Linear value at `t` between two points. A missing value yields the other one;
/// a missing timestamp (with both values present) yields nothing.
pub fn interpolate(
    t: i64,
    t1: Option<i64>,
    v1: Option<f64>,
    t2: Option<i64>,
    v2: Option<f64>,
) -> Option<f64> {
    let Some(v1) = v1 else {
        return v2;
    };
    let Some(v2) = v2 else {
        return Some(v1);
    };
    let (t1, t2) = (t1?, t2?);
    if t1 == t2 {
        return Some(v1);
    }
    let slope = (v2 - v1) / (t2 - t1) as f64;
    Some(v1 + slope * (t - t1) as f64)
}

/// Server receive time minus client start time, clamped at zero.
fn time_shift(metric: &TimelineMetric) -> i64 {
    let Some(start) = metric.start_time else {
        debug!(metric = %metric.metric_name, host = %metric.hostname, "no start time, time shift 0");
        return 0;
    };
    let shift = metric.timestamp - start;
    if shift < 0 {
        debug!(metric = %metric.metric_name, host = %metric.hostname, shift, "negative time shift clamped to 0");
        return 0;
    }
    shift
}

/// Second-tier slicing of one host series: streaming per-slice averages over `(start, end]`
/// slices, then optional gap fill. Keys are stamped with the slice end.
pub fn slice_timeline_metric(
    metric: &TimelineMetric,
    slices: &[TimeSlice],
    interpolation_enabled: bool,
) -> HashMap<TimelineClusterMetric, f64> {
    let shift = time_shift(metric);
    let mut values: Vec<Option<f64>> = vec![None; slices.len()];
    let mut raw: Vec<(i64, f64)> = Vec::new();
    let mut outside: Option<f64> = None;
    let mut pending: Option<(usize, f64, u32)> = None;

    for (ts, value) in metric.present_values() {
        let ts = ts + shift;
        raw.push((ts, value));
        let Some(idx) = slice_for(slices, ts, SliceBoundary::IntervalOpen) else {
            trace!(metric = %metric.metric_name, ts, "sample outside every slice");
            outside.get_or_insert(value);
            continue;
        };
        pending = match pending {
            Some((p, sum, count)) if p == idx => Some((p, sum + value, count + 1)),
            Some((p, sum, count)) => {
                values[p] = Some(sum / count as f64);
                Some((idx, value, 1))
            }
            None => Some((idx, value, 1)),
        };
    }
    if let Some((p, sum, count)) = pending {
        values[p] = Some(sum / count as f64);
    }

    if interpolation_enabled && values.iter().any(Option::is_none) {
        match metric.metric_type {
            MetricType::Counter => fill_counter(&mut values, slices, &raw),
            MetricType::Gauge => fill_gauge(&mut values, slices, outside),
        }
    }

    slices
        .iter()
        .zip(values)
        .filter_map(|(slice, v)| v.map(|v| (metric.cluster_metric(slice.end), v)))
        .collect()
}

/// Linear interpolation between the raw points around each empty slice end,
/// extrapolating past the first and last points.
fn fill_counter(values: &mut [Option<f64>], slices: &[TimeSlice], raw: &[(i64, f64)]) {
    if raw.len() < 2 {
        return;
    }
    for (slot, slice) in values.iter_mut().zip(slices) {
        if slot.is_some() {
            continue;
        }
        let t = slice.end;
        let after = raw.partition_point(|(ts, _)| *ts < t);
        let (a, b) = if after == 0 {
            (raw[0], raw[1])
        } else if after >= raw.len() {
            (raw[raw.len() - 2], raw[raw.len() - 1])
        } else {
            (raw[after - 1], raw[after])
        };
        *slot = interpolate(t, Some(a.0), Some(a.1), Some(b.0), Some(b.1));
    }
}

/// Nearest filled slice on each side. Without a forward neighbour, the first sample that
/// landed outside every slice stands in as the value at the last slice end.
fn fill_gauge(values: &mut [Option<f64>], slices: &[TimeSlice], outside: Option<f64>) {
    let filled: Vec<Option<f64>> = values.to_vec();
    let fallback = slices.last().zip(outside).map(|(last, v)| (last.end, v));
    for i in 0..values.len() {
        if filled[i].is_some() {
            continue;
        }
        let prev = (0..i)
            .rev()
            .find_map(|j| filled[j].map(|v| (slices[j].end, v)));
        let next = (i + 1..filled.len()).find_map(|k| filled[k].map(|v| (slices[k].end, v)));
        let next = next.or(fallback);
        values[i] = interpolate(
            slices[i].end,
            prev.map(|p| p.0),
            prev.map(|p| p.1),
            next.map(|n| n.0),
            next.map(|n| n.1),
        );
    }
}
