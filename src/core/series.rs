// Finalized per-channel series

use serde::Serialize;
use uuid::Uuid;

use crate::core::stats::{consecutive_deltas, median_interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueKind {
    Continuous,
    Boolean,
}

impl ValueKind {
    pub fn classify(values: &[f64]) -> Self {
        if values.iter().all(|v| *v == 0.0 || *v == 1.0) {
            ValueKind::Boolean
        } else {
            ValueKind::Continuous
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateBucket {
    pub date: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub first: f64,
}

impl AggregateBucket {
    /// Segment terminator.
    pub fn gap(date: f64) -> Self {
        Self {
            date,
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            std: f64::NAN,
            first: f64::NAN,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.mean.is_nan() && self.first.is_nan()
    }
}

/// Buckets computed for exactly one reduction factor.
#[derive(Debug, Clone, Default)]
pub struct AggregationCache {
    pub(crate) reduction_factor: usize,
    pub(crate) buckets: Vec<AggregateBucket>,
}

impl AggregationCache {
    pub fn reduction_factor(&self) -> usize {
        self.reduction_factor
    }

    pub fn buckets(&self) -> &[AggregateBucket] {
        &self.buckets
    }

    pub fn is_valid_for(&self, reduction_factor: usize) -> bool {
        self.reduction_factor == reduction_factor && !self.buckets.is_empty()
    }
}

/// Whole-series value range, keyed by the point budget it was computed for.
#[derive(Debug, Clone, Default)]
pub(crate) struct FitRangeCache {
    pub(crate) point_budget: Option<usize>,
    pub(crate) range: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub id: Uuid,
    pub unit: String,
    pub kind: ValueKind,
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
    pub delta_t: f64,
    pub visible: bool,
    pub(crate) cache: AggregationCache,
    pub(crate) fit_range: FitRangeCache,
}

impl Series {
    /// Builds a series from points already sorted by timestamp.
    pub fn from_sorted_points(name: String, unit: String, points: &[(f64, f64)]) -> Self {
        let timestamps: Vec<f64> = points.iter().map(|(t, _)| *t).collect();
        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        Self::new(name, unit, timestamps, values)
    }

    /// Unpaired samples past the shorter of the two vectors are dropped.
    pub fn new(name: String, unit: String, mut timestamps: Vec<f64>, mut values: Vec<f64>) -> Self {
        let len = timestamps.len().min(values.len());
        timestamps.truncate(len);
        values.truncate(len);

        let kind = ValueKind::classify(&values);
        let delta_t = median_interval(consecutive_deltas(&timestamps));

        Self {
            name,
            id: Uuid::new_v4(),
            unit,
            kind,
            timestamps,
            values,
            delta_t,
            visible: false,
            cache: AggregationCache::default(),
            fit_range: FitRangeCache::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == ValueKind::Boolean
    }

    pub fn cache(&self) -> &AggregationCache {
        &self.cache
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Raw sample closest to `t`; a tie goes to the later sample.
    pub fn nearest_sample(&self, t: f64) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }

        let index = self.timestamps.partition_point(|ts| *ts < t);
        if index == self.len() {
            let last = self.len() - 1;
            return Some((self.timestamps[last], self.values[last]));
        }

        if index > 0 {
            let prev = index - 1;
            if t - self.timestamps[prev] < self.timestamps[index] - t {
                return Some((self.timestamps[prev], self.values[prev]));
            }
        }

        Some((self.timestamps[index], self.values[index]))
    }
}

/// Earliest and latest timestamp over all visible series.
pub fn time_extent(series: &[Series]) -> Option<TimeRange> {
    series
        .iter()
        .filter(|s| s.visible)
        .filter_map(|s| Some((s.first_timestamp()?, s.last_timestamp()?)))
        .fold(None, |acc, (lo, hi)| match acc {
            None => Some(TimeRange::new(lo, hi)),
            Some(r) => Some(TimeRange::new(r.start.min(lo), r.end.max(hi))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(ts: &[f64], vals: &[f64]) -> Series {
        Series::new("s".into(), String::new(), ts.to_vec(), vals.to_vec())
    }

    #[test]
    fn test_boolean_classification() {
        assert_eq!(ValueKind::classify(&[0.0, 1.0, 1.0]), ValueKind::Boolean);
        assert_eq!(ValueKind::classify(&[0.0, 0.5, 1.0]), ValueKind::Continuous);
        assert_eq!(ValueKind::classify(&[2.0]), ValueKind::Continuous);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = series(&[0.0], &[1.0]);
        let b = series(&[0.0], &[1.0]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_mismatched_lengths_are_truncated() {
        let mut s = series(&[0.0, 1.0, 2.0], &[5.0, 6.0]);
        assert_eq!(s.timestamps, vec![0.0, 1.0]);
        assert_eq!(s.values, vec![5.0, 6.0]);
        assert_eq!(s.get_buckets(TimeRange::new(0.0, 2.0), 10).len(), 3);

        let s = series(&[0.0], &[5.0, 6.0, 7.0]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.values, vec![5.0]);
    }

    #[test]
    fn test_delta_t_is_median_interval() {
        let s = series(&[0.0, 10.0, 20.0, 1000.0], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.delta_t, 10.0);
    }

    #[test]
    fn test_nearest_sample() {
        let s = series(&[0.0, 10.0, 20.0], &[1.0, 2.0, 3.0]);
        assert_eq!(s.nearest_sample(-5.0), Some((0.0, 1.0)));
        assert_eq!(s.nearest_sample(4.0), Some((0.0, 1.0)));
        assert_eq!(s.nearest_sample(5.0), Some((10.0, 2.0)));
        assert_eq!(s.nearest_sample(99.0), Some((20.0, 3.0)));
        assert_eq!(series(&[], &[]).nearest_sample(1.0), None);
    }

    #[test]
    fn test_time_extent_only_counts_visible() {
        let mut a = series(&[5.0, 10.0], &[1.0, 2.0]);
        let mut b = series(&[0.0, 30.0], &[1.0, 2.0]);
        a.visible = true;
        assert_eq!(time_extent(&[a.clone(), b.clone()]), Some(TimeRange::new(5.0, 10.0)));
        b.visible = true;
        assert_eq!(time_extent(&[a, b]), Some(TimeRange::new(0.0, 30.0)));
    }
}
