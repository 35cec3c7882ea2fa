// Segment-aware aggregation of finalized series for bounded point budgets

use std::ops::Range;
use tracing::debug;

use crate::core::constants::{GAP_FACTOR, REDUCTION_STEPS, STD_ENVELOPE_THRESHOLD};
use crate::core::series::{AggregateBucket, Series, TimeRange, ValueKind};
use crate::core::stats::{self, ceil_div, summarize};

/// Smallest step not below `requested`; saturates at the largest step.
pub fn next_reduction_factor(requested: usize) -> usize {
    REDUCTION_STEPS
        .iter()
        .copied()
        .find(|step| *step >= requested)
        .unwrap_or(REDUCTION_STEPS[REDUCTION_STEPS.len() - 1])
}

/// Unstepped factor needed to fit `points` into `budget`.
pub fn reduction_factor_for(points: usize, budget: usize) -> usize {
    ceil_div(points, budget.max(1)).max(1)
}

pub fn full_zoom_reduction_factor(len: usize, budget: usize) -> usize {
    if budget == 0 {
        return 1;
    }
    next_reduction_factor(len / budget)
}

/// Inclusive index ranges split wherever consecutive timestamps are further apart than
/// `gap_threshold`.
pub fn create_segments(timestamps: &[f64], gap_threshold: f64) -> Vec<(usize, usize)> {
    if timestamps.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut segment_start = 0;

    for j in 1..timestamps.len() {
        if timestamps[j] - timestamps[j - 1] > gap_threshold {
            segments.push((segment_start, j - 1));
            segment_start = j;
        }
    }
    segments.push((segment_start, timestamps.len() - 1));

    segments
}

/// Buckets of `reduction_factor` samples per segment, each segment closed by a gap bucket.
pub fn calculate_aggregates(
    timestamps: &[f64],
    values: &[f64],
    delta_t: f64,
    reduction_factor: usize,
) -> Vec<AggregateBucket> {
    let reduction_factor = reduction_factor.max(1);
    let segments = create_segments(timestamps, delta_t * GAP_FACTOR);

    let mut aggregates = Vec::with_capacity(values.len() / reduction_factor + segments.len() + 1);

    for (start, end) in segments {
        let segment_values = &values[start..=end];
        let segment_dates = &timestamps[start..=end];

        for (value_block, date_block) in segment_values
            .chunks(reduction_factor)
            .zip(segment_dates.chunks(reduction_factor))
        {
            let Some(summary) = summarize(value_block) else {
                continue;
            };
            aggregates.push(AggregateBucket {
                date: date_block[0],
                min: summary.min,
                max: summary.max,
                mean: summary.mean,
                std: summary.std,
                first: value_block[0],
            });
        }

        aggregates.push(AggregateBucket::gap(segment_dates[segment_dates.len() - 1]));
    }

    aggregates.shrink_to_fit();
    aggregates
}

/// Value range as it would be drawn at `reduction_factor`: raw samples, block min/max, or
/// block mean ± std once the reduction reaches the std envelope threshold.
pub fn value_range_aggregated(values: &[f64], reduction_factor: usize) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }

    let reduction_factor = reduction_factor.max(1);
    let mut min_val = f64::INFINITY;
    let mut max_val = f64::NEG_INFINITY;

    for block in values.chunks(reduction_factor) {
        let (lo, hi) = if reduction_factor == 1 {
            (block[0], block[0])
        } else if reduction_factor <= STD_ENVELOPE_THRESHOLD {
            (stats::min(block), stats::max(block))
        } else {
            let mean = stats::mean(block);
            let std = stats::std_dev(block, mean);
            (mean - std, mean + std)
        };

        min_val = min_val.min(lo);
        max_val = max_val.max(hi);
    }

    Some((min_val, max_val))
}

/// First and last sample index covering `range`, with one sample of look-behind.
pub fn sample_index_range(timestamps: &[f64], range: TimeRange) -> (usize, usize) {
    if timestamps.is_empty() {
        return (0, 0);
    }

    let start = timestamps.partition_point(|t| *t < range.start);
    let stop = timestamps.partition_point(|t| *t <= range.end);

    (start.saturating_sub(1), stop.min(timestamps.len() - 1))
}

/// Buckets to hand to the renderer for `range`.
pub fn bucket_index_range(buckets: &[AggregateBucket], range: TimeRange) -> Range<usize> {
    if buckets.is_empty() {
        return 0..0;
    }

    let start = buckets.partition_point(|b| b.date < range.start);
    let stop = buckets.partition_point(|b| b.date <= range.end);

    let start = start.saturating_sub(1);
    let stop = stop.min(buckets.len() - 1);
    let count = (stop + 1).saturating_sub(start).min(buckets.len());

    start..(start + count).min(buckets.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotStyle {
    /// Boolean series, drawn from `first`.
    Digital,
    /// Unreduced line, drawn from `first`.
    Line,
    /// Mean line inside the block min/max.
    MinMax,
    /// Mean line inside mean ± std.
    StdDev,
}

impl PlotStyle {
    pub fn select(kind: ValueKind, requested_factor: usize) -> Self {
        match kind {
            ValueKind::Boolean => PlotStyle::Digital,
            ValueKind::Continuous if requested_factor <= 1 => PlotStyle::Line,
            ValueKind::Continuous if requested_factor >= STD_ENVELOPE_THRESHOLD => PlotStyle::StdDev,
            ValueKind::Continuous => PlotStyle::MinMax,
        }
    }
}

/// Visible buckets of one series with the way they should be drawn.
#[derive(Debug, Clone, Copy)]
pub struct PlotWindow<'a> {
    pub buckets: &'a [AggregateBucket],
    pub requested_factor: usize,
    pub reduction_factor: usize,
    pub style: PlotStyle,
}

impl PlotWindow<'_> {
    pub fn line(&self) -> Vec<(f64, f64)> {
        self.buckets
            .iter()
            .map(|b| match self.style {
                PlotStyle::Digital | PlotStyle::Line => (b.date, b.first),
                PlotStyle::MinMax | PlotStyle::StdDev => (b.date, b.mean),
            })
            .collect()
    }

    /// `(date, lower, upper)` for envelope styles.
    pub fn band(&self) -> Option<Vec<(f64, f64, f64)>> {
        let band = match self.style {
            PlotStyle::Digital | PlotStyle::Line => return None,
            PlotStyle::MinMax => self.buckets.iter().map(|b| (b.date, b.min, b.max)).collect(),
            PlotStyle::StdDev => self
                .buckets
                .iter()
                .map(|b| (b.date, b.mean - b.std, b.mean + b.std))
                .collect(),
        };
        Some(band)
    }
}

impl Series {
    /// Recomputes the aggregation cache unless it already holds `reduction_factor`.
    /// Returns whether a recomputation happened.
    pub fn recompute_if_stale(&mut self, reduction_factor: usize) -> bool {
        if self.cache.is_valid_for(reduction_factor) {
            return false;
        }

        debug!(
            "recalculating aggregates for {} with reduction factor {}",
            self.name, reduction_factor
        );

        self.cache.buckets = calculate_aggregates(
            &self.timestamps,
            &self.values,
            self.delta_t,
            reduction_factor,
        );
        self.cache.reduction_factor = reduction_factor;
        true
    }

    /// Unstepped reduction needed to show `range` within `point_budget`.
    pub fn requested_reduction(&self, range: TimeRange, point_budget: usize) -> usize {
        let (start, stop) = sample_index_range(&self.timestamps, range);
        reduction_factor_for(stop.saturating_sub(start), point_budget)
    }

    pub fn get_buckets(&mut self, range: TimeRange, point_budget: usize) -> &[AggregateBucket] {
        self.plot_window(range, point_budget).buckets
    }

    pub fn plot_window(&mut self, range: TimeRange, point_budget: usize) -> PlotWindow<'_> {
        let requested_factor = self.requested_reduction(range, point_budget);
        let reduction_factor = next_reduction_factor(requested_factor);
        self.recompute_if_stale(reduction_factor);

        let style = PlotStyle::select(self.kind, requested_factor);
        let buckets = self.cache.buckets();
        let window = bucket_index_range(buckets, range);

        PlotWindow {
            buckets: &buckets[window],
            requested_factor,
            reduction_factor,
            style,
        }
    }

    /// Value range of the whole series at full zoom, cached until the budget changes.
    pub fn full_zoom_range(&mut self, point_budget: usize) -> Option<(f64, f64)> {
        if self.fit_range.point_budget != Some(point_budget) {
            let factor = full_zoom_reduction_factor(self.len(), point_budget);
            self.fit_range.range = value_range_aggregated(&self.values, factor);
            self.fit_range.point_budget = Some(point_budget);
        }
        self.fit_range.range
    }
}

pub fn get_buckets(
    series: &mut Series,
    range: TimeRange,
    point_budget: usize,
) -> &[AggregateBucket] {
    series.get_buckets(range, point_budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn series(timestamps: Vec<f64>, values: Vec<f64>) -> Series {
        Series::new("s".into(), String::new(), timestamps, values)
    }

    fn regular(n: usize) -> Series {
        let ts = (0..n).map(|i| i as f64).collect();
        let vals = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();
        series(ts, vals)
    }

    fn everything() -> TimeRange {
        TimeRange::new(f64::MIN, f64::MAX)
    }

    #[test]
    fn test_reduction_steps() {
        assert_eq!(next_reduction_factor(0), 1);
        assert_eq!(next_reduction_factor(1), 1);
        assert_eq!(next_reduction_factor(2), 10);
        assert_eq!(next_reduction_factor(237), 500);
        assert_eq!(next_reduction_factor(500), 500);
        assert_eq!(next_reduction_factor(20_000_000), 10_000_000);
    }

    #[test]
    fn test_requested_factor_from_budget() {
        assert_eq!(reduction_factor_for(0, 100), 1);
        assert_eq!(reduction_factor_for(1000, 10), 100);
        assert_eq!(reduction_factor_for(1001, 10), 101);
        assert_eq!(reduction_factor_for(50, 0), 50);
        assert_eq!(full_zoom_reduction_factor(5_000, 10_000), 1);
        assert_eq!(full_zoom_reduction_factor(1_000_000, 10_000), 100);
    }

    #[test]
    fn test_segments_split_on_gaps() {
        let ts = [0.0, 1.0, 2.0, 50.0, 51.0, 200.0];
        assert_eq!(create_segments(&ts, 10.0), vec![(0, 2), (3, 4), (5, 5)]);
        assert_eq!(create_segments(&[], 10.0), vec![]);
        assert_eq!(create_segments(&[3.0], 10.0), vec![(0, 0)]);
    }

    #[test]
    fn test_buckets_and_gap_terminator() {
        let ts: Vec<f64> = (0..7).map(f64::from).collect();
        let vals = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let buckets = calculate_aggregates(&ts, &vals, 1.0, 3);

        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].date, 0.0);
        assert_eq!(buckets[0].mean, 2.0);
        assert_eq!(buckets[0].min, 1.0);
        assert_eq!(buckets[0].max, 3.0);
        assert_eq!(buckets[1].first, 4.0);
        // single trailing sample
        assert_eq!(buckets[2].mean, 7.0);
        assert_eq!(buckets[2].std, 0.0);
        assert!(buckets[3].is_gap());
        assert_eq!(buckets[3].date, 6.0);
    }

    #[test]
    fn test_bucket_invariant_holds() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut t = 0.0;
        let mut ts = Vec::new();
        let mut vals = Vec::new();
        for _ in 0..5_000 {
            t += if rng.gen_bool(0.01) { 500.0 } else { 1.0 };
            ts.push(t);
            vals.push(rng.gen_range(-1e6..1e6));
        }
        let s = series(ts, vals);

        for factor in [1, 10, 50, 100, 500, 1_000] {
            let buckets = calculate_aggregates(&s.timestamps, &s.values, s.delta_t, factor);
            for b in buckets.iter().filter(|b| !b.is_gap()) {
                assert!(b.min <= b.mean && b.mean <= b.max, "{:?}", b);
                assert!(b.std >= 0.0);
            }
        }
    }

    #[test]
    fn test_bucket_invariant_at_extreme_magnitudes() {
        let ts = [0.0, 1.0, 2.0, 3.0];
        for vals in [
            vec![f64::MAX; 4],
            vec![f64::MAX, -f64::MAX, f64::MAX, f64::MAX],
        ] {
            let buckets = calculate_aggregates(&ts, &vals, 1.0, 10);
            let b = buckets[0];
            assert!(b.min <= b.mean && b.mean <= b.max, "{:?}", b);
            assert!(b.std.is_finite() && b.std >= 0.0, "{:?}", b);
        }
    }

    #[test]
    fn test_gap_survives_every_reduction_factor() {
        let mut ts: Vec<f64> = (0..1_000).map(f64::from).collect();
        ts.extend((0..1_000).map(|i| 5_000.0 + f64::from(i)));
        let vals = vec![1.0; ts.len()];
        let s = series(ts, vals);
        assert_eq!(s.delta_t, 1.0);

        for factor in REDUCTION_STEPS {
            let buckets = calculate_aggregates(&s.timestamps, &s.values, s.delta_t, factor);
            let gap = buckets
                .iter()
                .position(|b| b.is_gap() && b.date == 999.0)
                .unwrap_or_else(|| panic!("no gap bucket at factor {}", factor));
            assert_eq!(buckets[gap + 1].date, 5_000.0);
            assert!(buckets.last().unwrap().is_gap());
        }
    }

    #[test]
    fn test_get_buckets_is_idempotent() {
        let mut s = regular(100_000);
        let range = TimeRange::new(10_000.0, 59_000.0);

        let first: Vec<u64> = s
            .get_buckets(range, 1_000)
            .iter()
            .flat_map(|b| [b.date, b.min, b.max, b.mean, b.std, b.first])
            .map(f64::to_bits)
            .collect();
        assert_eq!(s.cache().reduction_factor(), 50);
        assert!(!s.recompute_if_stale(50));

        let second: Vec<u64> = s
            .get_buckets(range, 1_000)
            .iter()
            .flat_map(|b| [b.date, b.min, b.max, b.mean, b.std, b.first])
            .map(f64::to_bits)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_small_zoom_change_reuses_cache() {
        let mut s = regular(100_000);
        s.get_buckets(TimeRange::new(0.0, 30_000.0), 1_000);
        assert_eq!(s.cache().reduction_factor(), 50);
        s.get_buckets(TimeRange::new(0.0, 35_000.0), 1_000);
        assert_eq!(s.cache().reduction_factor(), 50);
        s.get_buckets(TimeRange::new(0.0, 90_000.0), 1_000);
        assert_eq!(s.cache().reduction_factor(), 100);
    }

    #[test]
    fn test_visible_window_is_bounded() {
        let mut s = regular(1_000_000);
        let window = s.plot_window(everything(), 10_000);
        assert_eq!(window.requested_factor, 100);
        assert_eq!(window.reduction_factor, 100);
        assert_eq!(window.style, PlotStyle::StdDev);
        assert!(window.buckets.len() <= 10_001);

        let window = s.plot_window(TimeRange::new(1_000.0, 2_000.0), 100);
        assert_eq!(window.requested_factor, 11);
        assert_eq!(window.reduction_factor, 50);
        assert_eq!(window.style, PlotStyle::MinMax);
        assert!(window.buckets.first().unwrap().date <= 1_000.0);
        assert!(window.buckets.last().unwrap().date >= 1_950.0);
        let band = window.band().unwrap();
        assert!(band.iter().all(|(_, lo, hi)| lo <= hi));
    }

    #[test]
    fn test_unreduced_and_boolean_windows_use_first() {
        let mut s = regular(100);
        let expected = s.values[5];
        let window = s.plot_window(everything(), 1_000);
        assert_eq!(window.style, PlotStyle::Line);
        assert!(window.band().is_none());
        assert_eq!(window.line()[5], (5.0, expected));

        let ts: Vec<f64> = (0..1_000).map(f64::from).collect();
        let vals: Vec<f64> = (0..1_000).map(|i| f64::from(i % 2)).collect();
        let mut b = series(ts, vals);
        let window = b.plot_window(everything(), 10);
        assert_eq!(window.style, PlotStyle::Digital);
        assert!(window
            .line()
            .iter()
            .all(|(_, v)| v.is_nan() || *v == 0.0 || *v == 1.0));
    }

    #[test]
    fn test_bucket_index_range_looks_behind() {
        let buckets: Vec<AggregateBucket> = (0..10)
            .map(|i| AggregateBucket {
                date: f64::from(i) * 10.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                std: 0.0,
                first: 0.0,
            })
            .collect();

        assert_eq!(bucket_index_range(&buckets, TimeRange::new(25.0, 45.0)), 2..5);
        assert_eq!(bucket_index_range(&buckets, TimeRange::new(-50.0, -10.0)), 0..1);
        assert_eq!(bucket_index_range(&buckets, TimeRange::new(500.0, 600.0)), 9..10);
        assert_eq!(bucket_index_range(&[], TimeRange::new(0.0, 1.0)), 0..0);
    }

    #[test]
    fn test_full_zoom_range_cached_per_budget() {
        let ts: Vec<f64> = (0..1_000).map(f64::from).collect();
        let vals: Vec<f64> = (0..1_000).map(|i| f64::from(i % 10)).collect();
        let mut s = series(ts, vals);

        assert_eq!(s.full_zoom_range(10_000), Some((0.0, 9.0)));
        assert_eq!(s.fit_range.point_budget, Some(10_000));

        // 1000 / 100 = 10: block min/max
        assert_eq!(s.full_zoom_range(100), Some((0.0, 9.0)));

        // 1000 / 1 = 1000: mean ± std of one block
        let (lo, hi) = s.full_zoom_range(1).unwrap();
        assert!((lo - (4.5 - 8.25_f64.sqrt())).abs() < 1e-9);
        assert!((hi - (4.5 + 8.25_f64.sqrt())).abs() < 1e-9);

        assert_eq!(series(vec![], vec![]).full_zoom_range(10), None);
    }

    #[test]
    fn test_empty_series_has_no_buckets() {
        let mut s = series(vec![], vec![]);
        assert!(s.get_buckets(everything(), 100).is_empty());
    }
}
