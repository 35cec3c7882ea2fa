// Numeric helpers shared by aggregation and downsampling

use crate::core::constants::MIN_STAT_SAMPLES;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

pub fn mean<T: Copy + Into<f64>>(data: &[T]) -> f64 {
    let n = data.len() as f64;
    let sum: f64 = data.iter().map(|v| (*v).into()).sum();
    if sum.is_finite() {
        return sum / n;
    }
    // the sum of finite samples can overflow near f64::MAX
    data.iter().map(|v| (*v).into() / n).sum()
}

pub fn min<T: Copy + Into<f64>>(data: &[T]) -> f64 {
    data.iter().map(|v| (*v).into()).fold(f64::INFINITY, f64::min)
}

pub fn max<T: Copy + Into<f64>>(data: &[T]) -> f64 {
    data.iter().map(|v| (*v).into()).fold(f64::NEG_INFINITY, f64::max)
}

/// Population standard deviation around `mean`.
pub fn std_dev<T: Copy + Into<f64>>(data: &[T], mean: f64) -> f64 {
    let n = data.len() as f64;
    let sum_sq: f64 = data
        .iter()
        .map(|v| {
            let d = (*v).into() - mean;
            d * d
        })
        .sum();
    let std = (sum_sq / n).sqrt();
    if std.is_finite() || !mean.is_finite() {
        return std;
    }

    // squared deviations overflowed: rescale by the largest magnitude
    let scale = data
        .iter()
        .map(|v| (*v).into().abs())
        .fold(mean.abs(), f64::max);
    if !scale.is_finite() || scale == 0.0 {
        return std;
    }
    let scaled_sq: f64 = data
        .iter()
        .map(|v| {
            let d = (*v).into() / scale - mean / scale;
            d * d
        })
        .sum();
    (scaled_sq / n).sqrt() * scale
}

/// Summary of one block. Blocks below three samples collapse onto their first value;
/// an empty block has no summary.
pub fn summarize<T: Copy + Into<f64>>(data: &[T]) -> Option<Summary> {
    let first: f64 = (*data.first()?).into();

    if data.len() < MIN_STAT_SAMPLES {
        return Some(Summary {
            mean: first,
            min: first,
            max: first,
            std: 0.0,
        });
    }

    let lo = min(data);
    let hi = max(data);
    // rounding in the sum can land the mean just outside the envelope
    let mut avg = mean(data);
    if lo <= hi {
        avg = avg.max(lo).min(hi);
    }

    Some(Summary {
        mean: avg,
        min: lo,
        max: hi,
        std: std_dev(data, avg),
    })
}

/// Representative interval of a sorted timestamp sequence.
///
/// With `n = len / 2` the `n`-th order statistic is taken when `n` is odd; when `n` is even it is
/// averaged with the largest value below it. Downstream gap thresholds depend on this exact rule.
pub fn median_interval(mut deltas: Vec<f64>) -> f64 {
    if deltas.is_empty() {
        return 0.0;
    }

    let n = deltas.len() / 2;
    let (lower, nth, _) = deltas.select_nth_unstable_by(n, f64::total_cmp);
    let nth = *nth;

    if n % 2 != 0 || lower.is_empty() {
        return nth;
    }

    let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (nth + lower_max) / 2.0
}

pub fn consecutive_deltas(timestamps: &[f64]) -> Vec<f64> {
    timestamps.windows(2).map(|w| w[1] - w[0]).collect()
}

pub fn ceil_div(numerator: usize, denominator: usize) -> usize {
    if denominator == 0 {
        return numerator;
    }
    numerator.div_ceil(denominator)
}
