//! Descriptive statistics over plain `f64` slices.
//!
//! Shared by the profiler, `cap_outliers` and the aggregation engine. Medians
//! and percentiles interpolate; outlier fences read observed order statistics.

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Sorted copy, ordered with `total_cmp`.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Quantile of already sorted data by linear interpolation between order
/// statistics, at position `p * (n - 1)`. `p` is clamped to `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = p.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let lo_val = *sorted.get(lo)?;
    let hi_val = *sorted.get(hi)?;
    Some(lo_val + (hi_val - lo_val) * (pos - lo as f64))
}

/// Quantile of unsorted data.
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    quantile_sorted(&sorted(values), p)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Tukey fences `[Q1 - k*IQR, Q3 + k*IQR]`.
///
/// The quartiles are observations rather than interpolated values: Q1 is the
/// order statistic at `floor((n - 1) / 4)`, Q3 the one at `ceil(3(n - 1) / 4)`.
/// Clipping to these fences never moves an observation a quartile is read
/// from, so the fences of a clipped sample are the fences it was clipped to.
pub fn iqr_bounds(values: &[f64], k: f64) -> Option<(f64, f64)> {
    let data = sorted(values);
    let last = data.len().checked_sub(1)?;
    let q1 = *data.get(last / 4)?;
    let q3 = *data.get((3 * last).div_ceil(4))?;
    let iqr = q3 - q1;
    Some((q1 - k * iqr, q3 + k * iqr))
}
