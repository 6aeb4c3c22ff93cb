//! Column-wise z-scoring and the count-safe log transform.

use crate::table::Column;

/// Mean and population standard deviation (divisor N) over present values.
/// Returns `None` when no value is present.
pub fn mean_and_population_sd(values: &[Option<f64>]) -> Option<(f64, f64)> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Standardizes a column to zero mean and unit population SD.
///
/// Missing values stay missing. A column whose present values are all equal,
/// or whose SD is zero or undefined, maps every present value to exactly `0.0`.
pub fn zscore(values: &[Option<f64>]) -> Column {
    match mean_and_population_sd(values) {
        Some((mean, sd)) if sd > 0.0 && sd.is_finite() && !all_equal(values) => values
            .iter()
            .map(|v| v.map(|x| (x - mean) / sd))
            .collect(),
        _ => {
            log::debug!("Degenerate spread while standardizing; present values map to zero");
            values.iter().map(|v| v.map(|_| 0.0)).collect()
        }
    }
}

// A constant column can still carry a rounding-level SD through its mean.
fn all_equal(values: &[Option<f64>]) -> bool {
    let mut present = values.iter().flatten();
    match present.next() {
        Some(first) => present.all(|x| x == first),
        None => true,
    }
}

/// `ln(1 + x)` for count-like data. Negative counts are treated as missing.
pub fn log1p_safe(values: &[Option<f64>]) -> Column {
    values
        .iter()
        .map(|v| v.filter(|x| *x >= 0.0).map(f64::ln_1p))
        .collect()
}

/// Log-transform then standardize, in that order.
pub fn log_zscore(values: &[Option<f64>]) -> Column {
    zscore(&log1p_safe(values))
}
