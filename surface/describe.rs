//! Descriptive statistics and per-column missingness.

use crate::table::RowSet;
use itertools::Itertools;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptive {
    pub variable: String,
    pub n: usize,
    pub missing: usize,
    pub mean: Option<f64>,
    /// Sample SD (divisor N-1); undefined below two values.
    pub sd: Option<f64>,
    pub median: Option<f64>,
    pub iqr: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Missingness {
    pub variable: String,
    pub n_missing: usize,
    pub fraction: f64,
}

/// Quantile of already sorted values, interpolating linearly between order
/// statistics at position `q * (n - 1)`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    let sorted: Vec<f64> = values.iter().copied().sorted_by(f64::total_cmp).collect();
    quantile_sorted(&sorted, 0.5)
}

pub fn describe_column(variable: &str, values: &[Option<f64>]) -> Descriptive {
    let sorted: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .sorted_by(f64::total_cmp)
        .collect();
    let n = sorted.len();
    let mean = (n > 0).then(|| sorted.iter().sum::<f64>() / n as f64);
    let sd = mean.filter(|_| n > 1).map(|mean| {
        (sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    });
    let iqr = quantile_sorted(&sorted, 0.75)
        .zip(quantile_sorted(&sorted, 0.25))
        .map(|(q3, q1)| q3 - q1);

    Descriptive {
        variable: variable.to_string(),
        n,
        missing: values.len() - n,
        mean,
        sd,
        median: quantile_sorted(&sorted, 0.5),
        iqr,
        min: sorted.first().copied(),
        max: sorted.last().copied(),
    }
}

/// Describes each listed column that exists; absent names are skipped.
pub fn describe_columns(rows: &RowSet, columns: &[String]) -> Vec<Descriptive> {
    columns
        .iter()
        .filter_map(|name| match rows.column(name) {
            Some(values) => Some(describe_column(name, values)),
            None => {
                log::warn!("Descriptive column '{name}' absent; skipped");
                None
            }
        })
        .collect()
}

/// Fraction missing for each listed column that exists, most incomplete
/// first. Ties keep the listed order.
pub fn missingness(rows: &RowSet, columns: &[String]) -> Vec<Missingness> {
    let n_rows = rows.n_rows();
    columns
        .iter()
        .filter_map(|name| rows.column(name).map(|values| (name, values)))
        .map(|(name, values)| {
            let n_missing = values.iter().filter(|v| v.is_none()).count();
            Missingness {
                variable: name.clone(),
                n_missing,
                fraction: if n_rows == 0 {
                    0.0
                } else {
                    n_missing as f64 / n_rows as f64
                },
            }
        })
        .sorted_by(|a, b| b.n_missing.cmp(&a.n_missing))
        .collect()
}
