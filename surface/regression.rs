//! # Ordinary Least Squares with HC3 Standard Errors
//!
//! Coefficients come from an SVD-based least-squares solve of the design with
//! a prepended intercept column. The variance step uses the explicit inverse
//! of `XᵀX`:
//!
//! 1. leverage `h_i = x_iᵀ (XᵀX)⁻¹ x_i`
//! 2. weight `ω_i = e_i² / (1 - h_i)²`
//! 3. covariance `(XᵀX)⁻¹ Xᵀ diag(ω) X (XᵀX)⁻¹`
//! 4. standard errors from the square root of its diagonal
//!
//! A weight whose leverage is one, up to rounding in the inverse, is undefined. Because every entry of the
//! meat matrix sums over all observations, a single undefined weight leaves
//! every standard error undefined.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use ndarray_linalg::{Inverse, LeastSquaresSvd};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("Design has {x_rows} rows but the response has {y_len} values.")]
    DimensionMismatch { x_rows: usize, y_len: usize },

    #[error("Cannot fit a model to zero observations.")]
    EmptyDesign,

    #[error(
        "Design matrix is rank deficient: rank {rank} with {columns} parameters. Coefficients are not identified."
    )]
    RankDeficient { rank: usize, columns: usize },

    #[error("A linear algebra routine failed: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
}

/// The result of one OLS fit. Vectors over parameters start with the intercept.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Array1<f64>,
    pub std_errors: Vec<Option<f64>>,
    pub fitted: Array1<f64>,
    pub residuals: Array1<f64>,
    pub leverage: Array1<f64>,
}

/// Prepends a column of ones.
pub fn with_intercept(x: ArrayView2<f64>) -> Array2<f64> {
    let mut design = Array2::<f64>::ones((x.nrows(), x.ncols() + 1));
    design.slice_mut(s![.., 1..]).assign(&x);
    design
}

// Leverage of a row that alone determines a parameter is one in exact
// arithmetic; the computed inverse can leave it a few ulps short.
const UNIT_LEVERAGE_TOLERANCE: f64 = 1e-10;

/// HC3 weight for one observation; `None` when the leverage is one.
pub fn hc3_weight(residual: f64, leverage: f64) -> Option<f64> {
    let gap = 1.0 - leverage;
    if gap.abs() <= UNIT_LEVERAGE_TOLERANCE {
        None
    } else {
        Some(residual * residual / gap.powi(2))
    }
}

/// Fits `y ~ 1 + x` by least squares and computes HC3 standard errors.
pub fn fit_ols(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<OlsFit, RegressionError> {
    if x.nrows() != y.len() {
        return Err(RegressionError::DimensionMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    if y.is_empty() {
        return Err(RegressionError::EmptyDesign);
    }

    let design = with_intercept(x);
    let p = design.ncols();
    if design.nrows() < p {
        log::warn!("OLS design has {} rows for {p} parameters", design.nrows());
        return Err(RegressionError::RankDeficient {
            rank: design.nrows(),
            columns: p,
        });
    }

    let solved = design.least_squares(&y.to_owned())?;
    let rank = usize::try_from(solved.rank).unwrap_or(0);
    if rank < p {
        log::warn!("OLS design is rank deficient: rank {rank} < {p} parameters");
        return Err(RegressionError::RankDeficient { rank, columns: p });
    }
    let coefficients = solved.solution;
    let fitted = design.dot(&coefficients);
    let residuals = &y - &fitted;

    let xtx_inv = design.t().dot(&design).inv()?;
    let leverage = (&design * &design.dot(&xtx_inv)).sum_axis(Axis(1));
    log::debug!(
        "Leverage range [{:.4}, {:.4}] over {} observations",
        leverage.fold(f64::INFINITY, |a, &b| a.min(b)),
        leverage.fold(f64::NEG_INFINITY, |a, &b| a.max(b)),
        leverage.len()
    );

    let weights: Option<Vec<f64>> = residuals
        .iter()
        .zip(leverage.iter())
        .map(|(&e, &h)| hc3_weight(e, h))
        .collect();

    let std_errors = match weights {
        Some(weights) => {
            let omega = Array1::from_vec(weights);
            let weighted = &design * &omega.view().insert_axis(Axis(1));
            let meat = design.t().dot(&weighted);
            let covariance = xtx_inv.dot(&meat).dot(&xtx_inv);
            covariance
                .diag()
                .iter()
                .map(|&v| Some(v).filter(|v| *v >= 0.0 && v.is_finite()).map(f64::sqrt))
                .collect()
        }
        None => {
            log::warn!("An observation has leverage of one; HC3 standard errors are undefined");
            vec![None; p]
        }
    };

    Ok(OlsFit {
        coefficients,
        std_errors,
        fitted,
        residuals,
        leverage,
    })
}

/// `1 - SSR/SST`; undefined when the response has no spread or no rows.
pub fn r_squared(y: ArrayView1<f64>, fitted: ArrayView1<f64>) -> Option<f64> {
    if y.is_empty() || y.len() != fitted.len() {
        return None;
    }
    let mean = y.sum() / y.len() as f64;
    let ssr: f64 = y.iter().zip(fitted).map(|(a, b)| (a - b).powi(2)).sum();
    let sst: f64 = y.iter().map(|a| (a - mean).powi(2)).sum();
    if sst > 0.0 { Some(1.0 - ssr / sst) } else { None }
}

/// Adjusted R² where `k` counts every parameter including the intercept.
pub fn adjusted_r_squared(r2: Option<f64>, n: usize, k: usize) -> Option<f64> {
    let r2 = r2?;
    if n <= k + 1 {
        return None;
    }
    let (n, k) = (n as f64, k as f64);
    Some(1.0 - (1.0 - r2) * (n - 1.0) / (n - k - 1.0))
}
