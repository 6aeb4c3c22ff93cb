//! # Response-Surface Parameters
//!
//! The extended model carries the polynomial
//!
//! `b1·X + b2·Y + b3·X² + b4·X·Y + b5·Y²`
//!
//! in standardized anxiety `X` and avoidance `Y`. Along the line of
//! congruence (`X = Y`) the surface has slope `a1 = b1 + b2` and curvature
//! `a2 = b3 + b4 + b5`; along the line of incongruence (`X = -Y`) it has
//! slope `a3 = b1 - b2` and curvature `a4 = b3 - b4 + b5`.

use crate::config::{ColumnNames, SurfaceGridConfig};
use crate::describe::median;
use crate::model::{FittedModel, INTERCEPT};
use crate::table::{Column, RowSet, TableError, zip_with};
use ndarray::Array1;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceCoefficients {
    pub b1: Option<f64>,
    pub b2: Option<f64>,
    pub b3: Option<f64>,
    pub b4: Option<f64>,
    pub b5: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceParameters {
    pub a1: Option<f64>,
    pub a2: Option<f64>,
    pub a3: Option<f64>,
    pub a4: Option<f64>,
}

/// The five surface terms in `b1..b5` order.
pub fn surface_terms(names: &ColumnNames) -> [String; 5] {
    [
        names.anxiety_z.clone(),
        names.avoidance_z.clone(),
        names.anxiety_squared.clone(),
        names.anxiety_x_avoidance.clone(),
        names.avoidance_squared.clone(),
    ]
}

impl SurfaceCoefficients {
    /// Looks the surface terms up by name; a term the model lacks stays undefined.
    pub fn from_model(model: &FittedModel, names: &ColumnNames) -> Self {
        let [b1, b2, b3, b4, b5] = surface_terms(names).map(|term| model.coefficient(&term));
        Self { b1, b2, b3, b4, b5 }
    }

    pub fn parameters(&self) -> SurfaceParameters {
        let sum = |terms: &[Option<f64>], signs: &[f64]| -> Option<f64> {
            terms
                .iter()
                .zip(signs)
                .map(|(b, s)| b.map(|b| b * s))
                .sum::<Option<f64>>()
        };
        SurfaceParameters {
            a1: sum(&[self.b1, self.b2], &[1.0, 1.0]),
            a2: sum(&[self.b3, self.b4, self.b5], &[1.0, 1.0, 1.0]),
            a3: sum(&[self.b1, self.b2], &[1.0, -1.0]),
            a4: sum(&[self.b3, self.b4, self.b5], &[1.0, -1.0, 1.0]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CovariateLevel {
    pub term: String,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridPoint {
    pub anxiety_z: f64,
    pub avoidance_z: f64,
    pub predicted: f64,
}

/// Predicted outcome over a square grid of standardized attachment scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceGrid {
    pub covariates: Vec<CovariateLevel>,
    pub points: Vec<GridPoint>,
}

/// Evaluates the extended model on the configured grid, holding every
/// non-surface predictor at its median over the model's own rows.
///
/// Returns `Ok(None)` when a surface coefficient is undefined.
pub fn surface_grid(
    model: &FittedModel,
    rows: &RowSet,
    names: &ColumnNames,
    grid: &SurfaceGridConfig,
) -> Result<Option<SurfaceGrid>, TableError> {
    let terms = surface_terms(names);
    let b = SurfaceCoefficients::from_model(model, names);
    let (Some(b1), Some(b2), Some(b3), Some(b4), Some(b5), Some(intercept)) =
        (b.b1, b.b2, b.b3, b.b4, b.b5, model.coefficient(INTERCEPT))
    else {
        log::warn!("Surface grid skipped: model '{}' lacks a surface term", model.name);
        return Ok(None);
    };

    let mut covariates = Vec::new();
    let mut offset = intercept;
    for term in model.predictors().iter().filter(|t| !terms.contains(t)) {
        let values = rows
            .gather(term, &model.row_positions)?
            .ok_or_else(|| TableError::ColumnNotFound(term.clone()))?;
        let Some(level) = median(&values) else {
            continue;
        };
        offset += model.coefficient(term).unwrap_or(0.0) * level;
        covariates.push(CovariateLevel {
            term: term.clone(),
            median: level,
        });
    }

    let axis = Array1::linspace(grid.min, grid.max, grid.points);
    let points = axis
        .iter()
        .flat_map(|&x| axis.iter().map(move |&y| (x, y)))
        .map(|(x, y)| GridPoint {
            anxiety_z: x,
            avoidance_z: y,
            predicted: offset + b1 * x + b2 * y + b3 * x * x + b4 * x * y + b5 * y * y,
        })
        .collect::<Vec<_>>();
    log::info!(
        "Response surface evaluated on a {0}x{0} grid over [{1}, {2}]",
        grid.points,
        grid.min,
        grid.max
    );

    Ok(Some(SurfaceGrid { covariates, points }))
}

/// Mean of the two raw subscale scores, missing if either is.
pub fn insecurity_mean(anxiety: &[Option<f64>], avoidance: &[Option<f64>]) -> Column {
    zip_with(anxiety, avoidance, |a, v| (a + v) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelOutcome, ModelSpec, fit_model};
    use approx::assert_abs_diff_eq;

    fn coefficients() -> SurfaceCoefficients {
        SurfaceCoefficients {
            b1: Some(0.3),
            b2: Some(-0.1),
            b3: Some(0.05),
            b4: Some(0.2),
            b5: Some(-0.4),
        }
    }

    #[test]
    fn parameters_satisfy_the_surface_identities() {
        let b = coefficients();
        let a = b.parameters();
        let (a1, a2, a3, a4) = (a.a1.unwrap(), a.a2.unwrap(), a.a3.unwrap(), a.a4.unwrap());
        let (b1, b2, b3, b4, b5) = (0.3, -0.1, 0.05, 0.2, -0.4);
        assert_abs_diff_eq!(a1 + a3, 2.0 * b1, epsilon = 1e-12);
        assert_abs_diff_eq!(a1 - a3, 2.0 * b2, epsilon = 1e-12);
        assert_abs_diff_eq!(a2 + a4, 2.0 * (b3 + b5), epsilon = 1e-12);
        assert_abs_diff_eq!(a2 - a4, 2.0 * b4, epsilon = 1e-12);
    }

    #[test]
    fn undefined_coefficient_propagates() {
        let mut b = coefficients();
        b.b4 = None;
        let a = b.parameters();
        assert!(a.a1.is_some() && a.a3.is_some());
        assert_eq!(a.a2, None);
        assert_eq!(a.a4, None);
    }

    #[test]
    fn insecurity_mean_is_strict() {
        let out = insecurity_mean(&[Some(1.0), None], &[Some(3.0), Some(2.0)]);
        assert_eq!(out, vec![Some(2.0), None]);
    }

    /// Exact quadratic surface plus a covariate, no noise.
    fn exact_surface_rows() -> RowSet {
        let names = ColumnNames::default();
        let n = 30;
        let mut rows = RowSet::new((0..n).map(|i| i.to_string()).collect());
        let x: Vec<f64> = (0..n).map(|i| (i % 6) as f64 - 2.5).collect();
        let y: Vec<f64> = (0..n).map(|i| (i / 6) as f64 - 2.0).collect();
        let c: Vec<f64> = (0..n).map(|i| ((i * 7) % 5) as f64).collect();
        let outcome: Vec<f64> = (0..n)
            .map(|i| {
                1.0 + 0.5 * x[i] - 0.25 * y[i] + 0.1 * x[i] * x[i] + 0.2 * x[i] * y[i] - 0.3 * y[i] * y[i]
                    + 2.0 * c[i]
            })
            .collect();
        let col = |v: &[f64]| v.iter().map(|&x| Some(x)).collect::<Column>();
        rows.add_column(&names.anxiety_z, col(&x)).unwrap();
        rows.add_column(&names.avoidance_z, col(&y)).unwrap();
        rows.add_column(&names.anxiety_squared, x.iter().map(|v| Some(v * v)).collect())
            .unwrap();
        let xy: Column = x.iter().zip(&y).map(|(a, b)| Some(a * b)).collect();
        rows.add_column(&names.anxiety_x_avoidance, xy).unwrap();
        rows.add_column(&names.avoidance_squared, y.iter().map(|v| Some(v * v)).collect())
            .unwrap();
        rows.add_column("cov", col(&c)).unwrap();
        rows.add_column("outcome", col(&outcome)).unwrap();
        rows
    }

    #[test]
    fn grid_holds_covariates_at_their_median() {
        let names = ColumnNames::default();
        let rows = exact_surface_rows();
        let mut predictors = surface_terms(&names).to_vec();
        predictors.push("cov".into());
        let spec = ModelSpec {
            name: "surface".into(),
            outcome: "outcome".into(),
            predictors,
        };
        let ModelOutcome::Fitted(model) = fit_model(&rows, &spec).unwrap() else {
            panic!("exact surface should fit");
        };
        let b = SurfaceCoefficients::from_model(&model, &names);
        assert_abs_diff_eq!(b.b4.unwrap(), 0.2, epsilon = 1e-8);

        let grid = SurfaceGridConfig {
            points: 3,
            min: -1.0,
            max: 1.0,
        };
        let surface = surface_grid(&model, &rows, &names, &grid).unwrap().unwrap();
        assert_eq!(surface.points.len(), 9);
        assert_eq!(surface.covariates.len(), 1);
        let level = surface.covariates[0].median;
        assert_abs_diff_eq!(level, 2.0, epsilon = 1e-12);

        let corner = &surface.points[0];
        assert_eq!((corner.anxiety_z, corner.avoidance_z), (-1.0, -1.0));
        let expected = 1.0 - 0.5 + 0.25 + 0.1 + 0.2 - 0.3 + 2.0 * level;
        assert_abs_diff_eq!(corner.predicted, expected, epsilon = 1e-8);
    }
}
