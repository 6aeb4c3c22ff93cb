use crate::regression::{RegressionError, adjusted_r_squared, fit_ols, r_squared};
use crate::table::{Column, RowSet, TableError, scatter};
use ndarray::{Array1, Array2};
use serde::Serialize;

/// The intercept's term name in coefficient tables.
pub const INTERCEPT: &str = "Intercept";

/// Names one regression: outcome and ordered predictor columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub outcome: String,
    pub predictors: Vec<String>,
}

impl ModelSpec {
    /// Every column a row must carry to enter the fit.
    pub fn required_columns(&self) -> Vec<String> {
        std::iter::once(self.outcome.clone())
            .chain(self.predictors.iter().cloned())
            .collect()
    }
}

/// An immutable fitted model together with the rows it was fitted on.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub name: String,
    pub outcome: String,
    /// `Intercept` followed by the predictors, aligned with `coefficients`.
    pub terms: Vec<String>,
    pub coefficients: Array1<f64>,
    pub std_errors: Vec<Option<f64>>,
    pub r_squared: Option<f64>,
    pub adjusted_r_squared: Option<f64>,
    /// Positions into the source row-set, in fit order.
    pub row_positions: Vec<usize>,
    pub row_ids: Vec<String>,
    pub response: Array1<f64>,
    pub fitted: Array1<f64>,
    pub residuals: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermEstimate {
    pub term: String,
    pub estimate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_error_hc3: Option<f64>,
}

/// Serializable record of a fit, as written to the results file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub outcome: String,
    pub n_obs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_squared: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_r_squared: Option<f64>,
    pub predictors: Vec<String>,
    pub terms: Vec<TermEstimate>,
}

impl FittedModel {
    pub fn n_obs(&self) -> usize {
        self.row_positions.len()
    }

    /// Parameter count including the intercept.
    pub fn n_params(&self) -> usize {
        self.terms.len()
    }

    pub fn predictors(&self) -> &[String] {
        &self.terms[1..]
    }

    fn term_index(&self, term: &str) -> Option<usize> {
        self.terms.iter().position(|t| t == term)
    }

    pub fn coefficient(&self, term: &str) -> Option<f64> {
        self.term_index(term).map(|idx| self.coefficients[idx])
    }

    pub fn std_error(&self, term: &str) -> Option<f64> {
        self.term_index(term).and_then(|idx| self.std_errors[idx])
    }

    /// Fitted values placed back on a row-set of `n_rows` rows.
    pub fn fitted_column(&self, n_rows: usize) -> Column {
        scatter(n_rows, &self.row_positions, self.fitted.as_slice().unwrap_or(&[]))
    }

    pub fn residual_column(&self, n_rows: usize) -> Column {
        scatter(n_rows, &self.row_positions, self.residuals.as_slice().unwrap_or(&[]))
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: self.name.clone(),
            outcome: self.outcome.clone(),
            n_obs: self.n_obs(),
            r_squared: self.r_squared,
            adjusted_r_squared: self.adjusted_r_squared,
            predictors: self.predictors().to_vec(),
            terms: self
                .terms
                .iter()
                .zip(self.coefficients.iter())
                .zip(&self.std_errors)
                .map(|((term, &estimate), &se)| TermEstimate {
                    term: term.clone(),
                    estimate,
                    std_error_hc3: se,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub enum ModelOutcome {
    Fitted(FittedModel),
    /// The fit exists conceptually but its statistics are not identified.
    Undefined {
        name: String,
        n_obs: usize,
        reason: RegressionError,
    },
}

impl ModelOutcome {
    pub fn fitted(&self) -> Option<&FittedModel> {
        match self {
            Self::Fitted(model) => Some(model),
            Self::Undefined { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Fitted(model) => &model.name,
            Self::Undefined { name, .. } => name,
        }
    }

    pub fn n_obs(&self) -> usize {
        match self {
            Self::Fitted(model) => model.n_obs(),
            Self::Undefined { n_obs, .. } => *n_obs,
        }
    }
}

/// Fits `spec` on the complete cases of `rows`.
///
/// Absent columns are a caller error; degenerate designs come back as
/// [`ModelOutcome::Undefined`].
pub fn fit_model(rows: &RowSet, spec: &ModelSpec) -> Result<ModelOutcome, TableError> {
    let positions = rows.complete_cases(&spec.required_columns())?;
    let n = positions.len();
    log::info!(
        "Fitting model '{}' ({} ~ {}) on {n} of {} rows",
        spec.name,
        spec.outcome,
        spec.predictors.join(" + "),
        rows.n_rows()
    );

    let response = gather_complete(rows, &spec.outcome, &positions)?;
    let mut x = Array2::<f64>::zeros((n, spec.predictors.len()));
    for (j, name) in spec.predictors.iter().enumerate() {
        let values = gather_complete(rows, name, &positions)?;
        x.column_mut(j).assign(&values);
    }

    let fit = match fit_ols(x.view(), response.view()) {
        Ok(fit) => fit,
        Err(reason) => {
            log::warn!("Model '{}' is undefined: {reason}", spec.name);
            return Ok(ModelOutcome::Undefined {
                name: spec.name.clone(),
                n_obs: n,
                reason,
            });
        }
    };

    let terms: Vec<String> = std::iter::once(INTERCEPT.to_string())
        .chain(spec.predictors.iter().cloned())
        .collect();
    let r2 = r_squared(response.view(), fit.fitted.view());
    let adjusted = adjusted_r_squared(r2, n, terms.len());
    match r2 {
        Some(r2) => log::info!("Model '{}': R² = {r2:.4}", spec.name),
        None => log::warn!("Model '{}': R² undefined (constant response)", spec.name),
    }

    Ok(ModelOutcome::Fitted(FittedModel {
        name: spec.name.clone(),
        outcome: spec.outcome.clone(),
        terms,
        coefficients: fit.coefficients,
        std_errors: fit.std_errors,
        r_squared: r2,
        adjusted_r_squared: adjusted,
        row_ids: positions.iter().map(|&row| rows.ids()[row].clone()).collect(),
        row_positions: positions,
        response,
        fitted: fit.fitted,
        residuals: fit.residuals,
    }))
}

fn gather_complete(rows: &RowSet, name: &str, positions: &[usize]) -> Result<Array1<f64>, TableError> {
    rows.gather(name, positions)?
        .map(Array1::from_vec)
        .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
}

/// ΔR² of `extended` over `baseline`, undefined if either side is.
pub fn delta_r_squared(baseline: Option<&FittedModel>, extended: Option<&FittedModel>) -> Option<f64> {
    Some(extended?.r_squared? - baseline?.r_squared?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rows() -> RowSet {
        let mut rows = RowSet::new((1..=6).map(|i| format!("P{i}")).collect());
        rows.add_column("x", vec![Some(0.0), Some(1.0), None, Some(2.0), Some(3.0), Some(4.0)])
            .unwrap();
        rows.add_column("y", vec![Some(1.0), Some(3.0), Some(9.0), Some(2.0), Some(5.0), Some(4.0)])
            .unwrap();
        rows
    }

    fn spec() -> ModelSpec {
        ModelSpec {
            name: "simple".into(),
            outcome: "y".into(),
            predictors: vec!["x".into()],
        }
    }

    #[test]
    fn fit_uses_complete_cases_and_keeps_ids() {
        let rows = rows();
        let outcome = fit_model(&rows, &spec()).unwrap();
        let model = outcome.fitted().unwrap();
        assert_eq!(model.n_obs(), 5);
        assert_eq!(model.row_ids, vec!["P1", "P2", "P4", "P5", "P6"]);
        assert_abs_diff_eq!(model.coefficient("x").unwrap(), 0.8, epsilon = 1e-10);
        assert_abs_diff_eq!(model.coefficient(INTERCEPT).unwrap(), 1.4, epsilon = 1e-10);
        assert_eq!(model.coefficient("missing"), None);
        assert_eq!(model.n_params(), 2);

        let fitted = model.fitted_column(rows.n_rows());
        assert_eq!(fitted[2], None);
        assert_abs_diff_eq!(fitted[3].unwrap(), 1.4 + 0.8 * 2.0, epsilon = 1e-10);
        let residuals = model.residual_column(rows.n_rows());
        assert_abs_diff_eq!(residuals[1].unwrap(), 3.0 - 2.2, epsilon = 1e-10);
    }

    #[test]
    fn rank_deficient_fit_is_undefined_not_fatal() {
        let mut rows = rows();
        let doubled: Column = rows.column("x").unwrap().iter().map(|v| v.map(|x| 2.0 * x)).collect();
        rows.add_column("x2", doubled).unwrap();
        let mut spec = spec();
        spec.predictors.push("x2".into());
        match fit_model(&rows, &spec).unwrap() {
            ModelOutcome::Undefined { n_obs, reason, .. } => {
                assert_eq!(n_obs, 5);
                assert!(matches!(reason, RegressionError::RankDeficient { .. }));
            }
            other => panic!("expected an undefined fit, got {other:?}"),
        }
    }

    #[test]
    fn summary_lists_terms_in_order() {
        let rows = rows();
        let outcome = fit_model(&rows, &spec()).unwrap();
        let summary = outcome.fitted().unwrap().summary();
        let terms: Vec<&str> = summary.terms.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec![INTERCEPT, "x"]);
        assert_eq!(summary.predictors, vec!["x".to_string()]);
        assert!(summary.terms.iter().all(|t| t.std_error_hc3.is_some()));
    }

    #[test]
    fn delta_r_squared_needs_both_models() {
        let rows = rows();
        let outcome = fit_model(&rows, &spec()).unwrap();
        let model = outcome.fitted().unwrap();
        assert_eq!(delta_r_squared(Some(model), None), None);
        assert_abs_diff_eq!(delta_r_squared(Some(model), Some(model)).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn absent_predictor_is_a_table_error() {
        let rows = rows();
        let mut spec = spec();
        spec.predictors.push("nope".into());
        assert!(matches!(fit_model(&rows, &spec), Err(TableError::ColumnNotFound(_))));
    }
}
