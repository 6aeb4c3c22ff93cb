//! # Result Tables and Records
//!
//! Tables are tab-separated with undefined statistics left empty. The audit
//! and model results are TOML records.

use crate::config::PipelineConfig;
use crate::data::{DataError, write_rows};
use crate::describe::{describe_columns, missingness};
use crate::model::{FittedModel, ModelOutcome, TermEstimate, delta_r_squared};
use crate::pipeline::{AttachmentSource, PipelineRun, Prepared};
use crate::response_surface::{CovariateLevel, SurfaceCoefficients, SurfaceGrid, SurfaceParameters};
use serde::Serialize;
use statrs::function::erf::erf;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Two-sided 95% normal quantile used for the coefficient intervals.
pub const Z_95: f64 = 1.96;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write output file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to write table: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Failed to write dataset: {0}")]
    Data(#[from] DataError),
    #[error("Failed to serialize record to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// Two-sided p-value of `t` under the normal approximation, clamped to `[0, 1]`.
pub fn p_from_t(t: f64) -> f64 {
    let cdf = 0.5 * (1.0 + erf(t.abs() / std::f64::consts::SQRT_2));
    (2.0 * (1.0 - cdf)).clamp(0.0, 1.0)
}

/// One line of a coefficient table.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub term: String,
    pub estimate: f64,
    pub std_error: Option<f64>,
    pub t: Option<f64>,
    pub p: Option<f64>,
    pub ci_low: Option<f64>,
    pub ci_high: Option<f64>,
}

impl CoefficientRow {
    pub fn new(term: &str, estimate: f64, std_error: Option<f64>) -> Self {
        let se = std_error.filter(|se| *se > 0.0);
        let t = se.map(|se| estimate / se);
        Self {
            term: term.to_string(),
            estimate,
            std_error,
            t,
            p: t.map(p_from_t),
            ci_low: std_error.map(|se| estimate - Z_95 * se),
            ci_high: std_error.map(|se| estimate + Z_95 * se),
        }
    }
}

pub fn coefficient_rows(model: &FittedModel) -> Vec<CoefficientRow> {
    model
        .terms
        .iter()
        .zip(model.coefficients.iter())
        .zip(&model.std_errors)
        .map(|((term, &estimate), &se)| CoefficientRow::new(term, estimate, se))
        .collect()
}

/// One row of the nested-model comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelComparison {
    pub model: String,
    pub n_obs: Option<usize>,
    /// Parameters including the intercept.
    pub k: Option<usize>,
    pub r_squared: Option<f64>,
    pub adjusted_r_squared: Option<f64>,
}

/// Baseline, extended, and a final ΔR² row.
pub fn model_comparison(baseline: Option<&ModelOutcome>, extended: Option<&ModelOutcome>) -> Vec<ModelComparison> {
    let row = |outcome: &ModelOutcome| ModelComparison {
        model: outcome.name().to_string(),
        n_obs: Some(outcome.n_obs()),
        k: outcome.fitted().map(FittedModel::n_params),
        r_squared: outcome.fitted().and_then(|m| m.r_squared),
        adjusted_r_squared: outcome.fitted().and_then(|m| m.adjusted_r_squared),
    };
    let mut rows: Vec<ModelComparison> = baseline.into_iter().chain(extended).map(row).collect();
    rows.push(ModelComparison {
        model: "delta_r_squared".to_string(),
        n_obs: None,
        k: None,
        r_squared: delta_r_squared(
            baseline.and_then(ModelOutcome::fitted),
            extended.and_then(ModelOutcome::fitted),
        ),
        adjusted_r_squared: None,
    });
    rows
}

/// Serializable view of a fitted or undefined model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    pub name: String,
    pub status: &'static str,
    pub n_obs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_squared: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_r_squared: Option<f64>,
    pub predictors: Vec<String>,
    pub terms: Vec<TermEstimate>,
}

impl ModelRecord {
    pub fn from_outcome(outcome: &ModelOutcome) -> Self {
        match outcome {
            ModelOutcome::Fitted(model) => {
                let summary = model.summary();
                Self {
                    name: summary.name,
                    status: "fitted",
                    n_obs: summary.n_obs,
                    outcome: Some(summary.outcome),
                    reason: None,
                    r_squared: summary.r_squared,
                    adjusted_r_squared: summary.adjusted_r_squared,
                    predictors: summary.predictors,
                    terms: summary.terms,
                }
            }
            ModelOutcome::Undefined { name, n_obs, reason } => Self {
                name: name.clone(),
                status: "undefined",
                n_obs: *n_obs,
                outcome: None,
                reason: Some(reason.to_string()),
                r_squared: None,
                adjusted_r_squared: None,
                predictors: Vec::new(),
                terms: Vec::new(),
            },
        }
    }
}

/// The `model_results.toml` record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsRecord {
    pub seed: u64,
    pub attachment_source: AttachmentSource,
    pub covariates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_r_squared: Option<f64>,
    pub omissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_coefficients: Option<SurfaceCoefficients>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_parameters: Option<SurfaceParameters>,
    pub grid_covariates: Vec<CovariateLevel>,
    pub models: Vec<ModelRecord>,
}

impl ResultsRecord {
    pub fn from_run(run: &PipelineRun, config: &PipelineConfig) -> Self {
        let results = &run.results;
        let models = results
            .baseline
            .iter()
            .chain(&results.extended)
            .chain(&results.secondary)
            .map(ModelRecord::from_outcome)
            .collect();
        Self {
            seed: config.seed,
            attachment_source: run.prepared.audit.attachment_source,
            covariates: run.prepared.audit.covariates.clone(),
            delta_r_squared: results.delta_r_squared,
            omissions: run
                .prepared
                .audit
                .omissions
                .iter()
                .chain(&results.omissions)
                .cloned()
                .collect(),
            surface_coefficients: results.surface_coefficients,
            surface_parameters: results.surface_parameters,
            grid_covariates: results
                .grid
                .as_ref()
                .map(|grid| grid.covariates.clone())
                .unwrap_or_default(),
            models,
        }
    }
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => ryu::Buffer::new().format(v).to_string(),
        _ => String::new(),
    }
}

fn count(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_table(path: &Path, header: &[&str], records: Vec<Vec<String>>) -> Result<(), ReportError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(header)?;
    for record in records {
        writer.write_record(&record)?;
    }
    writer.flush()?;
    log::debug!("Wrote table '{}'", path.display());
    Ok(())
}

const COEFFICIENT_HEADER: [&str; 9] = [
    "model",
    "term",
    "estimate",
    "std_error_hc3",
    "t",
    "p",
    "ci_low",
    "ci_high",
    "n_obs",
];

fn coefficient_records(model: &FittedModel) -> Vec<Vec<String>> {
    coefficient_rows(model)
        .into_iter()
        .map(|row| {
            vec![
                model.name.clone(),
                row.term,
                cell(Some(row.estimate)),
                cell(row.std_error),
                cell(row.t),
                cell(row.p),
                cell(row.ci_low),
                cell(row.ci_high),
                model.n_obs().to_string(),
            ]
        })
        .collect()
}

/// Writes the prepared dataset, the audit, and the preparation tables.
/// Returns the paths written.
pub fn write_preparation(
    out_dir: &Path,
    prepared: &Prepared,
    config: &PipelineConfig,
) -> Result<Vec<PathBuf>, ReportError> {
    let tables = out_dir.join("tables");
    fs::create_dir_all(&tables)?;
    let mut written = Vec::new();

    let dataset = out_dir.join("prepared_dataset.tsv");
    write_rows(&prepared.rows, &config.columns.patient_id, &dataset)?;
    written.push(dataset);

    let audit = out_dir.join("audit.toml");
    fs::write(&audit, toml::to_string_pretty(&prepared.audit)?)?;
    written.push(audit);

    let descriptives = tables.join("descriptives.tsv");
    let records = describe_columns(&prepared.rows, &config.descriptive_columns)
        .into_iter()
        .map(|d| {
            vec![
                d.variable,
                d.n.to_string(),
                d.missing.to_string(),
                cell(d.mean),
                cell(d.sd),
                cell(d.median),
                cell(d.iqr),
                cell(d.min),
                cell(d.max),
            ]
        })
        .collect();
    write_table(
        &descriptives,
        &["variable", "n", "missing", "mean", "sd", "median", "iqr", "min", "max"],
        records,
    )?;
    written.push(descriptives);

    let names = &config.columns;
    let mut core: Vec<String> = prepared.audit.composite_components.clone();
    core.push(names.anxiety_z.clone());
    core.push(names.avoidance_z.clone());
    core.extend(prepared.audit.covariates.iter().cloned());
    let missing = tables.join("missingness.tsv");
    let records = missingness(&prepared.rows, &core)
        .into_iter()
        .map(|m| vec![m.variable, m.n_missing.to_string(), cell(Some(m.fraction))])
        .collect();
    write_table(&missing, &["variable", "n_missing", "missing_fraction"], records)?;
    written.push(missing);

    let reliability = tables.join("reliability.tsv");
    let records = prepared
        .audit
        .reliability
        .iter()
        .map(|r| {
            vec![
                r.subscale.clone(),
                r.n_items.to_string(),
                r.complete_cases.to_string(),
                cell(r.alpha),
            ]
        })
        .collect();
    write_table(
        &reliability,
        &["subscale", "n_items", "complete_cases", "cronbach_alpha"],
        records,
    )?;
    written.push(reliability);

    Ok(written)
}

/// Writes everything `write_preparation` does plus the model outputs.
pub fn write_run(out_dir: &Path, run: &PipelineRun, config: &PipelineConfig) -> Result<Vec<PathBuf>, ReportError> {
    let mut written = write_preparation(out_dir, &run.prepared, config)?;
    let tables = out_dir.join("tables");
    let results = &run.results;
    let extended = results.extended.as_ref().and_then(ModelOutcome::fitted);

    let modeling = out_dir.join("modeling_dataset.tsv");
    let model_rows = match extended.or(results.baseline.as_ref().and_then(ModelOutcome::fitted)) {
        Some(model) => run.prepared.rows.select(&model.row_positions),
        None => run.prepared.rows.select(&[]),
    };
    write_rows(&model_rows, &config.columns.patient_id, &modeling)?;
    written.push(modeling);

    let record = out_dir.join("model_results.toml");
    fs::write(&record, toml::to_string_pretty(&ResultsRecord::from_run(run, config))?)?;
    written.push(record);

    let coefficients = tables.join("main_model_coefficients.tsv");
    write_table(
        &coefficients,
        &COEFFICIENT_HEADER,
        extended.map(coefficient_records).unwrap_or_default(),
    )?;
    written.push(coefficients);

    let surface = tables.join("surface_parameters.tsv");
    let records = results
        .surface_parameters
        .map(|a| {
            [("a1", a.a1), ("a2", a.a2), ("a3", a.a3), ("a4", a.a4)]
                .into_iter()
                .map(|(name, value)| vec![name.to_string(), cell(value)])
                .collect()
        })
        .unwrap_or_default();
    write_table(&surface, &["parameter", "value"], records)?;
    written.push(surface);

    let comparison = tables.join("model_comparison.tsv");
    let records = model_comparison(results.baseline.as_ref(), results.extended.as_ref())
        .into_iter()
        .map(|row| {
            vec![
                row.model,
                count(row.n_obs),
                count(row.k),
                cell(row.r_squared),
                cell(row.adjusted_r_squared),
            ]
        })
        .collect();
    write_table(
        &comparison,
        &["model", "n_obs", "k", "r_squared", "adjusted_r_squared"],
        records,
    )?;
    written.push(comparison);

    let secondary = tables.join("secondary_outcomes.tsv");
    let records = results
        .secondary
        .iter()
        .filter_map(ModelOutcome::fitted)
        .flat_map(coefficient_records)
        .collect();
    write_table(&secondary, &COEFFICIENT_HEADER, records)?;
    written.push(secondary);

    let grid = tables.join("response_surface_grid.tsv");
    write_table(
        &grid,
        &["anxiety_z", "avoidance_z", "predicted"],
        results.grid.as_ref().map(grid_records).unwrap_or_default(),
    )?;
    written.push(grid);

    log::info!("Wrote {} output files under '{}'", written.len(), out_dir.display());
    Ok(written)
}

fn grid_records(grid: &SurfaceGrid) -> Vec<Vec<String>> {
    grid.points
        .iter()
        .map(|p| vec![cell(Some(p.anxiety_z)), cell(Some(p.avoidance_z)), cell(Some(p.predicted))])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normal_p_values() {
        assert_abs_diff_eq!(p_from_t(0.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p_from_t(1.959964), 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(p_from_t(-1.959964), 0.05, epsilon = 1e-6);
        assert!(p_from_t(40.0) >= 0.0);
    }

    #[test]
    fn coefficient_row_derives_t_p_and_interval() {
        let row = CoefficientRow::new("x", 0.5, Some(0.25));
        assert_abs_diff_eq!(row.t.unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(row.ci_low.unwrap(), 0.5 - 0.49, epsilon = 1e-12);
        assert_abs_diff_eq!(row.ci_high.unwrap(), 0.5 + 0.49, epsilon = 1e-12);
        assert!(row.p.unwrap() < 0.05);

        let undefined = CoefficientRow::new("y", 1.0, None);
        assert_eq!((undefined.t, undefined.p, undefined.ci_low), (None, None, None));
    }

    #[test]
    fn cells_leave_undefined_values_empty() {
        assert_eq!(cell(None), "");
        assert_eq!(cell(Some(f64::NAN)), "");
        assert_eq!(cell(Some(0.5)), "0.5");
        assert_eq!(count(Some(3)), "3");
    }

    #[test]
    fn comparison_without_models_has_only_the_delta_row() {
        let rows = model_comparison(None, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].model, "delta_r_squared");
        assert_eq!(rows[0].r_squared, None);
    }
}
