//! # Analysis Pipeline
//!
//! Stages run in a fixed order, each appending columns to the row-set:
//!
//! 1. attachment scores, rescored from items or taken precomputed
//! 2. standardized attachment scores, their squares and interaction
//! 3. standardized objective-burden covariates
//! 4. the composite outcome index
//! 5. the baseline fit, whose residual is the amplification signal
//! 6. the extended response-surface fit and its surface parameters
//! 7. refits of the extended predictors on each secondary outcome
//!
//! Missing inputs remove the dependent stages and are recorded as omissions.
//! Input columns that already carry a derived name are dropped and recomputed.
//! Only a structural row-set failure is an error.

use crate::composite::{CompositeOutcome, build_composite};
use crate::config::{ColumnNames, PipelineConfig};
use crate::model::{ModelOutcome, ModelSpec, delta_r_squared, fit_model};
use crate::rescore::{ReliabilityReport, RescoreOutcome, rescore};
use crate::response_surface::{
    SurfaceCoefficients, SurfaceGrid, SurfaceParameters, insecurity_mean, surface_grid, surface_terms,
};
use crate::standardize::zscore;
use crate::table::{RowSet, TableError, zip_with};
use serde::Serialize;
use thiserror::Error;

pub const BASELINE_MODEL: &str = "baseline";
pub const EXTENDED_MODEL: &str = "response_surface";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Row-set operation failed: {0}")]
    Table(#[from] TableError),
}

/// Where the attachment subscale scores came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentSource {
    Rescored,
    Precomputed,
    Unavailable,
}

/// What preparation saw and did, written out as the audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepAudit {
    pub n_rows: usize,
    pub n_cols: usize,
    pub columns: Vec<String>,
    pub missing_required: Vec<String>,
    pub attachment_source: AttachmentSource,
    /// Baseline covariates in design order.
    pub covariates: Vec<String>,
    pub composite_components: Vec<String>,
    pub notes: Vec<String>,
    pub omissions: Vec<String>,
    pub reliability: Vec<ReliabilityReport>,
}

#[derive(Debug, Clone)]
pub struct Prepared {
    pub rows: RowSet,
    pub audit: PrepAudit,
}

impl Prepared {
    fn composite_available(&self, config: &PipelineConfig) -> bool {
        self.rows.has_column(&config.composite.output)
    }

    fn surface_available(&self) -> bool {
        self.audit.attachment_source != AttachmentSource::Unavailable
    }
}

#[derive(Debug)]
pub struct ModelResults {
    pub baseline: Option<ModelOutcome>,
    pub extended: Option<ModelOutcome>,
    pub delta_r_squared: Option<f64>,
    pub surface_coefficients: Option<SurfaceCoefficients>,
    pub surface_parameters: Option<SurfaceParameters>,
    pub grid: Option<SurfaceGrid>,
    pub secondary: Vec<ModelOutcome>,
    pub omissions: Vec<String>,
}

#[derive(Debug)]
pub struct PipelineRun {
    pub prepared: Prepared,
    pub results: ModelResults,
}

/// Derives every analysis column from the raw input.
pub fn prepare(input: RowSet, config: &PipelineConfig) -> Result<Prepared, PipelineError> {
    let mut rows = input;
    let names = &config.columns;
    let columns = rows.column_names().to_vec();
    let mut notes = Vec::new();
    let mut omissions = Vec::new();
    log::info!("Preparing {} rows with {} columns", rows.n_rows(), columns.len());

    let missing_required: Vec<String> = config
        .required_columns
        .iter()
        .filter(|name| **name != names.patient_id && !rows.has_column(name))
        .cloned()
        .collect();
    if !missing_required.is_empty() {
        log::warn!("Required columns absent: {missing_required:?}");
    }

    let shadowed: Vec<String> = config
        .derived_columns()
        .into_iter()
        .filter(|name| rows.has_column(name))
        .collect();
    if !shadowed.is_empty() {
        log::warn!("Input columns {shadowed:?} carry derived names; they are recomputed");
        notes.push(format!(
            "input columns {shadowed:?} share derived names; dropped and recomputed from their sources"
        ));
        rows = rows.without(&shadowed);
    }

    let (attachment_source, reliability, scales) = match rescore(&rows, &config.questionnaire) {
        RescoreOutcome::Scored {
            anxiety,
            avoidance,
            reliability,
        } => {
            rows.add_column(&names.anxiety_rescored, anxiety)?;
            rows.add_column(&names.avoidance_rescored, avoidance)?;
            notes.push("attachment subscales rescored from item-level responses".to_string());
            (
                AttachmentSource::Rescored,
                reliability,
                Some((names.anxiety_rescored.clone(), names.avoidance_rescored.clone())),
            )
        }
        RescoreOutcome::Unavailable { missing } => {
            notes.push(format!("item-level rescoring unavailable; {} item column(s) absent", missing.len()));
            precomputed_scales(&rows, names, &mut notes, &mut omissions)
        }
        RescoreOutcome::InvalidKey { reason } => {
            notes.push(format!("item-level rescoring unavailable; {reason}"));
            precomputed_scales(&rows, names, &mut notes, &mut omissions)
        }
    };

    if let Some((anxiety_name, avoidance_name)) = &scales {
        let anxiety = rows.require(anxiety_name)?.to_vec();
        let avoidance = rows.require(avoidance_name)?.to_vec();
        let anxiety_z = zscore(&anxiety);
        let avoidance_z = zscore(&avoidance);
        let product = |a: f64, b: f64| a * b;
        rows.add_column(&names.anxiety_squared, zip_with(&anxiety_z, &anxiety_z, product))?;
        rows.add_column(&names.anxiety_x_avoidance, zip_with(&anxiety_z, &avoidance_z, product))?;
        rows.add_column(&names.avoidance_squared, zip_with(&avoidance_z, &avoidance_z, product))?;
        rows.add_column(&names.anxiety_z, anxiety_z)?;
        rows.add_column(&names.avoidance_z, avoidance_z)?;
        rows.add_column(&names.insecurity_mean, insecurity_mean(&anxiety, &avoidance))?;
        log::info!("Attachment terms derived from '{anxiety_name}' and '{avoidance_name}'");
    }

    let mut covariates = Vec::new();
    for covariate in &config.covariates.standardized {
        if rows.has_column(&covariate.output) {
            notes.push(format!("covariate '{}' present in the input; used as-is", covariate.output));
            covariates.push(covariate.output.clone());
        } else if let Some(source) = rows.column(&covariate.source) {
            let standardized = zscore(source);
            rows.add_column(&covariate.output, standardized)?;
            covariates.push(covariate.output.clone());
        } else {
            log::warn!("Covariate source '{}' absent; '{}' omitted", covariate.source, covariate.output);
            omissions.push(format!(
                "covariate '{}': source column '{}' absent",
                covariate.output, covariate.source
            ));
        }
    }
    for raw in &config.covariates.raw {
        if rows.has_column(raw) {
            covariates.push(raw.clone());
        } else {
            log::warn!("Covariate '{raw}' absent; omitted");
            omissions.push(format!("covariate '{raw}': column absent"));
        }
    }

    let composite_components = match build_composite(&mut rows, &config.composite)? {
        CompositeOutcome::Built { values, components } => {
            rows.add_column(&config.composite.output, values)?;
            components
        }
        CompositeOutcome::Omitted { missing } => {
            omissions.push(format!(
                "composite '{}' and every model on it: components {missing:?} absent",
                config.composite.output
            ));
            Vec::new()
        }
    };

    log::info!(
        "Preparation complete: {} columns, covariates [{}]",
        rows.n_cols(),
        covariates.join(", ")
    );
    let audit = PrepAudit {
        n_rows: rows.n_rows(),
        n_cols: columns.len(),
        columns,
        missing_required,
        attachment_source,
        covariates,
        composite_components,
        notes,
        omissions,
        reliability,
    };
    Ok(Prepared { rows, audit })
}

type ScaleSelection = (AttachmentSource, Vec<ReliabilityReport>, Option<(String, String)>);

// Falls back to the precomputed subscale means when rescoring is impossible.
fn precomputed_scales(
    rows: &RowSet,
    names: &ColumnNames,
    notes: &mut Vec<String>,
    omissions: &mut Vec<String>,
) -> ScaleSelection {
    if rows.has_column(&names.anxiety_precomputed) && rows.has_column(&names.avoidance_precomputed) {
        notes.push("precomputed attachment subscale means used".to_string());
        (
            AttachmentSource::Precomputed,
            Vec::new(),
            Some((names.anxiety_precomputed.clone(), names.avoidance_precomputed.clone())),
        )
    } else {
        omissions.push("response-surface model: no attachment subscale scores".to_string());
        log::warn!("No attachment subscale scores; the response-surface model is omitted");
        (AttachmentSource::Unavailable, Vec::new(), None)
    }
}

/// Fits the nested models on a prepared row-set and appends the baseline
/// prediction, its residual, and the extended prediction.
pub fn fit_models(prepared: &mut Prepared, config: &PipelineConfig) -> Result<ModelResults, PipelineError> {
    let names = &config.columns;
    let covariates = prepared.audit.covariates.clone();
    let mut results = ModelResults {
        baseline: None,
        extended: None,
        delta_r_squared: None,
        surface_coefficients: None,
        surface_parameters: None,
        grid: None,
        secondary: Vec::new(),
        omissions: Vec::new(),
    };

    if !prepared.composite_available(config) {
        log::warn!("Composite outcome unavailable; no models are fitted");
        results
            .omissions
            .push(format!("all models: outcome '{}' absent", config.composite.output));
        return Ok(results);
    }

    let baseline = fit_model(
        &prepared.rows,
        &ModelSpec {
            name: BASELINE_MODEL.to_string(),
            outcome: config.composite.output.clone(),
            predictors: covariates.clone(),
        },
    )?;
    let n_rows = prepared.rows.n_rows();
    if let Some(model) = baseline.fitted() {
        prepared
            .rows
            .add_column(&names.baseline_prediction, model.fitted_column(n_rows))?;
        prepared
            .rows
            .add_column(&names.baseline_residual, model.residual_column(n_rows))?;
    }

    if !prepared.surface_available() {
        results
            .omissions
            .push("extended and secondary models: attachment scores absent".to_string());
        results.baseline = Some(baseline);
        return Ok(results);
    }

    let mut predictors = surface_terms(names).to_vec();
    predictors.extend(covariates.iter().cloned());
    let extended = fit_model(
        &prepared.rows,
        &ModelSpec {
            name: EXTENDED_MODEL.to_string(),
            outcome: config.composite.output.clone(),
            predictors: predictors.clone(),
        },
    )?;

    if let Some(model) = extended.fitted() {
        prepared
            .rows
            .add_column(&names.full_prediction, model.fitted_column(n_rows))?;
        let coefficients = SurfaceCoefficients::from_model(model, names);
        let parameters = coefficients.parameters();
        log::info!(
            "Surface parameters: a1 = {:?}, a2 = {:?}, a3 = {:?}, a4 = {:?}",
            parameters.a1,
            parameters.a2,
            parameters.a3,
            parameters.a4
        );
        results.surface_coefficients = Some(coefficients);
        results.surface_parameters = Some(parameters);
        results.grid = surface_grid(model, &prepared.rows, names, &config.grid)?;
    }
    results.delta_r_squared = delta_r_squared(baseline.fitted(), extended.fitted());

    for outcome in &config.secondary_outcomes {
        if !prepared.rows.has_column(outcome) {
            log::warn!("Secondary outcome '{outcome}' absent; skipped");
            results
                .omissions
                .push(format!("secondary model: outcome '{outcome}' absent"));
            continue;
        }
        let secondary = fit_model(
            &prepared.rows,
            &ModelSpec {
                name: format!("secondary_{outcome}"),
                outcome: outcome.clone(),
                predictors: predictors.clone(),
            },
        )?;
        results.secondary.push(secondary);
    }

    results.baseline = Some(baseline);
    results.extended = Some(extended);
    Ok(results)
}

/// Prepares the input and fits every model.
pub fn run(input: RowSet, config: &PipelineConfig) -> Result<PipelineRun, PipelineError> {
    let mut prepared = prepare(input, config)?;
    let results = fit_models(&mut prepared, config)?;
    Ok(PipelineRun { prepared, results })
}
