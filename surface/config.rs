//! # Pipeline Configuration
//!
//! Every fixed name and keying table the pipeline relies on lives here, in
//! plain serde structures that are passed explicitly into each stage. The
//! defaults reproduce the manuscript analysis; a TOML file may override any
//! subset of fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid questionnaire key: {0}")]
    InvalidKey(String),
    #[error("Invalid response-surface grid: {0}")]
    InvalidGrid(String),
}

/// Stable names of the raw inputs and the derived columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub patient_id: String,
    /// Precomputed subscale means, used when item-level data is unavailable.
    pub anxiety_precomputed: String,
    pub avoidance_precomputed: String,
    pub anxiety_rescored: String,
    pub avoidance_rescored: String,
    pub anxiety_z: String,
    pub avoidance_z: String,
    pub anxiety_squared: String,
    pub anxiety_x_avoidance: String,
    pub avoidance_squared: String,
    pub insecurity_mean: String,
    pub baseline_prediction: String,
    pub baseline_residual: String,
    pub full_prediction: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            patient_id: "PID".into(),
            anxiety_precomputed: "ecr_anxiety_mean_0_4".into(),
            avoidance_precomputed: "ecr_avoidance_mean_0_4".into(),
            anxiety_rescored: "ecr_anxiety_rescored".into(),
            avoidance_rescored: "ecr_avoidance_rescored".into(),
            anxiety_z: "anx_z".into(),
            avoidance_z: "avoid_z".into(),
            anxiety_squared: "anx2".into(),
            anxiety_x_avoidance: "anx_x_avoid".into(),
            avoidance_squared: "avoid2".into(),
            insecurity_mean: "attachment_insecurity_mean_0_4".into(),
            baseline_prediction: "pci3_pred_baseline".into(),
            baseline_residual: "PUA_residual".into(),
            full_prediction: "pci3_pred_full".into(),
        }
    }
}

/// Item keying for the twelve-item attachment questionnaire.
///
/// Item numbers are 1-based positions into `item_columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionnaireKey {
    pub item_columns: Vec<String>,
    pub anxiety_items: Vec<usize>,
    pub avoidance_items: Vec<usize>,
    pub reversed_items: Vec<usize>,
    /// Upper end of the response scale; the lower end is always 0.
    pub scale_max: f64,
}

impl Default for QuestionnaireKey {
    fn default() -> Self {
        Self {
            item_columns: (1..=12).map(|i| format!("ecr_item_{i}")).collect(),
            anxiety_items: vec![1, 2, 5, 8, 10, 11],
            avoidance_items: vec![3, 4, 6, 7, 9, 12],
            reversed_items: vec![3, 4, 9, 12],
            scale_max: 4.0,
        }
    }
}

impl QuestionnaireKey {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.item_columns.len();
        if n != 12 {
            return Err(ConfigError::InvalidKey(format!(
                "expected 12 item columns, found {n}"
            )));
        }
        for &item in self
            .anxiety_items
            .iter()
            .chain(&self.avoidance_items)
            .chain(&self.reversed_items)
        {
            if item == 0 || item > n {
                return Err(ConfigError::InvalidKey(format!(
                    "item number {item} is outside 1..={n}"
                )));
            }
        }
        for &item in &self.reversed_items {
            if !self.anxiety_items.contains(&item) && !self.avoidance_items.contains(&item) {
                return Err(ConfigError::InvalidKey(format!(
                    "reversed item {item} belongs to no subscale"
                )));
            }
        }
        if !(self.scale_max > 0.0 && self.scale_max.is_finite()) {
            return Err(ConfigError::InvalidKey(format!(
                "scale maximum must be positive, got {}",
                self.scale_max
            )));
        }
        Ok(())
    }
}

/// An optional count column that is log-standardized into a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogComponent {
    pub source: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeSpec {
    pub output: String,
    pub components: Vec<String>,
    pub optional_log_component: Option<LogComponent>,
}

impl Default for CompositeSpec {
    fn default() -> Self {
        Self {
            output: "periop_intensity_index_z".into(),
            components: vec![
                "utilization_shortterm_z".into(),
                "pharmaburden_z".into(),
                "pain_burden_z".into(),
                "sedation_risk_z".into(),
            ],
            optional_log_component: Some(LogComponent {
                source: "lab_postop_Anzahl".into(),
                output: "lab_postop_z".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedCovariate {
    pub source: String,
    pub output: String,
}

/// Objective-burden covariates of the baseline model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovariateConfig {
    /// Entered as-is (e.g. a binary sex indicator), after the standardized ones.
    pub raw: Vec<String>,
    /// Standardized before entering the design, in this order.
    pub standardized: Vec<StandardizedCovariate>,
}

impl Default for CovariateConfig {
    fn default() -> Self {
        let pair = |source: &str, output: &str| StandardizedCovariate {
            source: source.into(),
            output: output.into(),
        };
        Self {
            raw: vec!["sex_bin".into()],
            standardized: vec![
                pair("CCI_altersadjustiert", "cci_z"),
                pair("OP_Schweregrad_plus30_Hoechster", "opsev_z"),
                pair("oncology_activity_z", "onco_z"),
                pair("age", "age_z"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceGridConfig {
    pub points: usize,
    pub min: f64,
    pub max: f64,
}

impl Default for SurfaceGridConfig {
    fn default() -> Self {
        Self {
            points: 120,
            min: -2.5,
            max: 2.5,
        }
    }
}

/// The complete, immutable configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Recorded with the results for reproducibility; no stage draws random numbers.
    pub seed: u64,
    /// Raw columns whose absence is reported in the audit.
    pub required_columns: Vec<String>,
    /// Columns summarized in the descriptives table, read from the prepared row-set.
    pub descriptive_columns: Vec<String>,
    pub secondary_outcomes: Vec<String>,
    pub columns: ColumnNames,
    pub questionnaire: QuestionnaireKey,
    pub composite: CompositeSpec,
    pub covariates: CovariateConfig,
    pub grid: SurfaceGridConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let columns = ColumnNames::default();
        let composite = CompositeSpec::default();
        let covariates = CovariateConfig::default();

        let mut required_columns = vec![
            columns.patient_id.clone(),
            columns.anxiety_precomputed.clone(),
            columns.avoidance_precomputed.clone(),
        ];
        required_columns.extend(covariates.standardized.iter().take(3).map(|c| c.source.clone()));
        required_columns.extend(composite.components.iter().cloned());

        let mut descriptive_columns = vec![
            columns.anxiety_precomputed.clone(),
            columns.avoidance_precomputed.clone(),
            columns.anxiety_rescored.clone(),
            columns.avoidance_rescored.clone(),
        ];
        descriptive_columns.extend(covariates.standardized.iter().take(3).map(|c| c.source.clone()));
        descriptive_columns.extend(composite.components.iter().cloned());
        descriptive_columns.push(composite.output.clone());

        Self {
            seed: 1337,
            required_columns,
            descriptive_columns,
            secondary_outcomes: composite.components.clone(),
            columns,
            questionnaire: QuestionnaireKey::default(),
            composite,
            covariates,
            grid: SurfaceGridConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a TOML file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Every column name the pipeline derives rather than reads.
    pub fn derived_columns(&self) -> Vec<String> {
        let names = &self.columns;
        let mut derived = vec![
            names.anxiety_rescored.clone(),
            names.avoidance_rescored.clone(),
            names.anxiety_z.clone(),
            names.avoidance_z.clone(),
            names.anxiety_squared.clone(),
            names.anxiety_x_avoidance.clone(),
            names.avoidance_squared.clone(),
            names.insecurity_mean.clone(),
            self.composite.output.clone(),
            names.baseline_prediction.clone(),
            names.baseline_residual.clone(),
            names.full_prediction.clone(),
        ];
        if let Some(log_component) = &self.composite.optional_log_component {
            derived.push(log_component.output.clone());
        }
        derived
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.questionnaire.validate()?;
        if self.grid.points < 2 {
            return Err(ConfigError::InvalidGrid(format!(
                "at least 2 points are required, got {}",
                self.grid.points
            )));
        }
        if !(self.grid.min < self.grid.max) {
            return Err(ConfigError::InvalidGrid(format!(
                "min ({}) must be below max ({})",
                self.grid.min, self.grid.max
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_is_valid_and_round_trips() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        let text = config.to_toml().unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "seed = 7\n\n[grid]\npoints = 5").unwrap();
        file.flush().unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.grid.points, 5);
        assert_eq!(config.grid.min, -2.5);
        assert_eq!(config.questionnaire, QuestionnaireKey::default());
    }

    #[test]
    fn key_validation_catches_bad_items() {
        let mut key = QuestionnaireKey::default();
        key.reversed_items.push(13);
        assert!(matches!(key.validate(), Err(ConfigError::InvalidKey(_))));

        let mut key = QuestionnaireKey::default();
        key.item_columns.pop();
        assert!(key.validate().is_err());
    }

    #[test]
    fn degenerate_grid_is_rejected() {
        let mut config = PipelineConfig::default();
        config.grid.points = 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGrid(_))));
    }
}
