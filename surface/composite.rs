//! Row-wise composite index over standardized components.

use crate::config::CompositeSpec;
use crate::standardize::log_zscore;
use crate::table::{Column, RowSet, TableError};

#[derive(Debug, Clone, PartialEq)]
pub enum CompositeOutcome {
    Built {
        values: Column,
        /// Components actually averaged, in order, including the optional one.
        components: Vec<String>,
    },
    /// A configured component column is absent.
    Omitted { missing: Vec<String> },
}

/// Arithmetic mean per row; any missing component makes the row missing.
pub fn row_mean_strict(columns: &[&[Option<f64>]]) -> Column {
    let n_rows = columns.first().map_or(0, |c| c.len());
    (0..n_rows)
        .map(|row| {
            let values: Option<Vec<f64>> = columns.iter().map(|col| col[row]).collect();
            values
                .filter(|v| !v.is_empty())
                .map(|v| v.iter().sum::<f64>() / v.len() as f64)
        })
        .collect()
}

/// Builds the composite described by `spec`.
///
/// When the optional log component's source column exists, its
/// log-standardized version is appended to `rows` under its configured output
/// name before averaging.
pub fn build_composite(rows: &mut RowSet, spec: &CompositeSpec) -> Result<CompositeOutcome, TableError> {
    let mut components = spec.components.clone();

    if let Some(optional) = &spec.optional_log_component {
        if let Some(source) = rows.column(&optional.source) {
            let transformed = log_zscore(source);
            rows.add_column(&optional.output, transformed)?;
            components.push(optional.output.clone());
            log::info!(
                "Optional component '{}' derived from '{}'",
                optional.output,
                optional.source
            );
        } else {
            log::info!(
                "Optional component source '{}' absent; composite uses {} components",
                optional.source,
                components.len()
            );
        }
    }

    let missing: Vec<String> = components
        .iter()
        .filter(|name| !rows.has_column(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        log::warn!("Composite '{}' omitted; missing components {missing:?}", spec.output);
        return Ok(CompositeOutcome::Omitted { missing });
    }

    let columns = components
        .iter()
        .map(|name| rows.require(name))
        .collect::<Result<Vec<_>, _>>()?;
    let values = row_mean_strict(&columns);
    log::info!(
        "Composite '{}' defined for {} of {} rows",
        spec.output,
        values.iter().filter(|v| v.is_some()).count(),
        values.len()
    );
    Ok(CompositeOutcome::Built { values, components })
}
