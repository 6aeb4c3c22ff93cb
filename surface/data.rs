//! # Ingestion and Dataset Export
//!
//! Delimited text is read through `polars`. Every non-id column is cast to
//! `Float64` non-strictly, so unparsable cells and non-finite values become
//! missing rather than failing the load. Columns that lose every value in
//! the cast (free text) are dropped with a log line.

use crate::table::{RowSet, TableError};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),

    #[error("Failed to access file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to write delimited output: {0}")]
    CsvError(#[from] csv::Error),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Input file '{0}' contains no data rows.")]
    EmptyInput(String),
}

/// Loads patient records from a delimited file with a header row.
///
/// The `id_column`, when present and fully populated, supplies the patient
/// ids; otherwise rows are numbered from 1.
pub fn load_rows(path: &Path, id_column: &str, separator: u8) -> Result<RowSet, DataError> {
    println!("Loading data from '{}'", path.display());
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_parse_options(CsvParseOptions::default().with_separator(separator)),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::EmptyInput(path.display().to_string()));
    }

    let mut rows = RowSet::new(build_patient_ids(&df, id_column)?);
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == id_column {
            continue;
        }
        let values: Vec<Option<f64>> = column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        if column.null_count() < df.height() && values.iter().all(Option::is_none) {
            log::info!("Column '{name}' is not numeric and was skipped");
            continue;
        }
        rows.add_column(name, values)?;
    }

    log::info!(
        "Loaded {} rows and {} numeric columns from '{}'",
        rows.n_rows(),
        rows.n_cols(),
        path.display()
    );
    Ok(rows)
}

fn build_patient_ids(df: &DataFrame, id_column: &str) -> Result<Vec<String>, DataError> {
    let n = df.height();
    let sequential = || (1..=n).map(|i| i.to_string()).collect::<Vec<_>>();

    let Ok(column) = df.column(id_column) else {
        log::warn!("Id column '{id_column}' absent; numbering rows from 1");
        return Ok(sequential());
    };
    if column.null_count() > 0 {
        log::warn!("Id column '{id_column}' has missing values; numbering rows from 1");
        return Ok(sequential());
    }

    let as_text = column.cast(&DataType::String)?;
    Ok(as_text
        .str()?
        .into_iter()
        .enumerate()
        .map(|(i, id)| match id {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => (i + 1).to_string(),
        })
        .collect())
}

/// Writes `rows` as tab-separated text, ids first under `id_column`.
/// Missing values are written as empty cells.
pub fn write_rows(rows: &RowSet, id_column: &str, path: &Path) -> Result<(), DataError> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    let mut header = vec![id_column.to_string()];
    header.extend(rows.column_names().iter().cloned());
    writer.write_record(&header)?;

    let columns = rows
        .column_names()
        .iter()
        .map(|name| rows.require(name))
        .collect::<Result<Vec<_>, _>>()?;
    let mut buffer = ryu::Buffer::new();
    for (row, id) in rows.ids().iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(id.clone());
        for column in &columns {
            record.push(match column[row] {
                Some(value) => buffer.format(value).to_string(),
                None => String::new(),
            });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    log::debug!("Wrote {} rows to '{}'", rows.n_rows(), path.display());
    Ok(())
}
