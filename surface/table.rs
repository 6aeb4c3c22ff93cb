//! # Row-Set Data Model
//!
//! A `RowSet` is the single tabular structure that flows through every stage
//! of the pipeline. Rows are patients, identified by an explicit id vector
//! that is never reordered. Columns are named, numeric, and carry missingness
//! as `None` rather than as a floating-point sentinel.
//!
//! Stages only ever append columns. Subset computations (complete-case fits)
//! work on row positions and hand their results back through [`scatter`], so
//! a value can never land on the wrong patient.

use thiserror::Error;

/// One numeric column. `None` marks a missing value.
pub type Column = Vec<Option<f64>>;

#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("Column '{0}' already exists; derived columns may not overwrite existing data.")]
    DuplicateColumn(String),
    #[error("Column '{name}' has {found} values, but the row-set has {expected} rows.")]
    LengthMismatch {
        name: String,
        found: usize,
        expected: usize,
    },
    #[error("Column '{0}' was not found in the row-set.")]
    ColumnNotFound(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    ids: Vec<String>,
    names: Vec<String>,
    columns: Vec<Column>,
}

impl RowSet {
    /// Creates an empty row-set holding only patient identifiers.
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn n_rows(&self) -> usize {
        self.ids.len()
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.position(name).map(|idx| self.columns[idx].as_slice())
    }

    /// Like [`RowSet::column`] but reports an absent name as an error.
    pub fn require(&self, name: &str) -> Result<&[Option<f64>], TableError> {
        self.column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    /// Appends a column. Existing columns are never replaced.
    pub fn add_column(&mut self, name: &str, values: Column) -> Result<(), TableError> {
        if self.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        if values.len() != self.n_rows() {
            return Err(TableError::LengthMismatch {
                name: name.to_string(),
                found: values.len(),
                expected: self.n_rows(),
            });
        }
        log::debug!(
            "Adding column '{name}' ({} of {} values present)",
            values.iter().filter(|v| v.is_some()).count(),
            values.len()
        );
        self.names.push(name.to_string());
        self.columns.push(values);
        Ok(())
    }

    /// Row positions at which every listed column holds a value.
    pub fn complete_cases(&self, columns: &[String]) -> Result<Vec<usize>, TableError> {
        let selected = columns
            .iter()
            .map(|name| self.require(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.n_rows())
            .filter(|&row| selected.iter().all(|col| col[row].is_some()))
            .collect())
    }

    /// Values of `name` at the given row positions, or `None` if any of them is
    /// missing. Positions normally come from [`RowSet::complete_cases`].
    pub fn gather(&self, name: &str, positions: &[usize]) -> Result<Option<Vec<f64>>, TableError> {
        let column = self.require(name)?;
        Ok(positions.iter().map(|&row| column[row]).collect())
    }

    /// A new row-set holding only the rows at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> RowSet {
        RowSet {
            ids: positions.iter().map(|&row| self.ids[row].clone()).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|column| positions.iter().map(|&row| column[row]).collect())
                .collect(),
        }
    }

    /// A new row-set without the named columns. Absent names are ignored.
    pub fn without(&self, names: &[String]) -> RowSet {
        let (names, columns) = self
            .names
            .iter()
            .zip(&self.columns)
            .filter(|(name, _)| !names.contains(name))
            .map(|(name, column)| (name.clone(), column.clone()))
            .unzip();
        RowSet {
            ids: self.ids.clone(),
            names,
            columns,
        }
    }
}

/// Places `values` (one per entry of `positions`) back into a full-length
/// column. Rows not listed stay missing.
pub fn scatter(len: usize, positions: &[usize], values: &[f64]) -> Column {
    let mut out = vec![None; len];
    for (&row, &value) in positions.iter().zip(values) {
        out[row] = Some(value);
    }
    out
}

/// Row-wise combination of two columns, missing whenever either input is.
pub fn zip_with(a: &[Option<f64>], b: &[Option<f64>], f: impl Fn(f64, f64) -> f64) -> Column {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(f(*x, *y)),
            _ => None,
        })
        .collect()
}
