//! Labeled abundance matrices.
//!
//! Rows are taxa, columns are samples. The same structure carries read
//! counts, mean percent identity and percent identity standard deviation;
//! missing values (e.g. a standard deviation from a single hit) are stored
//! as `NaN` and are kept distinct from zero.

use crate::bio::labels::{disambiguate, is_unique};
use log::warn;
use ndarray::{Array2, ArrayView1, Axis};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;

/// Row label of the synthetic unmapped-read row in the count matrix.
pub const OTHERS_LABEL: &str = "Others";

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("Dimension mismatch: {rows} row labels and {columns} column labels for a {shape:?} matrix")]
    DimensionMismatch {
        rows: usize,
        columns: usize,
        shape: (usize, usize),
    },

    #[error("Row '{label}' has {found} values, expected {expected}")]
    RowLength {
        label: String,
        found: usize,
        expected: usize,
    },

    #[error("Duplicate column label '{0}'")]
    DuplicateColumn(String),

    #[error("Invalid value '{value}' in row '{row}', column '{column}'")]
    InvalidValue {
        row: String,
        column: String,
        value: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A taxa x samples matrix with ordered row and column labels.
///
/// Row labels may repeat (e.g. after shortening taxon names) until they are
/// passed through [`crate::bio::labels::disambiguate`]; label lookups return
/// the first matching row. Column labels are always unique.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceMatrix {
    values: Array2<f64>,
    row_labels: Vec<String>,
    column_labels: Vec<String>,
    row_map: HashMap<String, usize>,
    column_map: HashMap<String, usize>,
}

impl AbundanceMatrix {
    /// Creates a matrix from labels and a value array of matching shape.
    pub fn new(
        row_labels: Vec<String>,
        column_labels: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, MatrixError> {
        if values.dim() != (row_labels.len(), column_labels.len()) {
            return Err(MatrixError::DimensionMismatch {
                rows: row_labels.len(),
                columns: column_labels.len(),
                shape: values.dim(),
            });
        }
        if let Some(duplicate) = first_duplicate(&column_labels) {
            return Err(MatrixError::DuplicateColumn(duplicate));
        }

        Ok(AbundanceMatrix {
            row_map: label_map(&row_labels),
            column_map: label_map(&column_labels),
            values,
            row_labels,
            column_labels,
        })
    }

    /// Creates a matrix with every cell set to `fill`.
    pub fn filled(
        row_labels: Vec<String>,
        column_labels: Vec<String>,
        fill: f64,
    ) -> Result<Self, MatrixError> {
        let values = Array2::from_elem((row_labels.len(), column_labels.len()), fill);
        Self::new(row_labels, column_labels, values)
    }

    /// Returns the dimensions of the matrix (taxa, samples).
    pub fn dimensions(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn column_labels(&self) -> &[String] {
        &self.column_labels
    }

    /// Returns a reference to the underlying value array.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn row_index(&self, label: &str) -> Option<usize> {
        self.row_map.get(label).copied()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.column_map.get(label).copied()
    }

    /// Retrieves the values of one taxon across all samples.
    pub fn row(&self, label: &str) -> Option<ArrayView1<f64>> {
        self.row_index(label).map(|idx| self.values.row(idx))
    }

    /// Retrieves the values of one sample across all taxa.
    pub fn column(&self, label: &str) -> Option<ArrayView1<f64>> {
        self.column_index(label).map(|idx| self.values.column(idx))
    }

    pub fn cell(&self, row: &str, column: &str) -> Option<f64> {
        let r = self.row_index(row)?;
        let c = self.column_index(column)?;
        Some(self.values[[r, c]])
    }

    pub(crate) fn set_by_index(&mut self, row: usize, column: usize, value: f64) {
        self.values[[row, column]] = value;
    }

    pub(crate) fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    /// Appends a row; `values` must hold one entry per column.
    pub fn push_row(&mut self, label: &str, values: &[f64]) -> Result<(), MatrixError> {
        let expected = self.column_labels.len();
        if values.len() != expected {
            return Err(MatrixError::RowLength {
                label: label.to_string(),
                found: values.len(),
                expected,
            });
        }
        self.values
            .push_row(ArrayView1::from(values))
            .map_err(|_| MatrixError::RowLength {
                label: label.to_string(),
                found: values.len(),
                expected,
            })?;
        self.row_map
            .entry(label.to_string())
            .or_insert(self.row_labels.len());
        self.row_labels.push(label.to_string());
        Ok(())
    }

    /// Per-sample totals, skipping missing values.
    pub fn column_sums(&self) -> Vec<f64> {
        self.values
            .axis_iter(Axis(1))
            .map(|col| col.iter().filter(|v| !v.is_nan()).sum())
            .collect()
    }

    /// Returns a new matrix with `f` applied to every cell.
    pub fn map_values<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        let mut out = self.clone();
        out.values.mapv_inplace(f);
        out
    }

    /// Returns a copy in which missing values are replaced by `value`.
    pub fn fill_missing(&self, value: f64) -> Self {
        self.map_values(|v| if v.is_nan() { value } else { v })
    }

    /// Returns a copy without the named rows; remaining rows keep their order.
    pub fn without_rows(&self, excluded: &[&str]) -> Self {
        let keep: Vec<usize> = (0..self.row_labels.len())
            .filter(|&i| !excluded.contains(&self.row_labels[i].as_str()))
            .collect();
        let values = self.values.select(Axis(0), &keep);
        let row_labels: Vec<String> = keep.iter().map(|&i| self.row_labels[i].clone()).collect();
        AbundanceMatrix {
            row_map: label_map(&row_labels),
            column_map: self.column_map.clone(),
            values,
            row_labels,
            column_labels: self.column_labels.clone(),
        }
    }

    /// Replaces row labels using `rename`, preserving row order.
    pub fn rename_rows<F>(&mut self, rename: F)
    where
        F: Fn(&str) -> String,
    {
        let labels = self.row_labels.iter().map(|l| rename(l)).collect();
        self.replace_row_labels(labels);
    }

    /// Replaces column labels using `rename`, preserving column order.
    pub fn rename_columns<F>(&mut self, rename: F) -> Result<(), MatrixError>
    where
        F: Fn(&str) -> String,
    {
        let labels: Vec<String> = self.column_labels.iter().map(|l| rename(l)).collect();
        if let Some(duplicate) = first_duplicate(&labels) {
            return Err(MatrixError::DuplicateColumn(duplicate));
        }
        self.column_map = label_map(&labels);
        self.column_labels = labels;
        Ok(())
    }

    /// Makes row labels unique by suffixing repeats with `_1`, `_2`, ...
    pub fn disambiguate_rows(&mut self) {
        let labels = disambiguate(&self.row_labels);
        if !is_unique(&labels) {
            warn!("Row labels still collide after adding ordinal suffixes; lookups by label return the first match.");
        }
        self.replace_row_labels(labels);
    }

    fn replace_row_labels(&mut self, labels: Vec<String>) {
        debug_assert_eq!(labels.len(), self.row_labels.len());
        self.row_map = label_map(&labels);
        self.row_labels = labels;
    }

    /// Writes the matrix as CSV: an empty corner cell, then sample labels.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        self.write_delimited(path, b',')
    }

    pub fn write_delimited(&self, path: impl AsRef<Path>, delimiter: u8) -> Result<(), MatrixError> {
        let file = File::create(path.as_ref())?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(BufWriter::new(file));

        let mut header = Vec::with_capacity(self.column_labels.len() + 1);
        header.push(String::new());
        header.extend(self.column_labels.iter().cloned());
        writer.write_record(&header)?;

        for (label, row) in self.row_labels.iter().zip(self.values.axis_iter(Axis(0))) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(label.clone());
            record.extend(row.iter().map(|&v| format_value(v)));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Reads a matrix written by [`AbundanceMatrix::write_csv`].
    ///
    /// Empty cells and `NA`/`NaN` are read as missing values.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path.as_ref())?;

        let headers = reader.headers()?.clone();
        let column_labels: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

        let mut row_labels = Vec::new();
        let mut flat = Vec::new();
        for result in reader.records() {
            let record = result?;
            let label = record.get(0).unwrap_or_default().to_string();
            if record.len() != column_labels.len() + 1 {
                return Err(MatrixError::RowLength {
                    label,
                    found: record.len().saturating_sub(1),
                    expected: column_labels.len(),
                });
            }
            for (field, column) in record.iter().skip(1).zip(&column_labels) {
                let value = parse_value(field).ok_or_else(|| MatrixError::InvalidValue {
                    row: label.clone(),
                    column: column.clone(),
                    value: field.to_string(),
                })?;
                flat.push(value);
            }
            row_labels.push(label);
        }

        let values = Array2::from_shape_vec((row_labels.len(), column_labels.len()), flat)
            .map_err(|_| MatrixError::DimensionMismatch {
                rows: row_labels.len(),
                columns: column_labels.len(),
                shape: (0, 0),
            })?;
        Self::new(row_labels, column_labels, values)
    }
}

fn label_map(labels: &[String]) -> HashMap<String, usize> {
    let mut map = HashMap::with_capacity(labels.len());
    for (i, label) in labels.iter().enumerate() {
        map.entry(label.clone()).or_insert(i);
    }
    map
}

fn first_duplicate(labels: &[String]) -> Option<String> {
    let mut seen = std::collections::HashSet::with_capacity(labels.len());
    labels.iter().find(|l| !seen.insert(l.as_str())).cloned()
}

/// Integral values are written without a fractional part so count tables
/// stay integer on disk.
fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn parse_value(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("na") || field.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    field.parse::<f64>().ok()
}
