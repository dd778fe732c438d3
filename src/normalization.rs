//! Provides functions for normalizing abundance matrices.
//!
//! Normalization makes counts comparable across samples with different
//! read depths (`by_sample_reads`) or compresses their dynamic range for
//! display (`log_pseudocount`). The input matrix is never modified.

use crate::abundance_matrix::AbundanceMatrix;
use log::warn;
use ndarray::Axis;
use serde::{Deserialize, Serialize};

/// Which transformations to apply, in the order listed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationOptions {
    /// Scale each sample so that its non-missing values sum to `sample_reads_unit`.
    pub by_sample_reads: bool,
    pub sample_reads_unit: f64,
    /// Replace every value `x` by `ln(x + 1)`.
    pub log_pseudocount: bool,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        NormalizationOptions {
            by_sample_reads: false,
            sample_reads_unit: 100.0,
            log_pseudocount: false,
        }
    }
}

impl NormalizationOptions {
    /// Per-sample relative abundance; `unit` of 100 gives percentages.
    pub fn relative_abundance(unit: f64) -> Self {
        NormalizationOptions {
            by_sample_reads: true,
            sample_reads_unit: unit,
            ..Default::default()
        }
    }

    pub fn log_pseudocount() -> Self {
        NormalizationOptions {
            log_pseudocount: true,
            ..Default::default()
        }
    }
}

/// Returns a normalized copy of `matrix`.
pub fn normalize(matrix: &AbundanceMatrix, options: &NormalizationOptions) -> AbundanceMatrix {
    let mut normalized = matrix.clone();
    if options.by_sample_reads {
        scale_by_sample_reads(&mut normalized, options.sample_reads_unit);
    }
    if options.log_pseudocount {
        normalized = normalized.map_values(|v| (v + 1.0).ln());
    }
    normalized
}

/// Divides each column by its total (missing values excluded) and multiplies
/// by `unit`. A column without a positive total becomes missing.
fn scale_by_sample_reads(matrix: &mut AbundanceMatrix, unit: f64) {
    let totals = matrix.column_sums();
    let samples = matrix.column_labels().to_vec();

    matrix
        .values_mut()
        .axis_iter_mut(Axis(1))
        .zip(totals.iter())
        .zip(samples.iter())
        .for_each(|((mut col, &total), sample)| {
            if total > 0.0 {
                col *= unit / total;
            } else {
                warn!(
                    "Sample '{}' has a total of {}; its relative abundances are left empty.",
                    sample, total
                );
                col.fill(f64::NAN);
            }
        });
}
