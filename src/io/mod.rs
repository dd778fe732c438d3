//! Input/Output operations module.
//!
//! Handles reading pipeline inputs (alignment tables, FASTA files) and
//! writing results (abundance tables, group comparison statistics).

pub mod alignment;
pub mod fasta;

use crate::abundance_matrix::MatrixError;
use crate::pipeline::aggregate::AbundanceTables;
use crate::stats::{ComparisonRow, GroupPair};
use anyhow::Result;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const COUNT_TABLE_FILE: &str = "count-table.csv";
pub const IDENTITY_MEAN_FILE: &str = "percent-identity-mean.csv";
pub const IDENTITY_STD_FILE: &str = "percent-identity-std.csv";
pub const DIFFERENTIAL_ABUNDANCE_DIR: &str = "differential-abundance";
pub const COMPARISON_FILE: &str = "Mann-Whitney-U.csv";

/// Directory holding the outputs of one group pair.
pub fn pair_output_dir(outdir: &Path, pair: &GroupPair) -> PathBuf {
    outdir.join(DIFFERENTIAL_ABUNDANCE_DIR).join(pair.label())
}

/// Writes the count, mean identity and identity std matrices as CSV.
pub fn write_abundance_tables(tables: &AbundanceTables, outdir: &Path) -> Result<(), MatrixError> {
    tables.counts.write_csv(outdir.join(COUNT_TABLE_FILE))?;
    tables.identity_mean.write_csv(outdir.join(IDENTITY_MEAN_FILE))?;
    tables.identity_std.write_csv(outdir.join(IDENTITY_STD_FILE))?;
    Ok(())
}

/// Writes the statistics of one group pair to a CSV file.
///
/// Rows are written in the given order; missing values become `NA`.
pub fn write_comparison_results(
    rows: &[ComparisonRow],
    pair: &GroupPair,
    output_path: &Path,
) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));

    writer.write_record([
        "Taxon".to_string(),
        format!("Mean {} (%)", pair.group_1),
        format!("Mean {} (%)", pair.group_2),
        "Statistic".to_string(),
        "Z".to_string(),
        "P value".to_string(),
        "Benjamini-Hochberg adjusted P value".to_string(),
        "Significant".to_string(),
    ])?;

    let na = |v: Option<f64>| v.filter(|x| !x.is_nan()).map_or("NA".to_string(), |x| x.to_string());
    for row in rows {
        writer.write_record([
            row.taxon.clone(),
            na(Some(row.mean_1)),
            na(Some(row.mean_2)),
            na(row.statistic),
            na(row.z),
            na(row.p_value),
            na(row.p_adjusted),
            row.significant.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
