//! Plot-ready data for heatmaps and per-pair boxplots.
//!
//! Rendering is left to external tools; this module writes the matrices and
//! long-format tables they consume.

use crate::abundance_matrix::{AbundanceMatrix, MatrixError};
use crate::bio::taxonomy::shorten_silva_label;
use crate::metadata::SampleSheet;
use crate::normalization::{normalize, NormalizationOptions};
use crate::pipeline::aggregate::AbundanceTables;
use crate::stats::GroupPair;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const HEATMAP_DIR: &str = "heatmap";
pub const BOXPLOT_FILE: &str = "boxplot-data.csv";

/// The three heatmap matrices, with sample columns tagged by group.
#[derive(Debug, Clone)]
pub struct HeatmapData {
    pub log_pseudocount: AbundanceMatrix,
    pub identity_mean: AbundanceMatrix,
    pub identity_std: AbundanceMatrix,
}

impl HeatmapData {
    /// Counts are log-transformed with a pseudocount of one; missing
    /// identity statistics are drawn as zero.
    pub fn prepare(
        tables: &AbundanceTables,
        sheet: &SampleSheet,
        publication_labels: bool,
    ) -> Result<Self, MatrixError> {
        let mut matrices = [
            normalize(&tables.counts, &NormalizationOptions::log_pseudocount()),
            tables.identity_mean.fill_missing(0.0),
            tables.identity_std.fill_missing(0.0),
        ];
        for matrix in matrices.iter_mut() {
            if publication_labels {
                matrix.rename_rows(shorten_silva_label);
                matrix.disambiguate_rows();
            }
            tag_group_names(matrix, sheet)?;
        }

        let [log_pseudocount, identity_mean, identity_std] = matrices;
        Ok(HeatmapData {
            log_pseudocount,
            identity_mean,
            identity_std,
        })
    }

    /// Writes the matrices as TSV files into `<outdir>/heatmap/`.
    pub fn write(&self, outdir: &Path) -> Result<Vec<PathBuf>, MatrixError> {
        let dir = outdir.join(HEATMAP_DIR);
        fs::create_dir_all(&dir)?;

        let mut written = Vec::with_capacity(3);
        for (name, matrix) in [
            ("log-pseudocount.tsv", &self.log_pseudocount),
            ("percent-identity-mean.tsv", &self.identity_mean),
            ("percent-identity-std.tsv", &self.identity_std),
        ] {
            let path = dir.join(name);
            matrix.write_delimited(&path, b'\t')?;
            written.push(path);
        }
        info!("Heatmap data written to {}", dir.display());
        Ok(written)
    }
}

/// Renames sample columns to `<sample> (<group>)`; samples without a group
/// keep their name.
fn tag_group_names(matrix: &mut AbundanceMatrix, sheet: &SampleSheet) -> Result<(), MatrixError> {
    matrix.rename_columns(|sample| match sheet.group_of(sample) {
        Some(group) => format!("{} ({})", sample, group),
        None => sample.to_string(),
    })
}

/// One point of a per-taxon boxplot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxplotRecord {
    #[serde(rename = "Taxon")]
    pub taxon: String,
    #[serde(rename = "Sample")]
    pub sample: String,
    #[serde(rename = "Group")]
    pub group: String,
    #[serde(rename = "Relative abundance (%)")]
    pub value: f64,
}

/// Long-format values of every taxon for the samples of the two groups in
/// `pair`, taxa in matrix order and samples in sheet order.
pub fn boxplot_records(
    abundance: &AbundanceMatrix,
    sheet: &SampleSheet,
    pair: &GroupPair,
) -> Vec<BoxplotRecord> {
    let samples: Vec<(&str, &str, usize)> = [pair.group_1.as_str(), pair.group_2.as_str()]
        .into_iter()
        .flat_map(|group| {
            sheet
                .samples_in(group)
                .into_iter()
                .filter_map(move |s| abundance.column_index(s).map(|c| (s, group, c)))
        })
        .collect();

    let values = abundance.values();
    abundance
        .row_labels()
        .iter()
        .enumerate()
        .flat_map(|(r, taxon)| {
            samples.iter().map(move |&(sample, group, c)| BoxplotRecord {
                taxon: taxon.clone(),
                sample: sample.to_string(),
                group: group.to_string(),
                value: values[[r, c]],
            })
        })
        .collect()
}

pub fn write_boxplot_records(records: &[BoxplotRecord], path: &Path) -> Result<(), MatrixError> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abundance_matrix::OTHERS_LABEL;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use ndarray::arr2;
    use tempfile::tempdir;

    const X1: &str = "X1 Bacteria;Bacillota;Bacillus subtilis";
    const X2: &str = "X2 Bacteria;Bacillota;Bacillus subtilis";

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn create_test_tables() -> AbundanceTables {
        let samples = labels(&["A", "B"]);
        AbundanceTables {
            counts: AbundanceMatrix::new(
                labels(&[X1, X2, OTHERS_LABEL]),
                samples.clone(),
                arr2(&[[80.0, 40.0], [10.0, 0.0], [10.0, 10.0]]),
            )
            .unwrap(),
            identity_mean: AbundanceMatrix::new(
                labels(&[X1, X2]),
                samples.clone(),
                arr2(&[[98.0, 99.0], [95.0, f64::NAN]]),
            )
            .unwrap(),
            identity_std: AbundanceMatrix::new(
                labels(&[X1, X2]),
                samples,
                arr2(&[[0.5, f64::NAN], [f64::NAN, f64::NAN]]),
            )
            .unwrap(),
            unmapped: IndexMap::new(),
            integrity_warnings: Vec::new(),
        }
    }

    fn create_test_sheet() -> SampleSheet {
        let mut sheet = SampleSheet::new();
        sheet.add_sample("A", "ctrl");
        sheet.add_sample("B", "treated");
        sheet
    }

    #[test]
    fn test_prepare_heatmap_data() {
        let data = HeatmapData::prepare(&create_test_tables(), &create_test_sheet(), false).unwrap();

        assert_eq!(
            data.log_pseudocount.column_labels(),
            &labels(&["A (ctrl)", "B (treated)"])[..]
        );
        assert_relative_eq!(data.log_pseudocount.cell(X1, "A (ctrl)").unwrap(), 81f64.ln());
        assert_eq!(data.log_pseudocount.cell(X2, "B (treated)"), Some(0.0));
        assert_eq!(data.identity_mean.cell(X2, "B (treated)"), Some(0.0));
        assert_eq!(data.identity_std.cell(X1, "A (ctrl)"), Some(0.5));
        assert_eq!(data.identity_std.cell(X2, "A (ctrl)"), Some(0.0));
    }

    #[test]
    fn test_publication_labels_are_short_and_unique() {
        let data = HeatmapData::prepare(&create_test_tables(), &create_test_sheet(), true).unwrap();
        assert_eq!(
            data.log_pseudocount.row_labels(),
            &labels(&["X1 Bacillus subtilis", "X2 Bacillus subtilis", OTHERS_LABEL])[..]
        );
    }

    #[test]
    fn test_write_heatmap_data() {
        let dir = tempdir().unwrap();
        let data = HeatmapData::prepare(&create_test_tables(), &create_test_sheet(), false).unwrap();
        let written = data.write(dir.path()).unwrap();

        assert_eq!(written.len(), 3);
        let content = fs::read_to_string(dir.path().join(HEATMAP_DIR).join("percent-identity-mean.tsv")).unwrap();
        assert!(content.starts_with("\tA (ctrl)\tB (treated)\n"));
    }

    #[test]
    fn test_boxplot_records() {
        let tables = create_test_tables();
        let pair = GroupPair {
            group_1: "treated".into(),
            group_2: "ctrl".into(),
        };
        let records = boxplot_records(&tables.counts, &create_test_sheet(), &pair);

        assert_eq!(records.len(), 6);
        assert_eq!(records[0].sample, "B");
        assert_eq!(records[0].group, "treated");
        assert_eq!(records[0].value, 40.0);
        assert_eq!(records[1].sample, "A");

        let dir = tempdir().unwrap();
        let path = dir.path().join(BOXPLOT_FILE);
        write_boxplot_records(&records, &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Taxon,Sample,Group,Relative abundance (%)\n"));
    }
}
