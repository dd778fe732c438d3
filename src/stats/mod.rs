//! Statistical analysis module.
//!
//! Group comparison of relative abundance: for every pair of sample groups
//! each taxon is tested with a two-sided Mann-Whitney U test, and the
//! p-values of that pair are corrected with Benjamini-Hochberg.

pub mod mann_whitney;

pub use mann_whitney::PValueMethod;

use mann_whitney::mann_whitney_u;

use crate::abundance_matrix::AbundanceMatrix;
use crate::bio::taxonomy::shorten_silva_label;
use crate::config::AnalysisConfig;
use crate::metadata::SampleSheet;
use crate::normalization::{normalize, NormalizationOptions};
use itertools::Itertools;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use thiserror::Error;

/// Percentages: each sample's taxa sum to this after normalization.
pub const RELATIVE_ABUNDANCE_UNIT: f64 = 100.0;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Group '{group}' has {found} sample(s); at least 2 are needed for a rank-sum test")]
    InsufficientSamples { group: String, found: usize },

    #[error("Sample '{0}' from the sample sheet is missing from the abundance matrix")]
    MissingSample(String),

    #[error("Distribution error: {0}")]
    Distribution(String),
}

/// Test outcome of one taxon within one group pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub taxon: String,
    pub mean_1: f64,              // Mean relative abundance of group 1 (%)
    pub mean_2: f64,              // Mean relative abundance of group 2 (%)
    pub statistic: Option<f64>,   // U of group 1
    pub z: Option<f64>,           // Standardized U
    pub p_value: Option<f64>,     // Raw two-sided p-value
    pub p_adjusted: Option<f64>,  // Benjamini-Hochberg adjusted p-value
    pub significant: bool,
}

/// An unordered pair of groups, in sheet order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPair {
    pub group_1: String,
    pub group_2: String,
}

impl GroupPair {
    /// Directory name of the pair's outputs, `<group1>-<group2>`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.group_1, self.group_2)
    }
}

/// Result of one group pair. Pairs fail independently.
#[derive(Debug)]
pub struct PairComparison {
    pub pair: GroupPair,
    pub outcome: Result<Vec<ComparisonRow>, StatsError>,
}

/// Converts a count matrix to per-sample percentages with unique,
/// shortened taxon labels, ready for [`GroupComparisonEngine`].
pub fn prepare_relative_abundance(counts: &AbundanceMatrix) -> AbundanceMatrix {
    let mut relative = normalize(
        counts,
        &NormalizationOptions::relative_abundance(RELATIVE_ABUNDANCE_UNIT),
    );
    if relative.row_labels().iter().any(|l| l.contains(';')) {
        relative.rename_rows(shorten_silva_label);
    }
    relative.disambiguate_rows();
    relative
}

pub struct GroupComparisonEngine {
    fdr_alpha: f64,
    method: PValueMethod,
}

impl GroupComparisonEngine {
    pub fn new(fdr_alpha: f64, method: PValueMethod) -> Self {
        GroupComparisonEngine { fdr_alpha, method }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.fdr_alpha, config.test_method)
    }

    /// Compares every unordered pair of groups of `sheet`.
    ///
    /// Fails only if a sheet sample is absent from `abundance`; a pair with
    /// too few samples is reported in its [`PairComparison::outcome`] and
    /// does not affect the other pairs.
    pub fn compare_all(
        &self,
        abundance: &AbundanceMatrix,
        sheet: &SampleSheet,
    ) -> Result<Vec<PairComparison>, StatsError> {
        validate_samples(abundance, sheet)?;

        let pairs: Vec<PairComparison> = sheet
            .groups()
            .into_iter()
            .tuple_combinations()
            .map(|(g1, g2)| {
                let pair = GroupPair {
                    group_1: g1.to_string(),
                    group_2: g2.to_string(),
                };
                let outcome = self.compare_pair(abundance, sheet, &pair);
                if let Err(e) = &outcome {
                    error!("Skipping comparison {}: {}", pair.label(), e);
                }
                PairComparison { pair, outcome }
            })
            .collect();

        if pairs.is_empty() {
            warn!("Fewer than two groups in the sample sheet; nothing to compare.");
        }
        Ok(pairs)
    }

    /// Tests every taxon of `abundance` between the two groups of `pair`.
    /// Rows are returned sorted by raw p-value.
    pub fn compare_pair(
        &self,
        abundance: &AbundanceMatrix,
        sheet: &SampleSheet,
        pair: &GroupPair,
    ) -> Result<Vec<ComparisonRow>, StatsError> {
        let columns_1 = group_columns(abundance, sheet, &pair.group_1)?;
        let columns_2 = group_columns(abundance, sheet, &pair.group_2)?;

        let values = abundance.values();
        let mut rows = Vec::with_capacity(abundance.row_labels().len());
        for (r, taxon) in abundance.row_labels().iter().enumerate() {
            let observed = |columns: &[usize]| -> Vec<f64> {
                columns
                    .iter()
                    .map(|&c| values[[r, c]])
                    .filter(|v| !v.is_nan())
                    .collect()
            };
            let x = observed(columns_1.as_slice());
            let y = observed(columns_2.as_slice());

            let test = if x.is_empty() || y.is_empty() {
                warn!(
                    "{}: no observations for '{}' in one group; not tested",
                    pair.label(),
                    taxon
                );
                None
            } else {
                let result = mann_whitney_u(&x, &y, self.method)
                    .map_err(|e| StatsError::Distribution(e.to_string()))?;
                Some(result)
            };

            rows.push(ComparisonRow {
                taxon: taxon.clone(),
                mean_1: mean_or_nan(&x),
                mean_2: mean_or_nan(&y),
                statistic: test.map(|t| t.u),
                z: test.map(|t| t.z),
                p_value: test.map(|t| t.p_value),
                p_adjusted: None,
                significant: false,
            });
        }

        rows.sort_by(|a, b| compare_p_values(a.p_value, b.p_value));
        adjust_pvalues_bh(&mut rows);
        for row in rows.iter_mut() {
            row.significant = row.p_adjusted.is_some_and(|p| p <= self.fdr_alpha);
        }

        info!(
            "{}: {} taxa tested, {} significant at FDR {}",
            pair.label(),
            rows.iter().filter(|r| r.p_value.is_some()).count(),
            rows.iter().filter(|r| r.significant).count(),
            self.fdr_alpha
        );
        Ok(rows)
    }
}

fn group_columns(
    abundance: &AbundanceMatrix,
    sheet: &SampleSheet,
    group: &str,
) -> Result<Vec<usize>, StatsError> {
    let columns = sheet
        .samples_in(group)
        .into_iter()
        .map(|s| {
            abundance
                .column_index(s)
                .ok_or_else(|| StatsError::MissingSample(s.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if columns.len() < 2 {
        return Err(StatsError::InsufficientSamples {
            group: group.to_string(),
            found: columns.len(),
        });
    }
    Ok(columns)
}

/// Validates that the sample sheet matches the matrix columns.
fn validate_samples(abundance: &AbundanceMatrix, sheet: &SampleSheet) -> Result<(), StatsError> {
    if let Some(missing) = sheet.samples().find(|s| abundance.column_index(s).is_none()) {
        return Err(StatsError::MissingSample(missing.to_string()));
    }
    let unlisted: Vec<&String> = abundance
        .column_labels()
        .iter()
        .filter(|c| sheet.group_of(c).is_none())
        .collect();
    if !unlisted.is_empty() {
        warn!("Samples without a group are not compared: {:?}", unlisted);
    }
    Ok(())
}

fn mean_or_nan(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.mean()
    }
}

/// Orders p-values ascending with NA last.
fn compare_p_values(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(pa), Some(pb)) => pa.partial_cmp(&pb).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Adjusts p-values for multiple testing using the Benjamini-Hochberg method.
///
/// Rows without a p-value are not counted as tests and keep `None`.
pub fn adjust_pvalues_bh(rows: &mut [ComparisonRow]) {
    let mut indexed: Vec<(usize, Option<f64>)> =
        rows.iter().enumerate().map(|(i, r)| (i, r.p_value)).collect();
    indexed.sort_by(|a, b| compare_p_values(a.1, b.1));

    let m = indexed.iter().filter(|(_, p)| p.is_some()).count();
    let mut last_padj: f64 = 1.0;

    // Walk down from the largest p-value so the adjustment stays monotone.
    for (rank, (original_index, p_value)) in indexed.iter().enumerate().rev() {
        match p_value {
            Some(p) => {
                let padj = (p * m as f64 / (rank + 1) as f64).min(last_padj).min(1.0);
                rows[*original_index].p_adjusted = Some(padj);
                last_padj = padj;
            }
            None => rows[*original_index].p_adjusted = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn row(taxon: &str, p: Option<f64>) -> ComparisonRow {
        ComparisonRow {
            taxon: taxon.to_string(),
            mean_1: 0.0,
            mean_2: 0.0,
            statistic: None,
            z: None,
            p_value: p,
            p_adjusted: None,
            significant: false,
        }
    }

    fn sheet(entries: &[(&str, &str)]) -> SampleSheet {
        let mut sheet = SampleSheet::new();
        for (sample, group) in entries {
            sheet.add_sample(sample, group);
        }
        sheet
    }

    /// Six samples, three per group; `Up` is higher in group b, `Flat` is constant.
    fn create_test_abundance() -> (AbundanceMatrix, SampleSheet) {
        let matrix = AbundanceMatrix::new(
            vec!["Up".into(), "Flat".into(), "Noise".into()],
            ["a1", "a2", "a3", "b1", "b2", "b3"].iter().map(|s| s.to_string()).collect(),
            arr2(&[
                [1.0, 2.0, 3.0, 10.0, 11.0, 12.0],
                [5.0, 5.0, 5.0, 5.0, 5.0, 5.0],
                [4.0, 9.0, 6.0, 5.0, 8.0, 7.0],
            ]),
        )
        .unwrap();
        let sheet = sheet(&[
            ("a1", "a"),
            ("a2", "a"),
            ("a3", "a"),
            ("b1", "b"),
            ("b2", "b"),
            ("b3", "b"),
        ]);
        (matrix, sheet)
    }

    #[test]
    fn test_adjust_pvalues_bh() {
        let mut rows = vec![
            row("t1", Some(0.01)),
            row("t2", Some(0.04)),
            row("t3", None),
            row("t4", Some(0.03)),
            row("t5", Some(0.5)),
        ];
        adjust_pvalues_bh(&mut rows);

        // m = 4 tests: 0.01*4/1, 0.03*4/2, 0.04*4/3, 0.5*4/4
        assert_relative_eq!(rows[0].p_adjusted.unwrap(), 0.04, epsilon = 1e-12);
        assert_relative_eq!(rows[3].p_adjusted.unwrap(), 0.04 * 4.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(rows[1].p_adjusted.unwrap(), 0.04 * 4.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(rows[4].p_adjusted.unwrap(), 0.5, epsilon = 1e-12);
        assert!(rows[2].p_adjusted.is_none());
        for r in rows.iter().filter(|r| r.p_value.is_some()) {
            assert!(r.p_adjusted.unwrap() >= r.p_value.unwrap());
        }
    }

    #[test]
    fn test_separated_groups_are_significant() {
        let (matrix, sheet) = create_test_abundance();
        let engine = GroupComparisonEngine::new(0.1, PValueMethod::Asymptotic);
        let results = engine.compare_all(&matrix, &sheet).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pair.label(), "a-b");
        let rows = results[0].outcome.as_ref().unwrap();

        // Sorted by raw p-value, strongest first.
        assert_eq!(rows[0].taxon, "Up");
        let up = &rows[0];
        assert!(up.p_value.unwrap() < 0.05);
        assert_eq!(up.statistic, Some(0.0));
        assert_relative_eq!(up.mean_1, 2.0);
        assert_relative_eq!(up.mean_2, 11.0);
        assert!(up.p_adjusted.unwrap() >= up.p_value.unwrap());

        for pair in rows.windows(2) {
            assert!(pair[0].p_value.unwrap() <= pair[1].p_value.unwrap());
        }
    }

    #[test]
    fn test_constant_taxon_is_tested() {
        let (matrix, sheet) = create_test_abundance();
        let engine = GroupComparisonEngine::new(0.1, PValueMethod::Asymptotic);
        let rows = engine
            .compare_pair(
                &matrix,
                &sheet,
                &GroupPair {
                    group_1: "a".into(),
                    group_2: "b".into(),
                },
            )
            .unwrap();

        let flat = rows.iter().find(|r| r.taxon == "Flat").unwrap();
        assert_eq!(flat.z, Some(0.0));
        assert_eq!(flat.p_value, Some(1.0));
        assert!(!flat.significant);
    }

    #[test]
    fn test_insufficient_samples_only_fails_that_pair() {
        let matrix = AbundanceMatrix::new(
            vec!["T".into()],
            ["a1", "a2", "b1", "b2", "c1"].iter().map(|s| s.to_string()).collect(),
            arr2(&[[1.0, 2.0, 3.0, 4.0, 5.0]]),
        )
        .unwrap();
        let sheet = sheet(&[("a1", "a"), ("a2", "a"), ("b1", "b"), ("b2", "b"), ("c1", "c")]);
        let engine = GroupComparisonEngine::new(0.1, PValueMethod::Asymptotic);
        let results = engine.compare_all(&matrix, &sheet).unwrap();

        let labels: Vec<String> = results.iter().map(|r| r.pair.label()).collect();
        assert_eq!(labels, vec!["a-b", "a-c", "b-c"]);
        assert!(results[0].outcome.is_ok());
        for failed in &results[1..] {
            assert!(matches!(
                failed.outcome,
                Err(StatsError::InsufficientSamples { ref group, found: 1 }) if group == "c"
            ));
        }
    }

    #[test]
    fn test_missing_sample_is_an_error() {
        let (matrix, mut sheet) = create_test_abundance();
        sheet.add_sample("z9", "b");
        let engine = GroupComparisonEngine::new(0.1, PValueMethod::Asymptotic);
        assert!(matches!(
            engine.compare_all(&matrix, &sheet),
            Err(StatsError::MissingSample(ref s)) if s == "z9"
        ));
    }

    #[test]
    fn test_prepare_relative_abundance() {
        let counts = AbundanceMatrix::new(
            vec![
                "X1 Bacteria;Bacillota;Lactobacillus".into(),
                "X2 Bacteria;Bacillota;Lactobacillus".into(),
                "Others".into(),
            ],
            vec!["A".into()],
            arr2(&[[30.0], [50.0], [20.0]]),
        )
        .unwrap();
        let relative = prepare_relative_abundance(&counts);

        assert_eq!(
            relative.row_labels(),
            &["X1 Lactobacillus", "X2 Lactobacillus", "Others"].map(String::from)[..]
        );
        assert_relative_eq!(relative.cell("X2 Lactobacillus", "A").unwrap(), 50.0);
        assert_relative_eq!(relative.column_sums()[0], 100.0, epsilon = 1e-9);
    }
}
