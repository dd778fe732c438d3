//! Aggregation of per-sample best hits into abundance matrices.
//!
//! Produces three aligned taxa x samples matrices: read counts, mean percent
//! identity and percent identity standard deviation. The count matrix gets
//! an extra `Others` row holding the reads of each sample that were not
//! assigned to any reference.

use crate::abundance_matrix::{AbundanceMatrix, MatrixError, OTHERS_LABEL};
use crate::bio::taxonomy::ReferenceTaxa;
use crate::pipeline::best_hit::SampleAssignment;
use indexmap::IndexMap;
use log::{info, warn};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Subject id '{subject_id}' found in sample '{sample_id}' has no header in the reference FASTA (reference and search database do not match)")]
    UnknownSubject {
        subject_id: String,
        sample_id: String,
    },

    #[error("Sample '{0}' was supplied more than once")]
    DuplicateSample(String),

    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Resolved hits of one sample plus its total input read count.
#[derive(Debug, Clone)]
pub struct SampleResult {
    pub assignment: SampleAssignment,
    /// Number of reads in the sample's merged FASTA, independent of the search.
    pub total_reads: u64,
}

impl SampleResult {
    pub fn sample_id(&self) -> &str {
        self.assignment.sample_id()
    }
}

/// Output of aggregation.
#[derive(Debug, Clone)]
pub struct AbundanceTables {
    pub counts: AbundanceMatrix,
    pub identity_mean: AbundanceMatrix,
    pub identity_std: AbundanceMatrix,
    /// Total minus mapped reads per sample, as computed (may be negative).
    pub unmapped: IndexMap<String, i64>,
    pub integrity_warnings: Vec<String>,
}

pub struct AbundanceAggregator<'a> {
    reference: &'a ReferenceTaxa,
}

impl<'a> AbundanceAggregator<'a> {
    pub fn new(reference: &'a ReferenceTaxa) -> Self {
        AbundanceAggregator { reference }
    }

    /// Builds the abundance matrices. Sample columns keep the order of
    /// `samples`; taxa rows are sorted by subject id, then relabelled with
    /// their full reference header.
    pub fn aggregate(&self, samples: &[SampleResult]) -> Result<AbundanceTables, AggregateError> {
        let mut seen = HashSet::with_capacity(samples.len());
        for sample in samples {
            if !seen.insert(sample.sample_id()) {
                return Err(AggregateError::DuplicateSample(sample.sample_id().to_string()));
            }
        }

        let per_sample = samples
            .iter()
            .map(|s| self.identities_by_subject(&s.assignment))
            .collect::<Result<Vec<_>, _>>()?;

        let subjects: Vec<String> = per_sample
            .iter()
            .flat_map(|m| m.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let sample_ids: Vec<String> = samples.iter().map(|s| s.sample_id().to_string()).collect();

        let mut counts = AbundanceMatrix::filled(subjects.clone(), sample_ids.clone(), 0.0)?;
        let mut identity_mean = AbundanceMatrix::filled(subjects.clone(), sample_ids.clone(), f64::NAN)?;
        let mut identity_std = AbundanceMatrix::filled(subjects.clone(), sample_ids.clone(), f64::NAN)?;

        for (col, identities) in per_sample.iter().enumerate() {
            for (subject_id, values) in identities {
                let Ok(row) = subjects.binary_search(subject_id) else {
                    continue;
                };
                counts.set_by_index(row, col, values.len() as f64);
                identity_mean.set_by_index(row, col, values.iter().mean());
                let std = if values.len() < 2 {
                    f64::NAN
                } else {
                    values.iter().std_dev()
                };
                identity_std.set_by_index(row, col, std);
            }
        }

        let mapped = counts.column_sums();
        let mut unmapped = IndexMap::with_capacity(samples.len());
        let mut integrity_warnings = Vec::new();
        for (sample, mapped) in samples.iter().zip(&mapped) {
            let others = sample.total_reads as i64 - *mapped as i64;
            if others < 0 {
                let message = format!(
                    "Sample '{}' has {} mapped reads but only {} total reads; unmapped count is {}",
                    sample.sample_id(),
                    *mapped as i64,
                    sample.total_reads,
                    others
                );
                warn!("{}", message);
                integrity_warnings.push(message);
            }
            unmapped.insert(sample.sample_id().to_string(), others);
        }
        let others_row: Vec<f64> = unmapped.values().map(|&v| v as f64).collect();
        counts.push_row(OTHERS_LABEL, &others_row)?;

        let relabel = |subject_id: &str| match self.reference.get(subject_id) {
            Some(label) => label.header().to_string(),
            None => subject_id.to_string(),
        };
        counts.rename_rows(relabel);
        identity_mean.rename_rows(relabel);
        identity_std.rename_rows(relabel);

        info!(
            "Aggregated {} samples into {} taxa",
            samples.len(),
            subjects.len()
        );

        Ok(AbundanceTables {
            counts,
            identity_mean,
            identity_std,
            unmapped,
            integrity_warnings,
        })
    }

    fn identities_by_subject(
        &self,
        assignment: &SampleAssignment,
    ) -> Result<BTreeMap<String, Vec<f64>>, AggregateError> {
        if let Some(unknown) = assignment
            .subject_ids()
            .find(|id| !self.reference.contains(id))
        {
            return Err(AggregateError::UnknownSubject {
                subject_id: unknown.to_string(),
                sample_id: assignment.sample_id().to_string(),
            });
        }

        let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (_, hit) in assignment.iter() {
            by_subject
                .entry(hit.subject_id.clone())
                .or_default()
                .push(hit.percent_identity);
        }
        Ok(by_subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MinIdentity, TieBreak};
    use crate::io::alignment::AlignmentHit;
    use crate::pipeline::best_hit::BestHitResolver;
    use approx::assert_relative_eq;

    const X1: &str = "X1 Bacteria;Pseudomonadota;Escherichia coli";
    const X2: &str = "X2 Bacteria;Bacillota;Bacillus subtilis";

    fn reference() -> ReferenceTaxa {
        [X1, X2].into_iter().collect()
    }

    fn sample(id: &str, total_reads: u64, groups: &[(&str, usize, f64)]) -> SampleResult {
        let mut hits = Vec::new();
        let mut read = 0;
        for &(subject, n, identity) in groups {
            for _ in 0..n {
                hits.push(AlignmentHit::new(&format!("{}_r{}", id, read), subject, identity));
                read += 1;
            }
        }
        let resolver = BestHitResolver::new(MinIdentity::new(0.97).unwrap(), TieBreak::default());
        SampleResult {
            assignment: resolver.resolve(id, hits),
            total_reads,
        }
    }

    fn two_samples() -> Vec<SampleResult> {
        vec![
            sample("A", 100, &[("X1", 80, 98.0), ("X2", 10, 95.0)]),
            sample("B", 50, &[("X1", 40, 99.0)]),
        ]
    }

    #[test]
    fn test_two_sample_example() {
        let reference = reference();
        let tables = AbundanceAggregator::new(&reference)
            .aggregate(&two_samples())
            .unwrap();

        let counts = &tables.counts;
        assert_eq!(counts.column_labels(), &["A".to_string(), "B".to_string()][..]);
        assert_eq!(counts.row(X1).unwrap().to_vec(), vec![80.0, 40.0]);
        assert_eq!(counts.row(X2).unwrap().to_vec(), vec![10.0, 0.0]);
        assert_eq!(counts.row(OTHERS_LABEL).unwrap().to_vec(), vec![10.0, 10.0]);

        assert_eq!(tables.identity_mean.row(X1).unwrap().to_vec(), vec![98.0, 99.0]);
        assert_eq!(tables.identity_mean.cell(X2, "A"), Some(95.0));
        assert!(tables.identity_mean.cell(X2, "B").unwrap().is_nan());

        assert_relative_eq!(tables.identity_std.cell(X1, "A").unwrap(), 0.0);
        assert!(tables.identity_std.cell(X2, "B").unwrap().is_nan());
        assert!(tables.identity_mean.row(OTHERS_LABEL).is_none());
        assert!(tables.integrity_warnings.is_empty());
    }

    #[test]
    fn test_mapped_plus_others_equals_total() {
        let reference = reference();
        let samples = two_samples();
        let tables = AbundanceAggregator::new(&reference).aggregate(&samples).unwrap();

        let mapped = tables.counts.without_rows(&[OTHERS_LABEL]).column_sums();
        for (i, s) in samples.iter().enumerate() {
            let others = tables.counts.cell(OTHERS_LABEL, s.sample_id()).unwrap();
            assert_eq!(mapped[i] + others, s.total_reads as f64);
        }
    }

    #[test]
    fn test_identity_statistics() {
        let reference = reference();
        let s = sample("A", 10, &[("X1", 1, 98.0), ("X1", 1, 100.0), ("X2", 1, 99.0)]);
        let tables = AbundanceAggregator::new(&reference).aggregate(&[s]).unwrap();

        assert_relative_eq!(tables.identity_mean.cell(X1, "A").unwrap(), 99.0);
        // Sample standard deviation of [98, 100].
        assert_relative_eq!(
            tables.identity_std.cell(X1, "A").unwrap(),
            2f64.sqrt(),
            epsilon = 1e-12
        );
        assert!(tables.identity_std.cell(X2, "A").unwrap().is_nan());
    }

    #[test]
    fn test_negative_unmapped_is_kept_and_reported() {
        let reference = reference();
        let s = sample("A", 5, &[("X1", 8, 99.0)]);
        let tables = AbundanceAggregator::new(&reference).aggregate(&[s]).unwrap();

        assert_eq!(tables.unmapped["A"], -3);
        assert_eq!(tables.counts.cell(OTHERS_LABEL, "A"), Some(-3.0));
        assert_eq!(tables.integrity_warnings.len(), 1);
    }

    #[test]
    fn test_unknown_subject_fails() {
        let reference = reference();
        let s = sample("A", 10, &[("X9", 2, 99.0)]);
        let err = AbundanceAggregator::new(&reference).aggregate(&[s]).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::UnknownSubject { ref subject_id, ref sample_id }
                if subject_id == "X9" && sample_id == "A"
        ));
    }

    fn resolve_at_97(id: &str, hits: Vec<AlignmentHit>) -> SampleResult {
        let resolver = BestHitResolver::new(MinIdentity::new(97.0).unwrap(), TieBreak::Lexicographic);
        SampleResult {
            assignment: resolver.resolve(id, hits),
            total_reads: 10,
        }
    }

    #[test]
    fn test_unknown_subject_on_dropped_hit_fails() {
        let reference = reference();

        let below_threshold = resolve_at_97(
            "A",
            vec![
                AlignmentHit::new("r1", "X1", 99.0),
                AlignmentHit::new("r2", "X9", 90.0),
            ],
        );
        let err = AbundanceAggregator::new(&reference)
            .aggregate(&[below_threshold])
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::UnknownSubject { ref subject_id, .. } if subject_id == "X9"
        ));

        // X1 wins the tie, X8 is still unknown to the reference.
        let tie_loser = resolve_at_97(
            "B",
            vec![
                AlignmentHit::new("r3", "X1", 99.0),
                AlignmentHit::new("r3", "X8", 99.0),
            ],
        );
        assert_eq!(tie_loser.assignment.get("r3").unwrap().subject_id, "X1");
        let err = AbundanceAggregator::new(&reference)
            .aggregate(&[tie_loser])
            .unwrap_err();
        assert!(matches!(
            err,
            AggregateError::UnknownSubject { ref subject_id, ref sample_id }
                if subject_id == "X8" && sample_id == "B"
        ));
    }

    #[test]
    fn test_duplicate_sample_fails() {
        let reference = reference();
        let samples = vec![sample("A", 10, &[]), sample("A", 10, &[])];
        assert!(matches!(
            AbundanceAggregator::new(&reference).aggregate(&samples),
            Err(AggregateError::DuplicateSample(_))
        ));
    }

    #[test]
    fn test_sample_without_hits_is_all_others() {
        let reference = reference();
        let samples = vec![
            sample("A", 20, &[("X2", 5, 99.0)]),
            sample("B", 7, &[]),
        ];
        let tables = AbundanceAggregator::new(&reference).aggregate(&samples).unwrap();
        assert_eq!(tables.counts.row(X2).unwrap().to_vec(), vec![5.0, 0.0]);
        assert_eq!(tables.counts.row(OTHERS_LABEL).unwrap().to_vec(), vec![15.0, 7.0]);
    }
}
