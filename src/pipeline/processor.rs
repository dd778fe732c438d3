use crate::config::AnalysisConfig;
use crate::io::alignment::{read_alignment_table, AlignmentTableError};
use crate::io::fasta::{count_records, FastaError};
use crate::pipeline::aggregate::SampleResult;
use crate::pipeline::best_hit::BestHitResolver;
use crate::utils::parallel::{ParallelConfig, ParallelError, ParallelExecutor};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Extensions tried, in order, for a sample's alignment table.
const ALIGNMENT_EXTENSIONS: [&str; 1] = ["tsv"];
/// Extensions tried, in order, for a sample's merged reads.
const READS_EXTENSIONS: [&str; 3] = ["fasta", "fa", "fasta.gz"];

// --- Error Type ---
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("No alignment table for sample '{sample_id}' in {dir:?}")]
    MissingAlignmentTable { sample_id: String, dir: PathBuf },

    #[error("No reads FASTA for sample '{sample_id}' in {dir:?}")]
    MissingReads { sample_id: String, dir: PathBuf },

    #[error("Sample '{sample_id}': {source}")]
    Alignment {
        sample_id: String,
        #[source]
        source: AlignmentTableError,
    },

    #[error("Sample '{sample_id}': {source}")]
    Reads {
        sample_id: String,
        #[source]
        source: FastaError,
    },

    #[error(transparent)]
    Parallel(#[from] ParallelError),
}

/// Input files of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInputs {
    pub sample_id: String,
    pub alignment_table: PathBuf,
    pub reads_fasta: PathBuf,
}

impl SampleInputs {
    /// Locates `<alignment_dir>/<sample>.tsv` and `<fasta_dir>/<sample>.fasta`
    /// (or `.fa`, `.fasta.gz`) for each sample. Fails on the first sample
    /// with a missing file, before any file is read.
    pub fn discover<'a>(
        sample_ids: impl IntoIterator<Item = &'a str>,
        alignment_dir: &Path,
        fasta_dir: &Path,
    ) -> Result<Vec<Self>, ProcessingError> {
        sample_ids
            .into_iter()
            .map(|sample_id| {
                let alignment_table = find_input(alignment_dir, sample_id, &ALIGNMENT_EXTENSIONS)
                    .ok_or_else(|| ProcessingError::MissingAlignmentTable {
                        sample_id: sample_id.to_string(),
                        dir: alignment_dir.to_path_buf(),
                    })?;
                let reads_fasta = find_input(fasta_dir, sample_id, &READS_EXTENSIONS)
                    .ok_or_else(|| ProcessingError::MissingReads {
                        sample_id: sample_id.to_string(),
                        dir: fasta_dir.to_path_buf(),
                    })?;
                Ok(SampleInputs {
                    sample_id: sample_id.to_string(),
                    alignment_table,
                    reads_fasta,
                })
            })
            .collect()
    }
}

fn find_input(dir: &Path, sample_id: &str, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(format!("{}.{}", sample_id, ext)))
        .find(|p| p.is_file())
}

/// Reads and resolves samples independently on a thread pool.
pub struct SampleProcessor {
    resolver: BestHitResolver,
    executor: ParallelExecutor,
}

impl SampleProcessor {
    pub fn new(config: &AnalysisConfig, threads: usize) -> Result<Self, ProcessingError> {
        info!("Initializing SampleProcessor with {} threads...", threads);
        let executor = ParallelExecutor::new(Some(ParallelConfig { threads }))?;
        Ok(SampleProcessor {
            resolver: BestHitResolver::new(config.min_identity, config.tie_break),
            executor,
        })
    }

    /// Processes all samples; results keep the order of `inputs`.
    ///
    /// Every sample must succeed: the first failure is returned and no
    /// partial results are produced.
    pub fn process_samples(&self, inputs: &[SampleInputs]) -> Result<Vec<SampleResult>, ProcessingError> {
        let start_time = Instant::now();
        info!("Processing {} samples...", inputs.len());

        let results = self
            .executor
            .execute(inputs, |input| self.process_sample(input))?;

        info!(
            "Processed {} samples in {:.2} seconds",
            results.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(results)
    }

    /// Best hits and total read count of one sample.
    pub fn process_sample(&self, input: &SampleInputs) -> Result<SampleResult, ProcessingError> {
        let sample_id = input.sample_id.as_str();
        debug!(
            "{}: reading {} and {}",
            sample_id,
            input.alignment_table.display(),
            input.reads_fasta.display()
        );

        let hits = read_alignment_table(&input.alignment_table).map_err(|source| {
            ProcessingError::Alignment {
                sample_id: sample_id.to_string(),
                source,
            }
        })?;
        let assignment = self.resolver.resolve(sample_id, hits);

        let total_reads = count_records(&input.reads_fasta).map_err(|source| ProcessingError::Reads {
            sample_id: sample_id.to_string(),
            source,
        })?;

        Ok(SampleResult {
            assignment,
            total_reads,
        })
    }
}
