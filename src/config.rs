//! Run configuration.
//!
//! `Settings` carries what every stage needs from the environment (output
//! directory, thread count); `AnalysisConfig` carries the scientific
//! parameters and is written next to the outputs so a run can be repeated.

use crate::stats::mann_whitney::PValueMethod;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the effective configuration written into the output directory.
pub const RUN_CONFIG_FILE: &str = "run-config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Minimum percent identity must be a finite, non-negative number, got {0}")]
    InvalidIdentity(f64),

    #[error("FDR level must be within (0, 1], got {0}")]
    InvalidFdr(f64),

    #[error("Thread count must be at least 1")]
    InvalidThreads,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output location and resources for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub outdir: PathBuf,
    pub threads: usize,
    pub debug: bool,
}

impl Settings {
    pub fn new(outdir: impl Into<PathBuf>, threads: usize, debug: bool) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::InvalidThreads);
        }
        Ok(Settings {
            outdir: outdir.into(),
            threads,
            debug,
        })
    }

    /// Creates the output directory (and parents) if needed.
    pub fn prepare_outdir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.outdir)?;
        Ok(())
    }

    pub fn output_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.outdir.join(name)
    }
}

/// Minimum alignment identity a hit needs to be considered.
///
/// Compared as `percent_identity >= threshold` on whatever scale the
/// alignment tables use; no conversion between fractions and percentages
/// is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinIdentity(f64);

impl MinIdentity {
    pub fn new(threshold: f64) -> Result<Self, ConfigError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::InvalidIdentity(threshold));
        }
        if threshold > 0.0 && threshold <= 1.0 {
            warn!(
                "Minimum identity {} looks like a fraction; alignment tables usually report percentages.",
                threshold
            );
        }
        Ok(MinIdentity(threshold))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn passes(self, percent_identity: f64) -> bool {
        percent_identity >= self.0
    }
}

impl Default for MinIdentity {
    fn default() -> Self {
        MinIdentity(97.0)
    }
}

/// How a read with several equally good hits is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TieBreak {
    /// Uniform choice among the tied hits, from a seeded generator.
    Random { seed: u64 },
    /// The tied hit with the smallest subject id.
    Lexicographic,
}

impl Default for TieBreak {
    fn default() -> Self {
        TieBreak::Random { seed: 0 }
    }
}

/// Scientific parameters of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_identity: MinIdentity,
    pub tie_break: TieBreak,
    /// Nominal false discovery rate for the per-pair BH correction.
    pub fdr_alpha: f64,
    pub test_method: PValueMethod,
    /// Shorten SILVA lineages in heatmap row labels.
    pub publication_labels: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            min_identity: MinIdentity::default(),
            tie_break: TieBreak::default(),
            fdr_alpha: 0.1,
            test_method: PValueMethod::default(),
            publication_labels: false,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fdr_alpha > 0.0 && self.fdr_alpha <= 1.0) {
            return Err(ConfigError::InvalidFdr(self.fdr_alpha));
        }
        MinIdentity::new(self.min_identity.value())?;
        Ok(())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path.as_ref())?;
        let config: AnalysisConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }
}
