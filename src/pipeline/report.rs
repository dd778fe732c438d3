//! Run summary: per-sample read accounting written as JSON and rendered as
//! a plain-text report.

use crate::abundance_matrix::OTHERS_LABEL;
use crate::pipeline::aggregate::{AbundanceTables, SampleResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

/// File name of the summary written into the output directory.
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub sample_id: String,
    pub total_reads: u64,
    pub raw_hits: usize,
    pub passing_hits: usize,
    pub assigned_reads: usize,
    pub tie_broken_reads: usize,
    pub unmapped_reads: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub samples: Vec<SampleSummary>,
    /// Number of taxa rows, excluding the unmapped row.
    pub taxa: usize,
    pub integrity_warnings: Vec<String>,
}

impl RunSummary {
    pub fn new(results: &[SampleResult], tables: &AbundanceTables) -> Self {
        let samples = results
            .iter()
            .map(|r| {
                let stats = r.assignment.stats();
                SampleSummary {
                    sample_id: r.sample_id().to_string(),
                    total_reads: r.total_reads,
                    raw_hits: stats.raw_hits,
                    passing_hits: stats.passing_hits,
                    assigned_reads: stats.assigned_reads,
                    tie_broken_reads: stats.tied_reads,
                    unmapped_reads: tables.unmapped.get(r.sample_id()).copied().unwrap_or_default(),
                }
            })
            .collect();

        RunSummary {
            samples,
            taxa: tables
                .counts
                .row_labels()
                .iter()
                .filter(|l| l.as_str() != OTHERS_LABEL)
                .count(),
            integrity_warnings: tables.integrity_warnings.clone(),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(io::Error::other)
    }
}

/// Generate a formatted text report from the run summary.
pub fn generate_report(summary: &RunSummary) -> String {
    let mut report = String::new();

    report.push_str(&format!(
        "Aggregation Report: {} samples, {} taxa\n",
        summary.samples.len(),
        summary.taxa
    ));
    report.push_str("=================================================\n\n");

    for sample in &summary.samples {
        report.push_str(&format!("Sample {}:\n", sample.sample_id));
        report.push_str(&format!("  Total reads: {}\n", sample.total_reads));
        report.push_str(&format!(
            "  Hits passing identity threshold: {} / {}\n",
            sample.passing_hits, sample.raw_hits
        ));
        report.push_str(&format!(
            "  Assigned reads: {} ({:.1}%)\n",
            sample.assigned_reads,
            100.0 * sample.assigned_reads as f64 / sample.total_reads.max(1) as f64
        ));
        if sample.tie_broken_reads > 0 {
            report.push_str(&format!(
                "  Assigned by tie-break: {}\n",
                sample.tie_broken_reads
            ));
        }
        report.push_str(&format!("  Unmapped reads: {}\n\n", sample.unmapped_reads));
    }

    if summary.integrity_warnings.is_empty() {
        report.push_str("Data integrity: no issues found.\n");
    } else {
        report.push_str("Data integrity warnings:\n");
        for warning in &summary.integrity_warnings {
            report.push_str(&format!("  - {}\n", warning));
        }
    }

    report
}
