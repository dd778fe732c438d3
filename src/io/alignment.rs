//! Reader for per-sample alignment search results.
//!
//! The table is the BLAST tabular layout (`-m 8` / outfmt 6): no header,
//! twelve positional columns per candidate alignment. Lines starting with
//! `#` are treated as comments.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Number of positional columns in an alignment table row.
pub const ALIGNMENT_COLUMNS: usize = 12;

#[derive(Error, Debug)]
pub enum AlignmentTableError {
    #[error("Malformed alignment table {path:?}: line {line} has {found} columns, expected 12")]
    Malformed {
        path: PathBuf,
        line: u64,
        found: usize,
    },

    #[error("Malformed alignment table {path:?}: line {line} has invalid {field} '{value}'")]
    InvalidField {
        path: PathBuf,
        line: u64,
        field: &'static str,
        value: String,
    },

    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One candidate alignment of a read against a reference sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentHit {
    pub query_id: String,
    pub subject_id: String,
    pub percent_identity: f64,
    pub alignment_length: u64,
    pub mismatches: u64,
    pub gap_openings: u64,
    pub query_start: u64,
    pub query_end: u64,
    pub subject_start: u64,
    pub subject_end: u64,
    pub e_value: f64,
    pub bit_score: f64,
}

impl AlignmentHit {
    /// Convenience constructor for the fields aggregation uses.
    pub fn new(query_id: &str, subject_id: &str, percent_identity: f64) -> Self {
        AlignmentHit {
            query_id: query_id.to_string(),
            subject_id: subject_id.to_string(),
            percent_identity,
            alignment_length: 0,
            mismatches: 0,
            gap_openings: 0,
            query_start: 0,
            query_end: 0,
            subject_start: 0,
            subject_end: 0,
            e_value: 0.0,
            bit_score: 0.0,
        }
    }
}

/// Reads every row of an alignment table, in file order.
pub fn read_alignment_table(path: impl AsRef<Path>) -> Result<Vec<AlignmentHit>, AlignmentTableError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| AlignmentTableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_alignment_table(file, path)
}

/// Parses alignment rows from any reader; `source` names it in errors.
pub fn parse_alignment_table<R: Read>(
    reader: R,
    source: &Path,
) -> Result<Vec<AlignmentHit>, AlignmentTableError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut hits = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        // Space-delimited tables arrive as a single tab-free field.
        let fields: Vec<&str> = if record.len() == 1 {
            record[0].split_whitespace().collect()
        } else {
            record.iter().map(str::trim).collect()
        };
        if fields.is_empty() || (fields.len() == 1 && fields[0].is_empty()) {
            continue;
        }
        if fields.len() != ALIGNMENT_COLUMNS {
            return Err(AlignmentTableError::Malformed {
                path: source.to_path_buf(),
                line,
                found: fields.len(),
            });
        }

        let parser = FieldParser { source, line };
        hits.push(AlignmentHit {
            query_id: fields[0].to_string(),
            subject_id: fields[1].to_string(),
            percent_identity: parser.parse("percent identity", fields[2])?,
            alignment_length: parser.parse("alignment length", fields[3])?,
            mismatches: parser.parse("mismatches", fields[4])?,
            gap_openings: parser.parse("gap openings", fields[5])?,
            query_start: parser.parse("query start", fields[6])?,
            query_end: parser.parse("query end", fields[7])?,
            subject_start: parser.parse("subject start", fields[8])?,
            subject_end: parser.parse("subject end", fields[9])?,
            e_value: parser.parse("e-value", fields[10])?,
            bit_score: parser.parse("bit score", fields[11])?,
        });
    }
    Ok(hits)
}

struct FieldParser<'a> {
    source: &'a Path,
    line: u64,
}

impl FieldParser<'_> {
    fn parse<T: FromStr>(&self, field: &'static str, value: &str) -> Result<T, AlignmentTableError> {
        value.parse::<T>().map_err(|_| AlignmentTableError::InvalidField {
            path: self.source.to_path_buf(),
            line: self.line,
            field,
            value: value.to_string(),
        })
    }
}
