//! FASTA input: reference database headers and per-sample read totals.
//!
//! Leverages the `needletail` crate, which handles multi-line records and
//! gzip-compressed files transparently.

use crate::bio::taxonomy::ReferenceTaxa;
use log::{debug, info};
use needletail::errors::ParseErrorKind;
use needletail::parse_fastx_file;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FastaError {
    #[error("Failed to parse FASTA {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Reference FASTA {0:?} contains no records")]
    EmptyReference(PathBuf),
}

/// Reads every header of the reference database into subject id -> label.
pub fn read_reference_taxa(path: impl AsRef<Path>) -> Result<ReferenceTaxa, FastaError> {
    let path = path.as_ref();
    let mut taxa = ReferenceTaxa::new();
    let mut reader = parse_fastx_file(path).map_err(|e| parse_error(path, e))?;

    while let Some(record) = reader.next() {
        let record = record.map_err(|e| parse_error(path, e))?;
        taxa.insert_header(&String::from_utf8_lossy(record.id()));
    }

    if taxa.is_empty() {
        return Err(FastaError::EmptyReference(path.to_path_buf()));
    }
    info!("Loaded {} reference taxa from {}", taxa.len(), path.display());
    Ok(taxa)
}

/// Counts the records of a reads file. An empty file holds zero reads.
pub fn count_records(path: impl AsRef<Path>) -> Result<u64, FastaError> {
    let path = path.as_ref();
    let mut reader = match parse_fastx_file(path) {
        Ok(reader) => reader,
        Err(e) if e.kind == ParseErrorKind::EmptyFile => return Ok(0),
        Err(e) => return Err(parse_error(path, e)),
    };

    let mut count = 0u64;
    while let Some(record) = reader.next() {
        record.map_err(|e| parse_error(path, e))?;
        count += 1;
    }
    debug!("{}: {} reads", path.display(), count);
    Ok(count)
}

fn parse_error(path: &Path, e: needletail::errors::ParseError) -> FastaError {
    FastaError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn create_dummy_fasta(path: &Path, content: &str) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_read_reference_taxa_multiline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("16S.fa");
        create_dummy_fasta(
            &path,
            ">X1 Bacteria;Bacillota;Streptococcus salivarius\nACGT\nACGT\n>X2 Escherichia coli\nTTTT\n",
        );

        let taxa = read_reference_taxa(&path).unwrap();
        assert_eq!(taxa.len(), 2);
        assert_eq!(
            taxa.get("X1").unwrap().header(),
            "X1 Bacteria;Bacillota;Streptococcus salivarius"
        );
        assert_eq!(taxa.get("X2").unwrap().header(), "X2 Escherichia coli");
    }

    #[test]
    fn test_count_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("S1.fasta");
        create_dummy_fasta(&path, ">r1\nACGT\n>r2\nAC\nGT\n>r3\nA\n");
        assert_eq!(count_records(&path).unwrap(), 3);

        let empty = dir.path().join("S2.fasta");
        create_dummy_fasta(&empty, "");
        assert_eq!(count_records(&empty).unwrap(), 0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(count_records(dir.path().join("missing.fasta")).is_err());
        assert!(read_reference_taxa(dir.path().join("missing.fa")).is_err());
    }
}
