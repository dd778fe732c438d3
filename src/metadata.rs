//! Sample sheet handling.
//!
//! The sample sheet assigns every sample to an experimental group. Sample
//! and group order follow the file, which fixes the column order of the
//! outputs and the order in which group pairs are compared.

use anyhow::Result;
use indexmap::IndexMap;
use std::fs;
use std::path::Path;

const SAMPLE_COLUMNS: [&str; 2] = ["sample", "sampleid"];
const GROUP_COLUMNS: [&str; 2] = ["group", "condition"];
const DELIMITERS: [u8; 3] = [b'\t', b',', b';'];

/// Samples and their groups, in sheet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSheet {
    /// Maps sample IDs to their group
    groups_by_sample: IndexMap<String, String>,
}

impl SampleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample with its group. Returns `false` (and keeps the first
    /// entry) if the sample is already present.
    pub fn add_sample(&mut self, sample_id: &str, group: &str) -> bool {
        if self.groups_by_sample.contains_key(sample_id) {
            return false;
        }
        self.groups_by_sample
            .insert(sample_id.to_string(), group.to_string());
        true
    }

    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.groups_by_sample.keys().map(String::as_str)
    }

    pub fn group_of(&self, sample_id: &str) -> Option<&str> {
        self.groups_by_sample.get(sample_id).map(String::as_str)
    }

    /// Distinct groups in order of first appearance.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for group in self.groups_by_sample.values() {
            if !groups.contains(&group.as_str()) {
                groups.push(group);
            }
        }
        groups
    }

    /// Samples of `group`, in sheet order.
    pub fn samples_in(&self, group: &str) -> Vec<&str> {
        self.groups_by_sample
            .iter()
            .filter(|(_, g)| g.as_str() == group)
            .map(|(s, _)| s.as_str())
            .collect()
    }

    pub fn sample_count(&self) -> usize {
        self.groups_by_sample.len()
    }
}

/// Picks the delimiter occurring most often in the header line.
fn sniff_delimiter(header_line: &str) -> u8 {
    DELIMITERS
        .iter()
        .copied()
        .max_by_key(|&d| header_line.bytes().filter(|&b| b == d).count())
        .filter(|&d| header_line.bytes().any(|b| b == d))
        .unwrap_or(b',')
}

/// Loads a sample sheet from a delimited text file.
///
/// The delimiter (tab, comma or semicolon) is taken from the header line.
/// Sample ids come from a `Sample`/`SampleID` column, or the first column if
/// there is none; groups from a `Group`/`Condition` column.
pub fn load_sample_sheet(path: impl AsRef<Path>) -> Result<SampleSheet> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read sample sheet '{}': {}", path.display(), e))?;
    let delimiter = sniff_delimiter(content.lines().next().unwrap_or_default());

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = rdr.headers()?.clone();

    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };
    let sample_col = find(&SAMPLE_COLUMNS).unwrap_or(0);
    let group_col = find(&GROUP_COLUMNS).ok_or_else(|| {
        anyhow::anyhow!(
            "Sample sheet '{}' has no 'Group'/'Condition' column",
            path.display()
        )
    })?;
    if sample_col == group_col {
        return Err(anyhow::anyhow!(
            "Sample sheet '{}' has no sample column besides the group column",
            path.display()
        ));
    }

    let mut sheet = SampleSheet::new();
    for result in rdr.records() {
        let record = result?;
        let sample_id = record.get(sample_col).unwrap_or_default();
        let group = record.get(group_col).unwrap_or_default();

        if sample_id.is_empty() {
            log::warn!("Skipping sample sheet row with empty sample ID.");
            continue;
        }
        if group.is_empty() {
            log::warn!("Sample '{}' has no group and is skipped.", sample_id);
            continue;
        }
        if !sheet.add_sample(sample_id, group) {
            return Err(anyhow::anyhow!(
                "Sample '{}' is listed more than once in '{}'",
                sample_id,
                path.display()
            ));
        }
    }

    if sheet.sample_count() == 0 {
        return Err(anyhow::anyhow!(
            "No valid sample entries found in sample sheet '{}'",
            path.display()
        ));
    }
    log::info!(
        "Loaded {} samples in {} groups from {}",
        sheet.sample_count(),
        sheet.groups().len(),
        path.display()
    );

    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn create_test_sheet(path: &Path, content: &str) {
        let mut file = File::create(path).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn test_load_sample_sheet_basic() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("samples.csv");
        create_test_sheet(
            &file_path,
            "Sample,Group,Batch\nS3,Control,B1\nS1,Treated,B1\nS2,Control,B2",
        );

        let sheet = load_sample_sheet(&file_path).unwrap();
        assert_eq!(sheet.sample_count(), 3);
        assert_eq!(sheet.samples().collect::<Vec<_>>(), vec!["S3", "S1", "S2"]);
        assert_eq!(sheet.groups(), vec!["Control", "Treated"]);
        assert_eq!(sheet.samples_in("Control"), vec!["S3", "S2"]);
        assert_eq!(sheet.group_of("S1"), Some("Treated"));
    }

    #[test]
    fn test_tab_delimited_with_first_column_ids() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("samples.tsv");
        create_test_sheet(&file_path, "id\tcondition\nA\tx\nB\ty");

        let sheet = load_sample_sheet(&file_path).unwrap();
        assert_eq!(sheet.group_of("A"), Some("x"));
        assert_eq!(sheet.groups(), vec!["x", "y"]);
    }

    #[test]
    fn test_semicolon_delimited() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("samples.csv");
        create_test_sheet(&file_path, "SampleID;Group\nA;x");
        assert_eq!(load_sample_sheet(&file_path).unwrap().group_of("A"), Some("x"));
    }

    #[test]
    fn test_missing_group_column() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("invalid.csv");
        create_test_sheet(&file_path, "Sample,OtherField\nS1,Value1\n");
        assert!(load_sample_sheet(&file_path).is_err());
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("dup.csv");
        create_test_sheet(&file_path, "Sample,Group\nS1,a\nS1,b");
        assert!(load_sample_sheet(&file_path).is_err());
    }
}
