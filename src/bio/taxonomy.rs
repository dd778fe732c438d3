//! Taxon labels derived from reference database headers.
//!
//! A reference header such as
//! `AY188352.1.1546 Bacteria;Bacillota;Bacilli;Lactobacillales;Streptococcaceae;Streptococcus;Streptococcus salivarius`
//! provides both the subject id used by the alignment search (the leading
//! whitespace-delimited token) and the human-readable taxon label (the
//! full header).

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};

/// One reference record's identity: subject id plus full header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonLabel {
    subject_id: String,
    header: String,
}

impl TaxonLabel {
    /// Builds a label from a FASTA header (without the leading `>`).
    /// Returns `None` for a blank header.
    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        let subject_id = header.split_whitespace().next()?;
        Some(TaxonLabel {
            subject_id: subject_id.to_string(),
            header: header.to_string(),
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// The full header, used as the row label of abundance matrices.
    pub fn header(&self) -> &str {
        &self.header
    }
}

/// Shortens a SILVA-style label to `<subject id> <most specific rank>`.
///
/// `AY188352.1.1546 Bacteria;...;Streptococcus;Streptococcus salivarius`
/// becomes `AY188352.1.1546 Streptococcus salivarius`. Labels without a
/// `;` are returned unchanged.
pub fn shorten_silva_label(label: &str) -> String {
    if !label.contains(';') {
        return label.to_string();
    }
    let prefix = label.split(' ').next().unwrap_or(label);
    let suffix = label.rsplit(';').next().unwrap_or_default();
    format!("{} {}", prefix, suffix)
}

/// All reference records keyed by subject id, in file order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTaxa {
    labels: IndexMap<String, TaxonLabel>,
}

impl ReferenceTaxa {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a header. A repeated subject id keeps the first header.
    pub fn insert_header(&mut self, header: &str) -> bool {
        let Some(label) = TaxonLabel::from_header(header) else {
            warn!("Skipping reference record with an empty header.");
            return false;
        };
        if self.labels.contains_key(label.subject_id()) {
            warn!(
                "Duplicate subject id '{}' in reference; keeping the first header.",
                label.subject_id()
            );
            return false;
        }
        self.labels.insert(label.subject_id().to_string(), label);
        true
    }

    pub fn get(&self, subject_id: &str) -> Option<&TaxonLabel> {
        self.labels.get(subject_id)
    }

    pub fn contains(&self, subject_id: &str) -> bool {
        self.labels.contains_key(subject_id)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for ReferenceTaxa {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut taxa = ReferenceTaxa::new();
        for header in iter {
            taxa.insert_header(header);
        }
        taxa
    }
}
