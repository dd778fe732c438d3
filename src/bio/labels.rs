//! Unique axis labels for abundance matrices.

use std::collections::HashMap;

/// Renames repeated labels by appending `_1`, `_2`, ... in order of
/// appearance. Labels that occur once are left untouched and the order of
/// the input is preserved.
pub fn disambiguate(labels: &[String]) -> Vec<String> {
    let mut occurrences: HashMap<&str, usize> = HashMap::with_capacity(labels.len());
    for label in labels {
        *occurrences.entry(label.as_str()).or_insert(0) += 1;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    labels
        .iter()
        .map(|label| {
            if occurrences[label.as_str()] > 1 {
                let ordinal = seen.entry(label.as_str()).or_insert(0);
                *ordinal += 1;
                format!("{}_{}", label, ordinal)
            } else {
                label.clone()
            }
        })
        .collect()
}

/// Returns true when no label occurs twice.
pub fn is_unique(labels: &[String]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(labels.len());
    labels.iter().all(|l| seen.insert(l.as_str()))
}
