//! Reference taxonomy and label utilities.
//!
//! Taxon labels come from reference database headers; these sub-modules
//! map alignment subject ids to labels and keep labels usable as unique
//! matrix identifiers.

pub mod labels;
pub mod taxonomy;
