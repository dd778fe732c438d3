//! Best-hit resolution: at most one reference assignment per read.
//!
//! Hits below the identity threshold are dropped, the remaining hits are
//! grouped by read, and the hit with the highest percent identity wins.
//! Reads whose best identity is shared by several references are resolved
//! by the configured [`TieBreak`]: either a uniform choice from a seeded
//! generator (so no reference is favoured by its position in the search
//! output) or the smallest subject id.

use crate::config::{MinIdentity, TieBreak};
use crate::io::alignment::AlignmentHit;
use indexmap::IndexMap;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The retained alignment of one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedHit {
    pub subject_id: String,
    pub percent_identity: f64,
}

/// Bookkeeping of one sample's resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub raw_hits: usize,
    pub passing_hits: usize,
    pub assigned_reads: usize,
    /// Reads whose best identity was shared by more than one hit.
    pub tied_reads: usize,
}

/// Per-sample mapping of read id to its best hit, in first-seen read order.
#[derive(Debug, Clone)]
pub struct SampleAssignment {
    sample_id: String,
    assignments: IndexMap<String, ResolvedHit>,
    /// Every subject id in the input hits, including dropped ones.
    subject_ids: BTreeSet<String>,
    stats: ResolutionStats,
}

impl SampleAssignment {
    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn get(&self, query_id: &str) -> Option<&ResolvedHit> {
        self.assignments.get(query_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedHit)> {
        self.assignments.iter().map(|(q, h)| (q.as_str(), h))
    }

    /// Distinct subject ids of all hits, whether or not they were kept.
    pub fn subject_ids(&self) -> impl Iterator<Item = &str> {
        self.subject_ids.iter().map(String::as_str)
    }

    pub fn stats(&self) -> &ResolutionStats {
        &self.stats
    }
}

pub struct BestHitResolver {
    min_identity: MinIdentity,
    tie_break: TieBreak,
}

impl BestHitResolver {
    pub fn new(min_identity: MinIdentity, tie_break: TieBreak) -> Self {
        BestHitResolver {
            min_identity,
            tie_break,
        }
    }

    /// Resolves all hits of one sample.
    ///
    /// With [`TieBreak::Random`] the generator is seeded from the run seed
    /// and the sample id, so the outcome does not depend on the order in
    /// which samples are processed.
    pub fn resolve(&self, sample_id: &str, hits: Vec<AlignmentHit>) -> SampleAssignment {
        let raw_hits = hits.len();

        let mut by_query: IndexMap<String, Vec<AlignmentHit>> = IndexMap::new();
        let mut passing_hits = 0;
        let mut subject_ids = BTreeSet::new();
        for hit in hits {
            if !subject_ids.contains(&hit.subject_id) {
                subject_ids.insert(hit.subject_id.clone());
            }
            if !self.min_identity.passes(hit.percent_identity) {
                continue;
            }
            passing_hits += 1;
            by_query.entry(hit.query_id.clone()).or_default().push(hit);
        }

        let mut rng = match self.tie_break {
            TieBreak::Random { seed } => Some(StdRng::seed_from_u64(sample_seed(seed, sample_id))),
            TieBreak::Lexicographic => None,
        };

        let mut tied_reads = 0;
        let mut assignments = IndexMap::with_capacity(by_query.len());
        for (query_id, group) in by_query {
            let best = group
                .iter()
                .map(|h| h.percent_identity)
                .fold(f64::NEG_INFINITY, f64::max);
            let candidates: Vec<&AlignmentHit> =
                group.iter().filter(|h| h.percent_identity == best).collect();

            let chosen = if candidates.len() == 1 {
                candidates[0]
            } else {
                tied_reads += 1;
                match rng.as_mut() {
                    Some(rng) => *candidates.choose(rng).unwrap_or(&candidates[0]),
                    None => candidates
                        .iter()
                        .copied()
                        .min_by(|a, b| a.subject_id.cmp(&b.subject_id))
                        .unwrap_or(candidates[0]),
                }
            };

            assignments.insert(
                query_id,
                ResolvedHit {
                    subject_id: chosen.subject_id.clone(),
                    percent_identity: chosen.percent_identity,
                },
            );
        }

        let stats = ResolutionStats {
            raw_hits,
            passing_hits,
            assigned_reads: assignments.len(),
            tied_reads,
        };
        debug!(
            "{}: {} hits, {} above {}, {} reads assigned ({} by tie-break)",
            sample_id,
            stats.raw_hits,
            stats.passing_hits,
            self.min_identity.value(),
            stats.assigned_reads,
            stats.tied_reads
        );

        SampleAssignment {
            sample_id: sample_id.to_string(),
            assignments,
            subject_ids,
            stats,
        }
    }
}

/// Mixes the run seed with the sample id (FNV-1a) into a per-sample seed.
fn sample_seed(seed: u64, sample_id: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in sample_id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash ^ seed
}
