//! Two-sided Mann-Whitney U (Wilcoxon rank-sum) test.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

/// Largest `n1 * n2` for which the exact null distribution is enumerated.
const EXACT_MAX_PRODUCT: usize = 2500;

#[derive(Error, Debug)]
pub enum MannWhitneyError {
    #[error("Both samples need at least one observation (got {0} and {1})")]
    EmptySample(usize, usize),

    #[error("Normal distribution error: {0}")]
    Distribution(String),
}

/// How the p-value is obtained from the U statistic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PValueMethod {
    /// Tie-corrected normal approximation.
    #[default]
    Asymptotic,
    /// Normal approximation with a 0.5 continuity correction.
    AsymptoticContinuity,
    /// Exact null distribution; falls back to `Asymptotic` when the data
    /// contain ties or the samples are large.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MannWhitneyResult {
    /// U statistic of the first sample; this is the `Statistic` column of
    /// the comparison output. When every observation is tied it is
    /// `n1 * n2 / 2`, and `z` (not `u`) is the value that is 0.
    pub u: f64,
    /// Standardized statistic, 0 when every observation is tied.
    pub z: f64,
    pub p_value: f64,
}

/// Runs the two-sided test of `x` against `y`.
pub fn mann_whitney_u(
    x: &[f64],
    y: &[f64],
    method: PValueMethod,
) -> Result<MannWhitneyResult, MannWhitneyError> {
    let (n1, n2) = (x.len(), y.len());
    if n1 == 0 || n2 == 0 {
        return Err(MannWhitneyError::EmptySample(n1, n2));
    }

    let (ranks, tie_term) = average_ranks(x.iter().chain(y.iter()).copied());
    let rank_sum_x: f64 = ranks[..n1].iter().sum();
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let n = n1f + n2f;

    let u = rank_sum_x - n1f * (n1f + 1.0) / 2.0;
    let mean_u = n1f * n2f / 2.0;
    let variance = n1f * n2f / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));

    if variance <= 0.0 {
        return Ok(MannWhitneyResult {
            u,
            z: 0.0,
            p_value: 1.0,
        });
    }
    let sd = variance.sqrt();
    let z = (u - mean_u) / sd;

    let normal = Normal::new(0.0, 1.0).map_err(|e| MannWhitneyError::Distribution(e.to_string()))?;
    let two_sided = |stat: f64| (2.0 * normal.sf(stat)).min(1.0);

    let p_value = match method {
        PValueMethod::Asymptotic => two_sided(z.abs()),
        PValueMethod::AsymptoticContinuity => two_sided(((u - mean_u).abs() - 0.5) / sd),
        PValueMethod::Exact if tie_term == 0.0 && n1 * n2 <= EXACT_MAX_PRODUCT => {
            exact_p_value(u, n1, n2)
        }
        PValueMethod::Exact => two_sided(z.abs()),
    };

    Ok(MannWhitneyResult { u, z, p_value })
}

/// Ranks (1-based, ties averaged) of `values` in input order, together with
/// the tie correction term `sum(t^3 - t)` over tie groups.
fn average_ranks(values: impl Iterator<Item = f64>) -> (Vec<f64>, f64) {
    let mut indexed: Vec<(usize, f64)> = values.enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut ranks = vec![0.0; indexed.len()];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < indexed.len() {
        let mut end = start + 1;
        while end < indexed.len() && indexed[end].1 == indexed[start].1 {
            end += 1;
        }
        // Positions start..end share the mean of ranks start+1..=end.
        let rank = (start + end + 1) as f64 / 2.0;
        for &(original, _) in &indexed[start..end] {
            ranks[original] = rank;
        }
        let t = (end - start) as f64;
        tie_term += t * t * t - t;
        start = end;
    }
    (ranks, tie_term)
}

/// Two-sided p-value from the exact distribution of U without ties.
fn exact_p_value(u: f64, n1: usize, n2: usize) -> f64 {
    let frequencies = u_frequencies(n1, n2);
    let total: f64 = frequencies.iter().sum();
    let smaller = u.min((n1 * n2) as f64 - u).round() as usize;
    let tail: f64 = frequencies[..=smaller].iter().sum();
    (2.0 * tail / total).min(1.0)
}

/// Number of orderings giving each value of U, i.e. the coefficients of the
/// Gaussian binomial `[n1 + n2 choose n1]`.
fn u_frequencies(n1: usize, n2: usize) -> Vec<f64> {
    let max_u = n1 * n2;
    let mut coefficients = vec![0.0; max_u + 1];
    coefficients[0] = 1.0;
    for i in 1..=n1 {
        let grow = n2 + i;
        for k in (grow..=max_u).rev() {
            coefficients[k] -= coefficients[k - grow];
        }
        for k in i..=max_u {
            coefficients[k] += coefficients[k - i];
        }
    }
    coefficients
}
