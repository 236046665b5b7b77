//! Numeric validation helpers for comparing CPU/GPU stage outputs.

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::image::ImageBuffer;

/// Agreement score used when comparing two stage outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `|a - b| / (|a| + |b|)`: 0 for identical buffers, approaching 1 for unrelated ones.
    #[default]
    NormalizedEuclidean,
    /// `a·b / (|a||b|)`: 1 for buffers pointing the same way.
    Cosine,
}

impl Metric {
    pub fn compare(self, lhs: &ImageBuffer, rhs: &ImageBuffer) -> Result<f64> {
        match self {
            Metric::NormalizedEuclidean => normalized_euclidean(lhs, rhs),
            Metric::Cosine => cosine_similarity(lhs, rhs),
        }
    }

    /// Score two identical buffers produce.
    pub fn perfect_score(self) -> f64 {
        match self {
            Metric::NormalizedEuclidean => 0.0,
            Metric::Cosine => 1.0,
        }
    }

    /// Distance from a perfect match, always non-negative.
    pub fn deviation(self, score: f64) -> f64 {
        (score - self.perfect_score()).abs()
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::NormalizedEuclidean => "normalized euclidean distance",
            Metric::Cosine => "cosine similarity",
        }
    }
}

/// Sums gathered in one pass over a pair of buffers.
#[derive(Debug, Default)]
struct PairSums {
    lhs_sq: f64,
    rhs_sq: f64,
    dot: f64,
    diff_sq: f64,
}

fn pair_sums(lhs: &ImageBuffer, rhs: &ImageBuffer) -> Result<PairSums> {
    if lhs.shape() != rhs.shape() {
        return Err(HarnessError::ShapeMismatch {
            context: "buffer comparison",
            expected: lhs.shape(),
            found: rhs.shape(),
        });
    }
    let mut sums = PairSums::default();
    for (&a, &b) in lhs.as_slice().iter().zip(rhs.as_slice()) {
        let (a, b) = (f64::from(a), f64::from(b));
        sums.lhs_sq += a * a;
        sums.rhs_sq += b * b;
        sums.dot += a * b;
        sums.diff_sq += (a - b) * (a - b);
    }
    Ok(sums)
}

/// Normalized Euclidean distance.
///
/// Two all-zero buffers are identical and score `0`. When only one side is all zeros the
/// formula already yields exactly `1`.
pub fn normalized_euclidean(lhs: &ImageBuffer, rhs: &ImageBuffer) -> Result<f64> {
    let sums = pair_sums(lhs, rhs)?;
    let magnitudes = sums.lhs_sq.sqrt() + sums.rhs_sq.sqrt();
    if magnitudes == 0.0 {
        return Ok(0.0);
    }
    Ok(sums.diff_sq.sqrt() / magnitudes)
}

/// Cosine similarity.
///
/// Two all-zero buffers are identical and score `1`; a single all-zero side has no direction
/// and scores `0`.
pub fn cosine_similarity(lhs: &ImageBuffer, rhs: &ImageBuffer) -> Result<f64> {
    let sums = pair_sums(lhs, rhs)?;
    let lhs_norm = sums.lhs_sq.sqrt();
    let rhs_norm = sums.rhs_sq.sqrt();
    match (lhs_norm == 0.0, rhs_norm == 0.0) {
        (true, true) => Ok(1.0),
        (true, false) | (false, true) => Ok(0.0),
        (false, false) => Ok((sums.dot / (lhs_norm * rhs_norm)).clamp(-1.0, 1.0)),
    }
}

/// Computes a simple checksum over a stage buffer to aid parity debugging.
pub fn checksum(buffer: &ImageBuffer) -> f64 {
    buffer
        .as_slice()
        .iter()
        .fold(0.0, |acc, &v| acc + f64::from(v))
}
