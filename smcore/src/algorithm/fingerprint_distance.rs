use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::fingerprint::{BitFingerprint, Fingerprint};
use crate::data::structure::StructureString;
use crate::error::{CoreError, Result};

/// Similarity metrics between fingerprints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintMetric {
    Cosine,
    /// Tanimoto on bit vectors, weighted (min over max) on count vectors.
    Jaccard,
}

impl FromStr for FingerprintMetric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cos" | "cosine" | "cosinus" => Ok(FingerprintMetric::Cosine),
            "jacc" | "jaccard" | "tanimoto" => Ok(FingerprintMetric::Jaccard),
            other => Err(CoreError::InvalidConfiguration(format!("unknown fingerprint metric '{}'", other))),
        }
    }
}

impl FingerprintMetric {
    pub fn name(&self) -> &'static str {
        match self {
            FingerprintMetric::Cosine => "cos",
            FingerprintMetric::Jaccard => "jacc",
        }
    }

    /// Similarity in `[0, 1]` between two fingerprints of equal length.
    pub fn similarity(&self, a: &Fingerprint, b: &Fingerprint) -> Result<f64> {
        if a.len() != b.len() {
            return Err(CoreError::InputShape(format!(
                "fingerprints differ in length: {} and {}",
                a.len(),
                b.len()
            )));
        }

        let similarity = match (self, a, b) {
            (FingerprintMetric::Cosine, Fingerprint::Binary(x), Fingerprint::Binary(y)) => cosine_bits(x, y),
            (FingerprintMetric::Jaccard, Fingerprint::Binary(x), Fingerprint::Binary(y)) => tanimoto(x, y),
            (FingerprintMetric::Cosine, _, _) => cosine_dense(&a.to_dense(), &b.to_dense()),
            (FingerprintMetric::Jaccard, _, _) => weighted_jaccard(&a.to_dense(), &b.to_dense()),
        };
        Ok(similarity)
    }

    /// Returns `(distance, similarity)` with `distance = 1 - similarity`.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use smcore::data::fingerprint::{BitFingerprint, Fingerprint};
    /// # use smcore::algorithm::fingerprint_distance::FingerprintMetric;
    /// let a = Fingerprint::Binary(BitFingerprint::from_indices(8, &[0, 1, 2]).unwrap());
    /// let b = Fingerprint::Binary(BitFingerprint::from_indices(8, &[1, 2, 3]).unwrap());
    /// let (distance, similarity) = FingerprintMetric::Jaccard.distance(&a, &b).unwrap();
    /// assert_eq!(similarity, 0.5);
    /// assert_eq!(distance, 0.5);
    /// ```
    pub fn distance(&self, a: &Fingerprint, b: &Fingerprint) -> Result<(f64, f64)> {
        let similarity = self.similarity(a, b)?;
        Ok((1.0 - similarity, similarity))
    }
}

/// Tanimoto similarity by word-wise population count. Two empty bit sets give 0.
pub fn tanimoto(a: &BitFingerprint, b: &BitFingerprint) -> f64 {
    let (intersection, union) = a.words().iter()
        .zip(b.words().iter())
        .fold((0u32, 0u32), |(inter, uni), (x, y)| {
            (inter + (x & y).count_ones(), uni + (x | y).count_ones())
        });

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Tanimoto similarity over the lists of set bit positions.
pub fn tanimoto_by_sets(a: &BitFingerprint, b: &BitFingerprint) -> f64 {
    let ones_a = a.ones();
    let ones_b = b.ones();

    let (mut i, mut j) = (0, 0);
    let mut intersection = 0usize;
    while i < ones_a.len() && j < ones_b.len() {
        if ones_a[i] == ones_b[j] {
            intersection += 1;
            i += 1;
            j += 1;
        } else if ones_a[i] < ones_b[j] {
            i += 1;
        } else {
            j += 1;
        }
    }

    let union = ones_a.len() + ones_b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn cosine_bits(a: &BitFingerprint, b: &BitFingerprint) -> f64 {
    let shared: u32 = a.words().iter().zip(b.words().iter()).map(|(x, y)| (x & y).count_ones()).sum();
    let norm = (a.count_ones() as f64 * b.count_ones() as f64).sqrt();
    if norm == 0.0 {
        0.0
    } else {
        shared as f64 / norm
    }
}

fn cosine_dense(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn weighted_jaccard(a: &[f64], b: &[f64]) -> f64 {
    let (min_sum, max_sum) = a.iter()
        .zip(b.iter())
        .fold((0.0, 0.0), |(lo, hi), (x, y)| (lo + x.min(*y), hi + x.max(*y)));
    if max_sum == 0.0 {
        0.0
    } else {
        min_sum / max_sum
    }
}

/// Length of the longest common subsequence of two strings, counted in characters.
pub fn longest_common_subsequence(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    // single rolling row of the classic dynamic programming table
    let mut row = vec![0usize; b.len() + 1];
    for ca in &a {
        let mut diagonal = 0;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diagonal + 1 } else { above.max(row[j]) };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// `1 - LCS / max(len)` between two structure strings; two empty strings are at distance 0.
pub fn lcs_distance(a: &StructureString, b: &StructureString) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - longest_common_subsequence(a.as_str(), b.as_str()) as f64 / max_len as f64
}
