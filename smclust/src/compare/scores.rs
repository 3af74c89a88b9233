use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::function::factorial::binomial;

use crate::cluster::partition::Partition;
use crate::error::{ClusterError, Result};

/// Agreement between two partitions of the same items.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgreementScores {
    /// Adjusted Rand Index, 1 for identical partitions, around 0 for random ones.
    pub ari: f64,
    /// Normalized Mutual Information with arithmetic mean normalisation, in [0, 1].
    pub nmi: f64,
}

/// Label co-occurrence counts of two aligned label vectors.
struct Contingency {
    n: usize,
    cells: BTreeMap<(i32, i32), usize>,
    rows: BTreeMap<i32, usize>,
    columns: BTreeMap<i32, usize>,
}

impl Contingency {
    fn new(a: &[i32], b: &[i32]) -> Self {
        let mut cells = BTreeMap::new();
        let mut rows = BTreeMap::new();
        let mut columns = BTreeMap::new();
        for (la, lb) in a.iter().zip(b) {
            *cells.entry((*la, *lb)).or_insert(0) += 1;
            *rows.entry(*la).or_insert(0) += 1;
            *columns.entry(*lb).or_insert(0) += 1;
        }
        Contingency { n: a.len(), cells, rows, columns }
    }
}

fn pairs(count: usize) -> f64 {
    binomial(count as u64, 2)
}

fn entropy<'a>(counts: impl Iterator<Item = &'a usize>, n: usize) -> f64 {
    let n = n as f64;
    counts
        .map(|c| {
            let p = *c as f64 / n;
            if p > 0.0 { -p * p.ln() } else { 0.0 }
        })
        .sum()
}

/// Adjusted Rand Index of two label vectors.
///
/// `(index - expected) / (max - expected)` over pair counts of the contingency table. When
/// the denominator vanishes (one cluster on both sides, or all singletons on both sides)
/// the partitions are identical up to renaming and the score is 1.
pub fn adjusted_rand_index(a: &[i32], b: &[i32]) -> f64 {
    let table = Contingency::new(a, b);
    if table.n < 2 {
        return 1.0;
    }

    let index: f64 = table.cells.values().map(|c| pairs(*c)).sum();
    let row_pairs: f64 = table.rows.values().map(|c| pairs(*c)).sum();
    let column_pairs: f64 = table.columns.values().map(|c| pairs(*c)).sum();
    let expected = row_pairs * column_pairs / pairs(table.n);
    let max_index = (row_pairs + column_pairs) / 2.0;

    if max_index == expected {
        return 1.0;
    }
    (index - expected) / (max_index - expected)
}

/// Normalized Mutual Information of two label vectors, `MI / ((H(a) + H(b)) / 2)`.
///
/// Two single-cluster partitions score 1. The mutual information is taken as
/// `H(a) + H(b) - H(a, b)`, the result is clamped to [0, 1].
pub fn normalized_mutual_information(a: &[i32], b: &[i32]) -> f64 {
    let table = Contingency::new(a, b);
    if table.rows.len() <= 1 && table.columns.len() <= 1 {
        return 1.0;
    }

    let h_a = entropy(table.rows.values(), table.n);
    let h_b = entropy(table.columns.values(), table.n);
    let h_ab = entropy(table.cells.values(), table.n);
    let mutual = (h_a + h_b - h_ab).max(0.0);
    if mutual == 0.0 {
        return 0.0;
    }
    (mutual / ((h_a + h_b) / 2.0)).clamp(0.0, 1.0)
}

/// ARI and NMI of two partitions over the same items.
///
/// # Example
///
/// ```rust
/// # use smclust::cluster::partition::Partition;
/// # use smclust::compare::scores::agreement;
/// let a = Partition::new(vec![0, 0, 0, 1, 1, 1]).unwrap();
/// let scores = agreement(&a, &a).unwrap();
/// assert_eq!((scores.ari, scores.nmi), (1.0, 1.0));
/// ```
pub fn agreement(a: &Partition, b: &Partition) -> Result<AgreementScores> {
    if a.len() != b.len() {
        return Err(ClusterError::InputShape(format!(
            "partitions cover {} and {} items",
            a.len(),
            b.len()
        )));
    }
    Ok(AgreementScores {
        ari: adjusted_rand_index(a.labels(), b.labels()),
        nmi: normalized_mutual_information(a.labels(), b.labels()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_partitions() {
        let labels = [0, 0, 0, 1, 1, 1];
        assert_eq!(adjusted_rand_index(&labels, &labels), 1.0);
        assert_eq!(normalized_mutual_information(&labels, &labels), 1.0);
    }

    #[test]
    fn test_renamed_labels() {
        let a = [0, 0, 1, 1, 2, 2];
        let b = [5, 5, 3, 3, 9, 9];
        assert!((adjusted_rand_index(&a, &b) - 1.0).abs() < 1e-12);
        assert!((normalized_mutual_information(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_values() {
        // sklearn: adjusted_rand_score([0, 0, 1, 1], [0, 0, 1, 2]) = 0.5714285714285715
        let a = [0, 0, 1, 1];
        let b = [0, 0, 1, 2];
        assert!((adjusted_rand_index(&a, &b) - 4.0 / 7.0).abs() < 1e-12);
        // MI = H(a) = ln 2, H(b) = 1.5 ln 2, NMI = ln 2 / 1.25 ln 2
        assert!((normalized_mutual_information(&a, &b) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_independent_partitions() {
        let a = [0, 0, 1, 1];
        let b = [0, 1, 0, 1];
        assert!(adjusted_rand_index(&a, &b) < 0.0);
        assert!(normalized_mutual_information(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_partitions() {
        assert_eq!(adjusted_rand_index(&[1, 1, 1], &[2, 2, 2]), 1.0);
        assert_eq!(normalized_mutual_information(&[1, 1, 1], &[2, 2, 2]), 1.0);
        assert_eq!(adjusted_rand_index(&[0, 1, 2], &[2, 0, 1]), 1.0);
        assert_eq!(normalized_mutual_information(&[0, 0, 0], &[0, 1, 2]), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let a = Partition::new(vec![0, 1]).unwrap();
        let b = Partition::new(vec![0, 1, 1]).unwrap();
        assert!(matches!(agreement(&a, &b), Err(ClusterError::InputShape(_))));
    }
}
