use std::collections::BTreeMap;

use nalgebra::DMatrix;
use smcore::data::distance_matrix::DistanceMatrix;

use crate::cluster::partition::Partition;
use crate::error::{ClusterError, Result};

/// Score given to partitions the silhouette is undefined for.
pub const UNDEFINED_SILHOUETTE: f64 = -1.0;

/// Mean silhouette coefficient of `partition` over a precomputed distance matrix.
///
/// # Arguments
///
/// * `distances` - Symmetric item distances.
/// * `partition` - Labels indexed like the matrix rows, noise counts as an ordinary label.
///
/// # Description
///
/// For item `i` with own-cluster mean distance `a` and smallest other-cluster mean distance
/// `b` the coefficient is `(b - a) / max(a, b)`. Items alone in their cluster score 0. The
/// mean is undefined when fewer than 2 or more than `n - 1` labels are present, in which
/// case `UNDEFINED_SILHOUETTE` is returned.
pub fn silhouette_precomputed(distances: &DistanceMatrix, partition: &Partition) -> Result<f64> {
    if distances.len() != partition.len() {
        return Err(ClusterError::InputShape(format!(
            "partition of {} items does not match a {}x{} distance matrix",
            partition.len(),
            distances.len(),
            distances.len()
        )));
    }
    Ok(silhouette_labels(distances.as_matrix(), partition.labels()))
}

/// Mean silhouette coefficient over the Euclidean distances between the rows of `features`.
pub fn silhouette_features(features: &DMatrix<f64>, labels: &[i32]) -> Result<f64> {
    if features.nrows() != labels.len() {
        return Err(ClusterError::InputShape(format!(
            "{} labels for {} feature rows",
            labels.len(),
            features.nrows()
        )));
    }
    Ok(silhouette_labels(&euclidean_distances(features), labels))
}

/// Pairwise Euclidean distances between the rows of `features`.
pub fn euclidean_distances(features: &DMatrix<f64>) -> DMatrix<f64> {
    let n = features.nrows();
    let mut values = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = (features.row(i) - features.row(j)).norm();
            values[(i, j)] = d;
            values[(j, i)] = d;
        }
    }
    values
}

/// Mean silhouette of `labels` over a dense distance matrix, see [`silhouette_precomputed`].
pub(crate) fn silhouette_labels(distances: &DMatrix<f64>, labels: &[i32]) -> f64 {
    let n = labels.len();
    let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (item, label) in labels.iter().enumerate() {
        members.entry(*label).or_default().push(item);
    }

    let n_labels = members.len();
    if n_labels < 2 || n_labels > n - 1 {
        return UNDEFINED_SILHOUETTE;
    }

    let total: f64 = (0..n)
        .map(|i| {
            let own = &members[&labels[i]];
            if own.len() == 1 {
                return 0.0;
            }
            let a = own.iter().map(|&j| distances[(i, j)]).sum::<f64>() / (own.len() - 1) as f64;
            let b = members.iter()
                .filter(|(label, _)| **label != labels[i])
                .map(|(_, other)| other.iter().map(|&j| distances[(i, j)]).sum::<f64>() / other.len() as f64)
                .fold(f64::INFINITY, f64::min);
            let scale = a.max(b);
            if scale > 0.0 { (b - a) / scale } else { 0.0 }
        })
        .sum();

    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> DistanceMatrix {
        // items 0..3 sit at 0.0, 0.1, 0.2 and items 3..6 at 10.0, 10.1, 10.2 on a line
        let positions: [f64; 6] = [0.0, 0.1, 0.2, 10.0, 10.1, 10.2];
        let m = DMatrix::from_fn(6, 6, |i, j| (positions[i] - positions[j]).abs());
        DistanceMatrix::from_dmatrix(m).unwrap()
    }

    #[test]
    fn test_separated_groups_score_high() {
        let partition = Partition::new(vec![0, 0, 0, 1, 1, 1]).unwrap();
        let score = silhouette_precomputed(&two_groups(), &partition).unwrap();
        assert!(score > 0.95, "score {}", score);
    }

    #[test]
    fn test_mixed_groups_score_low() {
        let partition = Partition::new(vec![0, 1, 0, 1, 0, 1]).unwrap();
        let score = silhouette_precomputed(&two_groups(), &partition).unwrap();
        assert!(score < 0.0, "score {}", score);
    }

    #[test]
    fn test_undefined_label_counts() {
        let matrix = two_groups();
        let single = Partition::new(vec![0; 6]).unwrap();
        assert_eq!(silhouette_precomputed(&matrix, &single).unwrap(), UNDEFINED_SILHOUETTE);
        let all_distinct = Partition::new((0..6).collect()).unwrap();
        assert_eq!(silhouette_precomputed(&matrix, &all_distinct).unwrap(), UNDEFINED_SILHOUETTE);
    }

    #[test]
    fn test_singleton_contributes_zero() {
        let m = DMatrix::from_row_slice(3, 3, &[0.0, 1.0, 5.0, 1.0, 0.0, 5.0, 5.0, 5.0, 0.0]);
        let matrix = DistanceMatrix::from_dmatrix(m).unwrap();
        let partition = Partition::new(vec![0, 0, 1]).unwrap();
        // items 0 and 1 each score (5 - 1) / 5, item 2 scores 0
        let score = silhouette_precomputed(&matrix, &partition).unwrap();
        assert!((score - 1.6 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_features_match_precomputed() {
        let features = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 0.0, 1.0, 5.0, 5.0, 5.0, 6.0]);
        let labels = [0, 0, 1, 1];
        let from_features = silhouette_features(&features, &labels).unwrap();
        let matrix = DistanceMatrix::from_dmatrix(euclidean_distances(&features)).unwrap();
        let precomputed = silhouette_precomputed(&matrix, &Partition::new(labels.to_vec()).unwrap()).unwrap();
        assert!((from_features - precomputed).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let partition = Partition::new(vec![0, 1]).unwrap();
        assert!(matches!(
            silhouette_precomputed(&two_groups(), &partition),
            Err(ClusterError::InputShape(_))
        ));
    }
}
