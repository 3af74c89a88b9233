use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smcore::data::distance_matrix::DistanceMatrix;

use crate::cluster::adapter::{ClusterInput, ClusterOutcome, ClusteringAdapter};
use crate::cluster::partition::Partition;
use crate::cluster::quality::silhouette_precomputed;
use crate::error::{ClusterError, Result};

/// Parameters of average-linkage agglomerative clustering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HacParams {
    /// Number of clusters to stop at (default: 4)
    pub k: usize,
}

impl Default for HacParams {
    fn default() -> Self {
        HacParams { k: 4 }
    }
}

/// Average-linkage agglomerative clustering of a precomputed distance matrix down to `k`
/// clusters.
///
/// # Arguments
///
/// * `distances` - Symmetric item distances, never recomputed.
/// * `k` - Number of clusters, `1 <= k <= n`.
///
/// # Description
///
/// Repeatedly merges the two closest clusters, where the distance between clusters is the
/// mean of all member pair distances, maintained with the Lance-Williams update
/// `d(ij, m) = (n_i * d(i, m) + n_j * d(j, m)) / (n_i + n_j)`. Among equally close pairs the
/// one with the smallest `(i, j)` is merged first, so the result only depends on the matrix.
/// Labels are numbered in order of each cluster's first member.
///
/// # Example
///
/// ```rust
/// # use nalgebra::DMatrix;
/// # use smcore::data::distance_matrix::DistanceMatrix;
/// # use smclust::cluster::hac::average_linkage;
/// let positions = [0.0_f64, 0.5, 9.0, 9.5];
/// let m = DMatrix::from_fn(4, 4, |i, j| (positions[i] - positions[j]).abs());
/// let partition = average_linkage(&DistanceMatrix::from_dmatrix(m).unwrap(), 2).unwrap();
/// assert_eq!(partition.labels(), &[0, 0, 1, 1]);
/// ```
pub fn average_linkage(distances: &DistanceMatrix, k: usize) -> Result<Partition> {
    let n = distances.len();
    if k == 0 || k > n {
        return Err(ClusterError::InvalidConfiguration(format!(
            "cannot form {} clusters from {} items",
            k, n
        )));
    }

    let mut d = distances.as_matrix().clone();
    let mut active = vec![true; n];
    let mut sizes = vec![1usize; n];
    let mut owner: Vec<usize> = (0..n).collect();
    let mut nearest: Vec<Option<(usize, f64)>> = (0..n)
        .map(|i| nearest_above(i, &d, &active))
        .collect();

    for _ in 0..(n - k) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in (0..n).filter(|i| active[*i]) {
            if let Some((j, dist)) = nearest[i] {
                if best.map_or(true, |(_, _, b)| dist < b) {
                    best = Some((i, j, dist));
                }
            }
        }
        let Some((i, j, dist)) = best else { break };

        debug!("merging cluster {} (size {}) into {} (size {}) at {:.6}", j, sizes[j], i, sizes[i], dist);

        let (n_i, n_j) = (sizes[i] as f64, sizes[j] as f64);
        active[j] = false;
        for m in (0..n).filter(|m| active[*m] && *m != i) {
            let merged = (n_i * d[(i, m)] + n_j * d[(j, m)]) / (n_i + n_j);
            d[(i, m)] = merged;
            d[(m, i)] = merged;
        }
        sizes[i] += sizes[j];
        owner.iter_mut().filter(|o| **o == j).for_each(|o| *o = i);

        nearest[j] = None;
        nearest[i] = nearest_above(i, &d, &active);
        for m in (0..i).filter(|m| active[*m]) {
            match nearest[m] {
                Some((target, _)) if target == i || target == j => {
                    nearest[m] = nearest_above(m, &d, &active);
                }
                Some((target, current)) => {
                    let candidate = d[(m, i)];
                    if candidate < current || (candidate == current && i < target) {
                        nearest[m] = Some((i, candidate));
                    }
                }
                None => nearest[m] = nearest_above(m, &d, &active),
            }
        }
        for m in (i + 1..j).filter(|m| active[*m]) {
            if matches!(nearest[m], Some((target, _)) if target == j) {
                nearest[m] = nearest_above(m, &d, &active);
            }
        }
    }

    // the surviving index of every cluster is its smallest member
    let labels = owner.iter().map(|o| *o as i32).collect();
    Ok(Partition::from_labels(labels).relabel_by_first_member())
}

/// Closest active cluster with a larger index, first one on ties.
fn nearest_above(i: usize, d: &nalgebra::DMatrix<f64>, active: &[bool]) -> Option<(usize, f64)> {
    let mut nearest: Option<(usize, f64)> = None;
    for j in (i + 1)..active.len() {
        if !active[j] {
            continue;
        }
        if nearest.map_or(true, |(_, best)| d[(i, j)] < best) {
            nearest = Some((j, d[(i, j)]));
        }
    }
    nearest
}

impl ClusteringAdapter for HacParams {
    fn name(&self) -> &'static str {
        "hac"
    }

    fn cluster(&self, input: &ClusterInput) -> Result<ClusterOutcome> {
        let distances = input.distances(self.name())?;
        let partition = average_linkage(distances, self.k)?;
        let silhouette = silhouette_precomputed(distances, &partition)?;
        info!("hac formed {} clusters over {} items, silhouette {:.4}", self.k, distances.len(), silhouette);

        Ok(ClusterOutcome {
            algorithm: self.name(),
            partition,
            parameters: serde_json::to_value(self)?,
            performance: json!({ "silhouette_score": silhouette }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn line(positions: &[f64]) -> DistanceMatrix {
        let n = positions.len();
        let m = DMatrix::from_fn(n, n, |i, j| (positions[i] - positions[j]).abs());
        DistanceMatrix::from_dmatrix(m).unwrap()
    }

    /// Reference implementation recomputing every average from the member lists.
    fn naive_average_linkage(distances: &DistanceMatrix, k: usize) -> Vec<i32> {
        let n = distances.len();
        let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        while clusters.len() > k {
            let mut best = (0, 1, f64::INFINITY);
            for a in 0..clusters.len() {
                for b in (a + 1)..clusters.len() {
                    let total: f64 = clusters[a].iter()
                        .flat_map(|x| clusters[b].iter().map(move |y| (*x, *y)))
                        .map(|(x, y)| distances.get(x, y))
                        .sum();
                    let mean = total / (clusters[a].len() * clusters[b].len()) as f64;
                    if mean < best.2 {
                        best = (a, b, mean);
                    }
                }
            }
            let moved = clusters.remove(best.1);
            clusters[best.0].extend(moved);
        }
        let mut labels = vec![0; n];
        for (label, members) in clusters.iter().enumerate() {
            for m in members {
                labels[*m] = label as i32;
            }
        }
        Partition::new(labels).unwrap().relabel_by_first_member().labels().to_vec()
    }

    #[test]
    fn test_two_obvious_groups() {
        let matrix = line(&[0.0, 10.0, 0.3, 10.2, 0.1, 9.9]);
        let partition = average_linkage(&matrix, 2).unwrap();
        assert_eq!(partition.labels(), &[0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_matches_naive_average_linkage() {
        let positions: Vec<f64> = (0..30).map(|i| ((i * 37 % 101) as f64 * 0.173).sin() * 10.0).collect();
        let matrix = line(&positions);
        for k in [1, 2, 3, 5, 8, 30] {
            assert_eq!(average_linkage(&matrix, k).unwrap().labels(), naive_average_linkage(&matrix, k).as_slice());
        }
    }

    #[test]
    fn test_deterministic() {
        let positions: Vec<f64> = (0..20).map(|i| (i % 7) as f64).collect();
        let matrix = line(&positions);
        let first = average_linkage(&matrix, 4).unwrap();
        let second = average_linkage(&matrix, 4).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.n_clusters(), 4);
    }

    #[test]
    fn test_extreme_k() {
        let matrix = line(&[0.0, 1.0, 3.0]);
        assert_eq!(average_linkage(&matrix, 1).unwrap().labels(), &[0, 0, 0]);
        assert_eq!(average_linkage(&matrix, 3).unwrap().labels(), &[0, 1, 2]);
        assert!(matches!(average_linkage(&matrix, 0), Err(ClusterError::InvalidConfiguration(_))));
        assert!(matches!(average_linkage(&matrix, 4), Err(ClusterError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_adapter_reports_silhouette() {
        let matrix = line(&[0.0, 0.2, 5.0, 5.1]);
        let outcome = HacParams { k: 2 }.cluster(&ClusterInput::Distances(&matrix)).unwrap();
        assert_eq!(outcome.parameters["k"], 2);
        assert!(outcome.performance["silhouette_score"].as_f64().unwrap() > 0.9);
    }
}
