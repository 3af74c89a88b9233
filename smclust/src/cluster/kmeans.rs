use std::collections::BTreeMap;

use linfa::traits::{Fit, FitWith, Predict};
use linfa::{DatasetBase, ParamGuard};
use linfa_clustering::{IncrKMeansError, KMeans};
use log::{debug, info, warn};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smcore::config::Workers;

use crate::cluster::adapter::{ClusterInput, ClusterOutcome, ClusteringAdapter};
use crate::cluster::partition::Partition;
use crate::cluster::quality::{euclidean_distances, silhouette_labels};
use crate::error::{ClusterError, Result};

const LLOYD_MAX_ITER: u64 = 300;
const LLOYD_TOLERANCE: f64 = 1e-4;
const MINI_BATCH_MAX_ITER: usize = 100;
const MINI_BATCH_TOLERANCE: f64 = 1e-6;

/// Centroid update rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KMeansVariant {
    /// Full-batch assignment and mean update until the centroids stop moving.
    Lloyd,
    /// Incremental updates on random batches of the items.
    MiniBatch { batch_size: usize },
}

impl Default for KMeansVariant {
    fn default() -> Self {
        KMeansVariant::MiniBatch { batch_size: 1024 }
    }
}

/// Parameters of k-means with silhouette based selection of k.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KSelectionParams {
    /// Smallest candidate k, raised to 2 when lower (default: 2)
    pub k_min: usize,
    /// Largest candidate k, lowered to the item count when higher (default: 10)
    pub k_max: usize,
    /// Restarts per k, the lowest inertia wins (default: 10)
    pub n_init: usize,
    /// Seed of the random generators (default: 42)
    pub seed: u64,
    pub variant: KMeansVariant,
    /// Workers the candidate k values are spread over
    pub workers: Workers,
}

impl Default for KSelectionParams {
    fn default() -> Self {
        KSelectionParams {
            k_min: 2,
            k_max: 10,
            n_init: 10,
            seed: 42,
            variant: KMeansVariant::default(),
            workers: Workers::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: DMatrix<f64>,
    /// Sum of squared distances of the items to their centroid.
    pub inertia: f64,
}

/// Result of scanning a range of k.
#[derive(Clone, Debug, PartialEq)]
pub struct KSelection {
    /// Effective range after clamping.
    pub k_min: usize,
    pub k_max: usize,
    pub scores: BTreeMap<usize, f64>,
    pub best_k: usize,
    pub partition: Partition,
    pub silhouette: f64,
}

/// Divides every row by its Euclidean norm; all-zero rows are left as they are.
///
/// # Example
///
/// ```rust
/// # use nalgebra::DMatrix;
/// # use smclust::cluster::kmeans::normalize_rows;
/// let x = DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 0.0, 0.0]);
/// let n = normalize_rows(&x);
/// assert_eq!(n.row(0).iter().copied().collect::<Vec<_>>(), vec![0.6, 0.8]);
/// assert_eq!(n.row(1).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0]);
/// ```
pub fn normalize_rows(features: &DMatrix<f64>) -> DMatrix<f64> {
    let mut normalized = features.clone();
    for mut row in normalized.row_iter_mut() {
        let norm = row.norm();
        let norm = if norm == 0.0 { 1.0 } else { norm };
        row /= norm;
    }
    normalized
}

fn to_array(features: &DMatrix<f64>, rows: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), features.ncols()), |(i, j)| features[(rows[i], j)])
}

fn fit_error(e: impl std::fmt::Display) -> ClusterError {
    ClusterError::KMeans(e.to_string())
}

/// Labels from the model's assignment, inertia recomputed over all items.
fn finish(features: &DMatrix<f64>, centroids: &Array2<f64>, labels: Vec<usize>) -> KMeansFit {
    let centroids = DMatrix::from_fn(centroids.nrows(), centroids.ncols(), |i, j| centroids[[i, j]]);
    let inertia = labels.iter()
        .enumerate()
        .map(|(i, c)| (features.row(i) - centroids.row(*c)).norm_squared())
        .sum();
    KMeansFit { labels, centroids, inertia }
}

/// Runs k-means with k-means++ seeding and keeps the restart with the lowest inertia.
///
/// # Arguments
///
/// * `features` - One row per item.
/// * `k` - Number of centroids, `1 <= k <= n`.
/// * `n_init` - Restarts.
/// * `seed` - Base seed, equal seeds give equal fits.
/// * `variant` - Lloyd or mini-batch updates.
///
/// # Description
///
/// Lloyd fits run `n_init` times on one generator seeded with `seed`. Mini-batch restart `r`
/// draws its batches and initial centroids from a generator seeded with `seed + r` and
/// stops once an update moves no centroid by more than the tolerance.
pub fn kmeans(features: &DMatrix<f64>, k: usize, n_init: usize, seed: u64, variant: KMeansVariant) -> Result<KMeansFit> {
    let n = features.nrows();
    if k == 0 || k > n {
        return Err(ClusterError::InvalidConfiguration(format!("cannot place {} centroids on {} items", k, n)));
    }
    if n_init == 0 {
        return Err(ClusterError::InvalidConfiguration("n_init must be at least 1".to_string()));
    }
    if let KMeansVariant::MiniBatch { batch_size: 0 } = variant {
        return Err(ClusterError::InvalidConfiguration("batch_size must be at least 1".to_string()));
    }

    let all: Vec<usize> = (0..n).collect();
    let data = to_array(features, &all);

    match variant {
        KMeansVariant::Lloyd => {
            let model = KMeans::params_with_rng(k, StdRng::seed_from_u64(seed))
                .n_runs(n_init)
                .max_n_iterations(LLOYD_MAX_ITER)
                .tolerance(LLOYD_TOLERANCE)
                .fit(&DatasetBase::from(data.clone()))
                .map_err(fit_error)?;
            let labels: Array1<usize> = model.predict(&data);
            Ok(finish(features, model.centroids(), labels.to_vec()))
        }
        KMeansVariant::MiniBatch { batch_size } => {
            let mut best: Option<KMeansFit> = None;
            for restart in 0..n_init {
                let fit = mini_batch(features, &data, k, batch_size, seed.wrapping_add(restart as u64))?;
                debug!("k = {}, restart {}: inertia {:.6}", k, restart, fit.inertia);
                if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                    best = Some(fit);
                }
            }
            best.ok_or_else(|| ClusterError::InvalidConfiguration("no k-means restart ran".to_string()))
        }
    }
}

fn mini_batch(features: &DMatrix<f64>, data: &Array2<f64>, k: usize, batch_size: usize, seed: u64) -> Result<KMeansFit> {
    let n = features.nrows();
    let mut rng = StdRng::seed_from_u64(seed);
    let params = KMeans::params_with_rng(k, rng.clone())
        .tolerance(MINI_BATCH_TOLERANCE)
        .check()
        .map_err(fit_error)?;

    let mut model = None;
    for _ in 0..MINI_BATCH_MAX_ITER {
        let rows = index::sample(&mut rng, n, batch_size.min(n)).into_vec();
        let batch = DatasetBase::from(to_array(features, &rows));
        match params.fit_with(model.take(), &batch) {
            Ok(converged) => {
                model = Some(converged);
                break;
            }
            Err(IncrKMeansError::NotConverged(partial)) => model = Some(partial),
            Err(e) => return Err(fit_error(e)),
        }
    }

    let model = model.ok_or_else(|| ClusterError::InvalidConfiguration("no mini-batch update ran".to_string()))?;
    let labels: Array1<usize> = model.predict(data);
    Ok(finish(features, model.centroids(), labels.to_vec()))
}

/// Raises `k_min` to 2 and lowers `k_max` to `n`, describing every change made.
fn clamp_k_range(k_min: usize, k_max: usize, n: usize) -> (usize, usize, Vec<String>) {
    let mut adjustments = Vec::new();
    let mut range = (k_min, k_max);
    if k_min < 2 {
        adjustments.push(format!("k_min raised from {} to 2, at least 2 clusters are needed", k_min));
        range.0 = 2;
    }
    if k_max > n {
        adjustments.push(format!("k_max lowered from {} to {}, it cannot exceed the number of items", k_max, n));
        range.1 = n;
    }
    (range.0, range.1, adjustments)
}

/// Highest score wins, scanned in ascending k with a strict comparison.
fn best_candidate(evaluated: &[(usize, f64, Vec<i32>)]) -> Option<&(usize, f64, Vec<i32>)> {
    let mut best: Option<&(usize, f64, Vec<i32>)> = None;
    for candidate in evaluated {
        if best.map_or(true, |b| candidate.1 > b.1) {
            best = Some(candidate);
        }
    }
    best
}

/// Clusters `features` for every k in the range and keeps the k with the best silhouette.
///
/// # Arguments
///
/// * `features` - One row per item, typically passed through [`normalize_rows`] first.
/// * `params` - Candidate range, restarts, seed, update rule and workers.
///
/// # Description
///
/// The range is clamped to `[2, n]` with a warning. Candidates are independent and run in
/// parallel; a k whose clustering forms fewer than 2 clusters scores `-1`. Scores are
/// scanned in ascending k with a strict comparison, so ties go to the smallest k.
///
/// # Example
///
/// ```rust
/// # use nalgebra::DMatrix;
/// # use smcore::config::Workers;
/// # use smclust::cluster::kmeans::{select_best_k, KSelectionParams};
/// let x = DMatrix::from_row_slice(6, 2, &[0.0, 0.0, 0.1, 0.0, 0.0, 0.1, 5.0, 5.0, 5.1, 5.0, 5.0, 5.1]);
/// let params = KSelectionParams { k_min: 2, k_max: 4, workers: Workers::Sequential, ..Default::default() };
/// let selection = select_best_k(&x, &params).unwrap();
/// assert_eq!(selection.best_k, 2);
/// ```
pub fn select_best_k(features: &DMatrix<f64>, params: &KSelectionParams) -> Result<KSelection> {
    let n = features.nrows();
    if n < 2 {
        return Err(ClusterError::InvalidConfiguration(format!(
            "k selection needs at least 2 items, got {}",
            n
        )));
    }

    let (k_min, k_max, adjustments) = clamp_k_range(params.k_min, params.k_max, n);
    for adjustment in &adjustments {
        warn!("{}", adjustment);
    }
    if k_min > k_max {
        return Err(ClusterError::InvalidConfiguration(format!("empty k range [{}, {}]", k_min, k_max)));
    }

    let pairwise = euclidean_distances(features);
    let evaluate = |k: &usize| -> Result<(usize, f64, Vec<i32>)> {
        let fit = kmeans(features, *k, params.n_init, params.seed, params.variant)
            .map_err(|e| ClusterError::WorkerFailure { k: *k, source: Box::new(e) })?;
        let labels: Vec<i32> = fit.labels.iter().map(|l| *l as i32).collect();
        let score = silhouette_labels(&pairwise, &labels);
        info!("k = {}: silhouette {:.4}", k, score);
        Ok((*k, score, labels))
    };

    let candidates: Vec<usize> = (k_min..=k_max).collect();
    let evaluated: Vec<(usize, f64, Vec<i32>)> = match params.workers.thread_pool()? {
        Some(pool) => pool.install(|| candidates.par_iter().map(evaluate).collect::<Result<Vec<_>>>())?,
        None => candidates.iter().map(evaluate).collect::<Result<Vec<_>>>()?,
    };

    let (best_k, silhouette, labels) = best_candidate(&evaluated)
        .cloned()
        .ok_or_else(|| ClusterError::InvalidConfiguration("no candidate k was evaluated".to_string()))?;
    info!("best k = {} with silhouette {:.4}", best_k, silhouette);

    Ok(KSelection {
        k_min,
        k_max,
        scores: evaluated.iter().map(|(k, score, _)| (*k, *score)).collect(),
        best_k,
        partition: Partition::from_labels(labels),
        silhouette,
    })
}

impl ClusteringAdapter for KSelectionParams {
    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn cluster(&self, input: &ClusterInput) -> Result<ClusterOutcome> {
        let features = normalize_rows(input.features(self.name())?);
        let selection = select_best_k(&features, self)?;

        Ok(ClusterOutcome {
            algorithm: self.name(),
            parameters: json!({
                "k_min": selection.k_min,
                "k_max": selection.k_max,
                "best_k": selection.best_k,
                "n_init": self.n_init,
                "random_state": self.seed,
                "algorithm": self.variant,
            }),
            performance: json!({
                "silhouette_score": selection.silhouette,
                "scores": selection.scores,
            }),
            partition: selection.partition,
        })
    }
}
