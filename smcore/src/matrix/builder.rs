use itertools::Itertools;
use log::info;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::config::Workers;
use crate::data::distance_matrix::DistanceMatrix;
use crate::error::{CoreError, Result};

/// Builds the symmetric distance matrix of `items` under `distance`.
///
/// # Arguments
///
/// * `items` - The items, row `i` of the result belongs to `items[i]`.
/// * `distance` - A pure function of two items returning a non-negative finite distance.
/// * `workers` - Number of threads the pair list is spread over.
///
/// # Description
///
/// Only the pairs `i < j` are evaluated, each result is written to both `(i, j)` and `(j, i)`
/// and the diagonal stays zero. Every pair owns its own two cells, so the result does not depend
/// on the worker count or on completion order. The first failing pair aborts the whole batch.
///
/// # Example
///
/// ```rust
/// # use smcore::config::Workers;
/// # use smcore::matrix::builder::build_distance_matrix;
/// let values = vec![0.0_f64, 1.0, 3.0];
/// let m = build_distance_matrix(&values, |a, b| Ok((a - b).abs()), Workers::Fixed(2)).unwrap();
/// assert_eq!(m.get(0, 2), 3.0);
/// assert_eq!(m.get(2, 1), 2.0);
/// ```
pub fn build_distance_matrix<T, F>(items: &[T], distance: F, workers: Workers) -> Result<DistanceMatrix>
where
    T: Sync,
    F: Fn(&T, &T) -> Result<f64> + Sync,
{
    let n = items.len();
    let pairs: Vec<(usize, usize)> = (0..n).tuple_combinations().collect();
    let num_threads = workers.count()?;

    info!("computing {} pairwise distances between {} items on {} worker(s)", pairs.len(), n, num_threads);

    let evaluate = |&(i, j): &(usize, usize)| -> Result<(usize, usize, f64)> {
        let value = distance(&items[i], &items[j])
            .map_err(|e| CoreError::WorkerFailure { i, j, source: Box::new(e) })?;
        if !value.is_finite() || value < 0.0 {
            return Err(CoreError::InvalidDistance { i, j, value });
        }
        Ok((i, j, value))
    };

    let results: Vec<(usize, usize, f64)> = match workers.thread_pool()? {
        Some(pool) => pool.install(|| pairs.par_iter().map(evaluate).collect::<Result<Vec<_>>>())?,
        None => pairs.iter().map(evaluate).collect::<Result<Vec<_>>>()?,
    };

    let mut values = DMatrix::zeros(n, n);
    for (i, j, value) in results {
        values[(i, j)] = value;
        values[(j, i)] = value;
    }

    info!("distance matrix of size {} complete", n);
    Ok(DistanceMatrix::from_trusted(values))
}
