use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smcore::data::distance_matrix::DistanceMatrix;

use crate::cluster::density::DensityParams;
use crate::cluster::hac::HacParams;
use crate::cluster::kmeans::KSelectionParams;
use crate::cluster::partition::Partition;
use crate::error::{ClusterError, Result};

/// What a clustering algorithm is run on.
#[derive(Clone, Copy, Debug)]
pub enum ClusterInput<'a> {
    /// Precomputed symmetric distances between items.
    Distances(&'a DistanceMatrix),
    /// One feature row per item.
    Features(&'a DMatrix<f64>),
}

impl<'a> ClusterInput<'a> {
    pub fn len(&self) -> usize {
        match self {
            ClusterInput::Distances(m) => m.len(),
            ClusterInput::Features(f) => f.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The distance matrix, or an error naming `algorithm` when features were given.
    pub fn distances(&self, algorithm: &str) -> Result<&'a DistanceMatrix> {
        match *self {
            ClusterInput::Distances(m) => Ok(m),
            ClusterInput::Features(_) => Err(ClusterError::InvalidConfiguration(format!(
                "{} clusters a precomputed distance matrix, got a feature matrix",
                algorithm
            ))),
        }
    }

    /// The feature matrix, or an error naming `algorithm` when distances were given.
    pub fn features(&self, algorithm: &str) -> Result<&'a DMatrix<f64>> {
        match *self {
            ClusterInput::Features(f) => Ok(f),
            ClusterInput::Distances(_) => Err(ClusterError::InvalidConfiguration(format!(
                "{} clusters a feature matrix, got a precomputed distance matrix",
                algorithm
            ))),
        }
    }
}

/// Partition plus the sections that end up in a result record.
#[derive(Clone, Debug)]
pub struct ClusterOutcome {
    pub algorithm: &'static str,
    pub partition: Partition,
    pub parameters: Value,
    pub performance: Value,
}

/// A clustering algorithm over a distance or feature matrix.
pub trait ClusteringAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Clusters every item of `input`; the partition has exactly `input.len()` labels.
    fn cluster(&self, input: &ClusterInput) -> Result<ClusterOutcome>;
}

/// The clustering algorithms, selected once by name.
///
/// # Example
///
/// ```rust
/// # use smclust::cluster::adapter::{ClusteringAdapter, ClusteringStrategy};
/// let strategy: ClusteringStrategy = "hdbscan".parse().unwrap();
/// assert_eq!(strategy.name(), "hdbscan");
/// assert!("spectral".parse::<ClusteringStrategy>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClusteringStrategy {
    Hierarchical(HacParams),
    Density(DensityParams),
    Partitional(KSelectionParams),
}

impl ClusteringStrategy {
    fn adapter(&self) -> &dyn ClusteringAdapter {
        match self {
            ClusteringStrategy::Hierarchical(params) => params,
            ClusteringStrategy::Density(params) => params,
            ClusteringStrategy::Partitional(params) => params,
        }
    }
}

impl FromStr for ClusteringStrategy {
    type Err = ClusterError;

    /// Strategy with default parameters.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hac" | "hierarchical" => Ok(ClusteringStrategy::Hierarchical(HacParams::default())),
            "hdbscan" | "density" => Ok(ClusteringStrategy::Density(DensityParams::default())),
            "kmeans" | "partitional" => Ok(ClusteringStrategy::Partitional(KSelectionParams::default())),
            other => Err(ClusterError::InvalidConfiguration(format!("unknown clustering algorithm '{}'", other))),
        }
    }
}

impl ClusteringAdapter for ClusteringStrategy {
    fn name(&self) -> &'static str {
        self.adapter().name()
    }

    fn cluster(&self, input: &ClusterInput) -> Result<ClusterOutcome> {
        if input.len() < 2 {
            return Err(ClusterError::InvalidConfiguration(format!(
                "{} needs at least 2 items, got {}",
                self.name(),
                input.len()
            )));
        }
        let outcome = self.adapter().cluster(input)?;
        if outcome.partition.len() != input.len() {
            return Err(ClusterError::InputShape(format!(
                "{} labelled {} of {} items",
                self.name(),
                outcome.partition.len(),
                input.len()
            )));
        }
        Ok(outcome)
    }
}
