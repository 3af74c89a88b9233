use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};

/// Label given by density based clustering to items outside every cluster.
pub const NOISE: i32 = -1;

/// What to do with noise labels before a partition leaves the density adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoisePolicy {
    /// Noise items share the `NOISE` label.
    Shared,
    /// Every noise item becomes its own singleton cluster above the largest real label.
    #[default]
    Explode,
}

impl FromStr for NoisePolicy {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "shared" | "keep" => Ok(NoisePolicy::Shared),
            "explode" | "singleton" => Ok(NoisePolicy::Explode),
            other => Err(ClusterError::InvalidConfiguration(format!("unknown noise policy '{}'", other))),
        }
    }
}

/// One cluster label per item, indexed like the input matrix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    labels: Vec<i32>,
}

impl Partition {
    /// Wraps a label vector; only non-negative labels and `NOISE` are accepted.
    pub fn new(labels: Vec<i32>) -> Result<Self> {
        if let Some((i, label)) = labels.iter().enumerate().find(|(_, l)| **l < NOISE) {
            return Err(ClusterError::InputShape(format!("item {} carries invalid label {}", i, label)));
        }
        Ok(Partition { labels })
    }

    pub(crate) fn from_labels(labels: Vec<i32>) -> Self {
        Partition { labels }
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn label(&self, item: usize) -> i32 {
        self.labels[item]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Member lists per label, members in ascending item order.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use smclust::cluster::partition::Partition;
    /// let partition = Partition::new(vec![1, 0, 1, -1]).unwrap();
    /// let clusters = partition.clusters();
    /// assert_eq!(clusters[&1], vec![0, 2]);
    /// assert_eq!(clusters[&-1], vec![3]);
    /// ```
    pub fn clusters(&self) -> BTreeMap<i32, Vec<usize>> {
        let mut clusters: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (item, label) in self.labels.iter().enumerate() {
            clusters.entry(*label).or_default().push(item);
        }
        clusters
    }

    /// Number of distinct labels other than `NOISE`.
    pub fn n_clusters(&self) -> usize {
        self.clusters().keys().filter(|l| **l != NOISE).count()
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| **l == NOISE).count()
    }

    pub fn max_label(&self) -> Option<i32> {
        self.labels.iter().copied().filter(|l| *l != NOISE).max()
    }

    /// Gives every noise item its own label `max_label + 1 + k`, k counting noise items in
    /// item order.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use smclust::cluster::partition::Partition;
    /// let partition = Partition::new(vec![0, -1, 1, -1]).unwrap();
    /// assert_eq!(partition.explode_noise().labels(), &[0, 2, 1, 3]);
    /// ```
    pub fn explode_noise(&self) -> Partition {
        let first_free = self.max_label().map(|m| m + 1).unwrap_or(0);
        let labels = self.labels.iter()
            .scan(0, |noise_seen, label| {
                if *label == NOISE {
                    let exploded = first_free + *noise_seen;
                    *noise_seen += 1;
                    Some(exploded)
                } else {
                    Some(*label)
                }
            })
            .collect();
        Partition { labels }
    }

    pub fn apply(&self, policy: NoisePolicy) -> Partition {
        match policy {
            NoisePolicy::Shared => self.clone(),
            NoisePolicy::Explode => self.explode_noise(),
        }
    }

    /// Renumbers labels to `0..k` in order of first appearance, noise is kept.
    pub fn relabel_by_first_member(&self) -> Partition {
        let mut mapping: BTreeMap<i32, i32> = BTreeMap::new();
        let labels = self.labels.iter()
            .map(|label| {
                if *label == NOISE {
                    return NOISE;
                }
                let next = mapping.len() as i32;
                *mapping.entry(*label).or_insert(next)
            })
            .collect();
        Partition { labels }
    }
}
