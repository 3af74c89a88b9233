//! Hierarchical density based clustering (HDBSCAN) of a precomputed distance matrix.
//!
//! The pipeline follows the usual construction: core distances, a minimum spanning tree
//! under mutual reachability, the single-linkage hierarchy, the condensed tree for a
//! minimum cluster size and an excess-of-mass selection of flat clusters. The root of the
//! hierarchy is never selected, items outside every selected cluster are labelled `NOISE`.

use std::collections::{BTreeMap, VecDeque};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smcore::data::distance_matrix::DistanceMatrix;

use crate::cluster::adapter::{ClusterInput, ClusterOutcome, ClusteringAdapter};
use crate::cluster::partition::{NoisePolicy, Partition, NOISE};
use crate::error::{ClusterError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityParams {
    /// Smallest group of items reported as a cluster (default: 5)
    pub min_cluster_size: usize,
    /// Neighbourhood size of the core distance, `min_cluster_size` when unset
    pub min_samples: Option<usize>,
    /// Treatment of noise items in the returned partition (default: explode)
    pub noise_policy: NoisePolicy,
}

impl Default for DensityParams {
    fn default() -> Self {
        DensityParams {
            min_cluster_size: 5,
            min_samples: None,
            noise_policy: NoisePolicy::default(),
        }
    }
}

impl DensityParams {
    fn validate(&self) -> Result<()> {
        if self.min_cluster_size < 2 {
            return Err(ClusterError::InvalidConfiguration(format!(
                "min_cluster_size must be at least 2, got {}",
                self.min_cluster_size
            )));
        }
        if self.min_samples == Some(0) {
            return Err(ClusterError::InvalidConfiguration("min_samples must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    a: usize,
    b: usize,
    distance: f64,
}

/// Merge of two nodes of the single-linkage hierarchy. Items are nodes `0..n`, the merge at
/// position `m` creates node `n + m`.
#[derive(Clone, Copy, Debug)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

/// Edge of the condensed tree: `child` leaves cluster `parent` at density `lambda`.
#[derive(Clone, Copy, Debug)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
    next: usize,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        let total = 2 * n - 1;
        UnionFind {
            parent: (0..total).collect(),
            size: (0..total).map(|i| if i < n { 1 } else { 0 }).collect(),
            next: n,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let up = self.parent[x];
            self.parent[x] = root;
            x = up;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let node = self.next;
        self.parent[a] = node;
        self.parent[b] = node;
        self.size[node] = self.size[a] + self.size[b];
        self.next += 1;
        node
    }
}

/// Runs HDBSCAN and returns the raw labels, `NOISE` included.
///
/// # Arguments
///
/// * `distances` - Symmetric item distances.
/// * `params` - Minimum cluster size and core neighbourhood; `noise_policy` is not applied here.
///
/// # Description
///
/// The core distance of an item is its distance to the `min_samples`-th nearest other
/// item (capped at `n - 1`). Labels are numbered in order of the selected clusters' position
/// in the condensed tree, which only depends on the matrix.
pub fn hdbscan(distances: &DistanceMatrix, params: &DensityParams) -> Result<Partition> {
    params.validate()?;
    let n = distances.len();
    if n < 2 {
        return Err(ClusterError::InvalidConfiguration(format!("hdbscan needs at least 2 items, got {}", n)));
    }
    let min_samples = params.min_samples.unwrap_or(params.min_cluster_size).min(n - 1);

    let core = core_distances(distances, min_samples);
    let mst = mutual_reachability_mst(distances, &core);
    let hierarchy = single_linkage(&mst, n);
    let condensed = condense(&hierarchy, n, params.min_cluster_size);
    let selected = select_clusters(&condensed, n);
    debug!("hdbscan selected {} of {} condensed clusters", selected.len(), cluster_count(&condensed, n));

    let mut labels = vec![NOISE; n];
    let children = children_of(&condensed);
    for (label, cluster) in selected.iter().enumerate() {
        for item in leaves_below(*cluster, &children, n) {
            labels[item] = label as i32;
        }
    }
    Ok(Partition::from_labels(labels))
}

fn core_distances(distances: &DistanceMatrix, min_samples: usize) -> Vec<f64> {
    (0..distances.len())
        .map(|i| {
            let mut row = distances.row(i);
            row.sort_by(|a, b| a.total_cmp(b));
            row[min_samples]
        })
        .collect()
}

/// Prim's algorithm over the dense mutual reachability graph, edges sorted by weight.
fn mutual_reachability_mst(distances: &DistanceMatrix, core: &[f64]) -> Vec<Edge> {
    let n = distances.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut best_from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    let mut current = 0;
    in_tree[current] = true;
    for _ in 1..n {
        let mut next = None;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = core[current].max(core[j]).max(distances.get(current, j));
            if reach < best[j] {
                best[j] = reach;
                best_from[j] = current;
            }
            if next.map_or(true, |k: usize| best[j] < best[k]) {
                next = Some(j);
            }
        }
        let Some(j) = next else { break };
        edges.push(Edge { a: best_from[j], b: j, distance: best[j] });
        in_tree[j] = true;
        current = j;
    }

    edges.sort_by(|x, y| x.distance.total_cmp(&y.distance));
    edges
}

fn single_linkage(mst: &[Edge], n: usize) -> Vec<Merge> {
    let mut forest = UnionFind::new(n);
    mst.iter()
        .map(|edge| {
            let left = forest.find(edge.a);
            let right = forest.find(edge.b);
            let node = forest.union(left, right);
            Merge { left, right, distance: edge.distance, size: forest.size[node] }
        })
        .collect()
}

fn lambda(distance: f64) -> f64 {
    1.0 / distance.max(f64::MIN_POSITIVE)
}

/// Walks the hierarchy from the root; splits into two parts of at least `min_cluster_size`
/// items create new clusters, smaller parts fall out of their parent as single items.
fn condense(hierarchy: &[Merge], n: usize, min_cluster_size: usize) -> Vec<CondensedEdge> {
    let root = 2 * n - 2;
    let size_of = |node: usize| if node < n { 1 } else { hierarchy[node - n].size };

    let mut relabel = vec![0usize; root + 1];
    relabel[root] = n;
    let mut next_cluster = n + 1;
    let mut done = vec![false; root + 1];
    let mut condensed = Vec::new();

    for node in breadth_first(hierarchy, root, n) {
        if node < n || done[node] {
            continue;
        }
        let merge = hierarchy[node - n];
        let parent = relabel[node];
        let density = lambda(merge.distance);
        let left_big = size_of(merge.left) >= min_cluster_size;
        let right_big = size_of(merge.right) >= min_cluster_size;

        match (left_big, right_big) {
            (true, true) => {
                for child in [merge.left, merge.right] {
                    relabel[child] = next_cluster;
                    condensed.push(CondensedEdge { parent, child: next_cluster, lambda: density, size: size_of(child) });
                    next_cluster += 1;
                }
            }
            (true, false) => {
                relabel[merge.left] = parent;
                fall_out(hierarchy, merge.right, parent, density, n, &mut done, &mut condensed);
            }
            (false, true) => {
                relabel[merge.right] = parent;
                fall_out(hierarchy, merge.left, parent, density, n, &mut done, &mut condensed);
            }
            (false, false) => {
                fall_out(hierarchy, merge.left, parent, density, n, &mut done, &mut condensed);
                fall_out(hierarchy, merge.right, parent, density, n, &mut done, &mut condensed);
            }
        }
    }
    condensed
}

fn fall_out(
    hierarchy: &[Merge],
    node: usize,
    parent: usize,
    density: f64,
    n: usize,
    done: &mut [bool],
    condensed: &mut Vec<CondensedEdge>,
) {
    for descendant in breadth_first(hierarchy, node, n) {
        if descendant < n {
            condensed.push(CondensedEdge { parent, child: descendant, lambda: density, size: 1 });
        }
        done[descendant] = true;
    }
}

fn breadth_first(hierarchy: &[Merge], root: usize, n: usize) -> Vec<usize> {
    let mut queue = VecDeque::from([root]);
    let mut order = Vec::new();
    while let Some(node) = queue.pop_front() {
        order.push(node);
        if node >= n {
            let merge = hierarchy[node - n];
            queue.push_back(merge.left);
            queue.push_back(merge.right);
        }
    }
    order
}

fn cluster_count(condensed: &[CondensedEdge], n: usize) -> usize {
    condensed.iter().filter(|e| e.child >= n).count()
}

fn children_of(condensed: &[CondensedEdge]) -> BTreeMap<usize, Vec<CondensedEdge>> {
    let mut children: BTreeMap<usize, Vec<CondensedEdge>> = BTreeMap::new();
    for edge in condensed {
        children.entry(edge.parent).or_default().push(*edge);
    }
    children
}

/// Excess of mass selection. A cluster is kept unless its child clusters are together
/// strictly more stable; the root is never a candidate. Returns cluster ids in ascending order.
fn select_clusters(condensed: &[CondensedEdge], n: usize) -> Vec<usize> {
    let children = children_of(condensed);
    let birth: BTreeMap<usize, f64> = condensed.iter()
        .filter(|e| e.child >= n)
        .map(|e| (e.child, e.lambda))
        .collect();

    let mut stability: BTreeMap<usize, f64> = birth.iter()
        .map(|(cluster, born)| {
            let mass = children.get(cluster)
                .map(|edges| edges.iter().map(|e| (e.lambda - born) * e.size as f64).sum::<f64>())
                .unwrap_or(0.0);
            (*cluster, mass)
        })
        .collect();

    let mut selected: BTreeMap<usize, bool> = birth.keys().map(|c| (*c, true)).collect();
    let candidates: Vec<usize> = birth.keys().rev().copied().collect();
    for cluster in candidates {
        let child_clusters: Vec<usize> = children.get(&cluster)
            .map(|edges| edges.iter().filter(|e| e.child >= n).map(|e| e.child).collect())
            .unwrap_or_default();
        let subtree: f64 = child_clusters.iter().map(|c| stability[c]).sum();

        if !child_clusters.is_empty() && subtree > stability[&cluster] {
            selected.insert(cluster, false);
            stability.insert(cluster, subtree);
        } else {
            let mut queue: VecDeque<usize> = child_clusters.into_iter().collect();
            while let Some(descendant) = queue.pop_front() {
                selected.insert(descendant, false);
                if let Some(edges) = children.get(&descendant) {
                    queue.extend(edges.iter().filter(|e| e.child >= n).map(|e| e.child));
                }
            }
        }
    }

    selected.into_iter().filter(|(_, keep)| *keep).map(|(c, _)| c).collect()
}

fn leaves_below(cluster: usize, children: &BTreeMap<usize, Vec<CondensedEdge>>, n: usize) -> Vec<usize> {
    let mut queue = VecDeque::from([cluster]);
    let mut items = Vec::new();
    while let Some(node) = queue.pop_front() {
        for edge in children.get(&node).into_iter().flatten() {
            if edge.child < n {
                items.push(edge.child);
            } else {
                queue.push_back(edge.child);
            }
        }
    }
    items
}

impl ClusteringAdapter for DensityParams {
    fn name(&self) -> &'static str {
        "hdbscan"
    }

    fn cluster(&self, input: &ClusterInput) -> Result<ClusterOutcome> {
        let distances = input.distances(self.name())?;
        let raw = hdbscan(distances, self)?;
        let max_label = raw.max_label().unwrap_or(NOISE);
        let noise_count = raw.noise_count();
        info!(
            "hdbscan found {} clusters and {} noise items among {} items",
            raw.n_clusters(),
            noise_count,
            raw.len()
        );

        Ok(ClusterOutcome {
            algorithm: self.name(),
            partition: raw.apply(self.noise_policy),
            parameters: serde_json::to_value(self)?,
            performance: json!({ "max_label": max_label, "noise_count": noise_count }),
        })
    }
}
