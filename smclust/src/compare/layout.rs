use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::cluster::partition::Partition;
use crate::error::{ClusterError, Result};

/// Side of the square cell every cluster of the first partition is drawn in.
pub const CELL_SIZE: f64 = 10.0;

pub const MARKERS: [&str; 10] = ["o", "v", "^", "<", ">", "s", "p", "*", "h", "D"];

pub const COLORS: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd",
    "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

const UNASSIGNED_MARKER: &str = "x";
const UNASSIGNED_COLOR: &str = "#c7c7c7";

/// Marker shape and colour of one point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointStyle {
    pub marker: String,
    pub color: String,
}

impl PointStyle {
    /// Style of cluster `label`: marker `label % 10`, colour `label / 10`, the colours
    /// cycling once every palette entry has been used.
    pub fn for_cluster(label: usize) -> Self {
        PointStyle {
            marker: MARKERS[label % MARKERS.len()].to_string(),
            color: COLORS[(label / MARKERS.len()) % COLORS.len()].to_string(),
        }
    }

    /// Style of a label of the second partition, noise included.
    pub fn for_label(label: i32) -> Self {
        match usize::try_from(label) {
            Ok(label) => PointStyle::for_cluster(label),
            Err(_) => PointStyle::unassigned(),
        }
    }

    pub fn unassigned() -> Self {
        PointStyle { marker: UNASSIGNED_MARKER.to_string(), color: UNASSIGNED_COLOR.to_string() }
    }
}

/// Lower left corner of the cell of one cluster of the first partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellCentroid {
    pub label: i32,
    pub x: f64,
    pub y: f64,
    pub members: usize,
}

/// Coordinates and styles for drawing two partitions of the same items on top of each other.
///
/// `points[i]` and `styles[i]` belong to item `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonLayout {
    pub centroids: Vec<CellCentroid>,
    pub points: Vec<(f64, f64)>,
    pub styles: Vec<PointStyle>,
    /// Marker size that keeps the points of the most crowded cell apart.
    pub marker_size: f64,
}

/// Places the clusters of `a` on a square grid of cells and the members of each cluster on a
/// square sub-grid inside its cell, members ordered by their label in `b`.
///
/// # Arguments
///
/// * `a` - Partition that decides the cells.
/// * `b` - Partition that decides marker and colour, and the order inside each cell.
///
/// # Description
///
/// With `c` clusters in `a` the grid has `ceil(sqrt(c))` rows; cluster `i` (ascending label)
/// sits at `((i / rows) * CELL_SIZE, (i % rows) * CELL_SIZE)`. A cell holding `m` members uses
/// a sub-grid of `ceil(sqrt(m))` rows with step `(CELL_SIZE - 1) / ceil(sqrt(m))`, offset by 1
/// from the cell corner. A point's marker is `MARKERS[label % 10]` and its colour
/// `COLORS[label / 10]` for its label in `b`; noise in `b` gets the unassigned style.
///
/// # Example
///
/// ```rust
/// # use smclust::cluster::partition::Partition;
/// # use smclust::compare::layout::compare;
/// let a = Partition::new(vec![0, 0, 1, 1]).unwrap();
/// let b = Partition::new(vec![1, 0, 0, 0]).unwrap();
/// let layout = compare(&a, &b).unwrap();
/// assert_eq!(layout.centroids.len(), 2);
/// // item 1 comes first inside cell 0 because its label in `b` is smaller
/// assert_eq!(layout.points[1], (1.0, 1.0));
/// ```
pub fn compare(a: &Partition, b: &Partition) -> Result<ComparisonLayout> {
    if a.len() != b.len() {
        return Err(ClusterError::InputShape(format!(
            "cannot compare partitions of {} and {} items",
            a.len(),
            b.len()
        )));
    }

    let styles: Vec<PointStyle> = b.labels().iter().map(|label| PointStyle::for_label(*label)).collect();

    let cells = a.clusters();
    let rows = (cells.len() as f64).sqrt().ceil().max(1.0) as usize;
    let mut centroids = Vec::with_capacity(cells.len());
    let mut points = vec![(0.0, 0.0); a.len()];
    let mut densest = 1usize;

    for (index, (label, members)) in cells.into_iter().enumerate() {
        let cx = (index / rows) as f64 * CELL_SIZE;
        let cy = (index % rows) as f64 * CELL_SIZE;
        centroids.push(CellCentroid { label, x: cx, y: cy, members: members.len() });

        let inner = (members.len() as f64).sqrt().ceil().max(1.0) as usize;
        let step = (CELL_SIZE - 1.0) / inner as f64;
        densest = densest.max(inner);

        for (j, item) in members.into_iter().sorted_by_key(|item| b.label(*item)).enumerate() {
            points[item] = (cx + 1.0 + (j / inner) as f64 * step, cy + 1.0 + (j % inner) as f64 * step);
        }
    }

    Ok(ComparisonLayout {
        centroids,
        points,
        styles,
        marker_size: CELL_SIZE / densest as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_points_stay_inside_their_cell() {
        let a = Partition::new((0..50).map(|i| (i % 7) as i32).collect()).unwrap();
        let b = Partition::new((0..50).map(|i| ((i * 3) % 11) as i32 - 1).collect()).unwrap();
        let layout = compare(&a, &b).unwrap();
        assert_eq!(layout.centroids.len(), 7);

        let by_label: BTreeMap<i32, &CellCentroid> = layout.centroids.iter().map(|c| (c.label, c)).collect();
        for (item, (x, y)) in layout.points.iter().enumerate() {
            let cell = by_label[&a.label(item)];
            assert!(*x >= cell.x + 1.0 && *x < cell.x + CELL_SIZE, "item {} x {}", item, x);
            assert!(*y >= cell.y + 1.0 && *y < cell.y + CELL_SIZE, "item {} y {}", item, y);
        }
    }

    #[test]
    fn test_cells_on_square_grid() {
        let a = Partition::new(vec![0, 1, 2, 3, 4]).unwrap();
        let layout = compare(&a, &a).unwrap();
        let corners: Vec<(f64, f64)> = layout.centroids.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(corners, vec![(0.0, 0.0), (0.0, 10.0), (0.0, 20.0), (10.0, 0.0), (10.0, 10.0)]);
    }

    #[test]
    fn test_members_sorted_by_second_partition() {
        let a = Partition::new(vec![0, 0, 0, 0]).unwrap();
        let b = Partition::new(vec![3, 1, 2, 0]).unwrap();
        let layout = compare(&a, &b).unwrap();
        // two by two sub-grid with step 4.5, filled column by column
        assert_eq!(layout.points[3], (1.0, 1.0));
        assert_eq!(layout.points[1], (1.0, 5.5));
        assert_eq!(layout.points[2], (5.5, 1.0));
        assert_eq!(layout.points[0], (5.5, 5.5));
        assert_eq!(layout.marker_size, 5.0);
    }

    #[test]
    fn test_styles() {
        assert_eq!(PointStyle::for_cluster(0), PointStyle { marker: "o".to_string(), color: "#1f77b4".to_string() });
        assert_eq!(PointStyle::for_cluster(12).marker, "^");
        assert_eq!(PointStyle::for_cluster(12).color, "#ff7f0e");

        let a = Partition::new(vec![0, 0, 1]).unwrap();
        let b = Partition::new(vec![-1, 4, 4]).unwrap();
        let layout = compare(&a, &b).unwrap();
        assert_eq!(layout.styles[0], PointStyle::unassigned());
        assert_eq!(layout.styles[1], PointStyle::for_cluster(4));
        assert_eq!(layout.styles[1], layout.styles[2]);
    }

    #[test]
    fn test_styles_follow_raw_labels() {
        let a = Partition::new(vec![0, 0, 0, 0]).unwrap();
        let b = Partition::new(vec![5, 9, 23, -1]).unwrap();
        let layout = compare(&a, &b).unwrap();
        assert_eq!(layout.styles[0].marker, MARKERS[5]);
        assert_eq!(layout.styles[0].color, COLORS[0]);
        assert_eq!(layout.styles[1].marker, MARKERS[9]);
        assert_eq!(layout.styles[2], PointStyle { marker: MARKERS[3].to_string(), color: COLORS[2].to_string() });
        assert_eq!(layout.styles[3], PointStyle::unassigned());
    }

    #[test]
    fn test_size_mismatch() {
        let a = Partition::new(vec![0, 1]).unwrap();
        let b = Partition::new(vec![0]).unwrap();
        assert!(matches!(compare(&a, &b), Err(ClusterError::InputShape(_))));
    }
}
