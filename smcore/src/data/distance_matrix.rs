use nalgebra::DMatrix;

use crate::error::{CoreError, Result};

/// Largest difference between `D[i][j]` and `D[j][i]` accepted as rounding noise.
const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// A square, symmetric, non-negative matrix with a zero diagonal.
///
/// Row and column `i` correspond to the `i`-th input item. The matrix is never
/// mutated after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    values: DMatrix<f64>,
}

impl DistanceMatrix {
    /// The `n x n` all-zero matrix.
    pub fn zeros(n: usize) -> Self {
        DistanceMatrix { values: DMatrix::zeros(n, n) }
    }

    /// Wraps a dense matrix after checking every distance matrix invariant.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use nalgebra::DMatrix;
    /// # use smcore::data::distance_matrix::DistanceMatrix;
    /// let m = DMatrix::from_row_slice(2, 2, &[0.0, 0.5, 0.5, 0.0]);
    /// let dm = DistanceMatrix::from_dmatrix(m).unwrap();
    /// assert_eq!(dm.get(1, 0), 0.5);
    /// ```
    pub fn from_dmatrix(values: DMatrix<f64>) -> Result<Self> {
        if values.nrows() != values.ncols() {
            return Err(CoreError::InputShape(format!(
                "distance matrix must be square, got {}x{}",
                values.nrows(),
                values.ncols()
            )));
        }
        let n = values.nrows();
        for i in 0..n {
            if values[(i, i)] != 0.0 {
                return Err(CoreError::InvalidDistance { i, j: i, value: values[(i, i)] });
            }
            for j in (i + 1)..n {
                let value = values[(i, j)];
                if !value.is_finite() || value < 0.0 {
                    return Err(CoreError::InvalidDistance { i, j, value });
                }
                if (value - values[(j, i)]).abs() > SYMMETRY_TOLERANCE {
                    return Err(CoreError::InputShape(format!(
                        "distance matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }

        // the upper triangle is authoritative, so the stored matrix is exactly symmetric
        let mut values = values;
        for i in 0..n {
            for j in (i + 1)..n {
                values[(j, i)] = values[(i, j)];
            }
        }
        Ok(DistanceMatrix { values })
    }

    /// Converts a similarity matrix into distances with `1 - s` and a zero diagonal.
    pub fn from_similarity(similarity: &DMatrix<f64>) -> Result<Self> {
        let n = similarity.nrows();
        let values = DMatrix::from_fn(n, similarity.ncols(), |i, j| {
            if i == j { 0.0 } else { 1.0 - similarity[(i, j)] }
        });
        DistanceMatrix::from_dmatrix(values)
    }

    /// Built by the pairwise builder and the codec, which uphold the invariants themselves.
    pub(crate) fn from_trusted(values: DMatrix<f64>) -> Self {
        DistanceMatrix { values }
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[(i, j)]
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.values.row(i).iter().copied().collect()
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// The strictly upper triangle in row-major order, `n (n - 1) / 2` values.
    pub fn to_condensed(&self) -> Vec<f64> {
        let n = self.len();
        let mut condensed = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                condensed.push(self.values[(i, j)]);
            }
        }
        condensed
    }
}
