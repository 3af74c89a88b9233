//! Error types shared by every smcore operation.

use thiserror::Error;

/// Errors raised by spectra handling, distance computation and matrix I/O.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Co-indexed sequences disagree in length, or two inputs that must share a shape don't.
    #[error("input shape mismatch: {0}")]
    InputShape(String),

    /// Binned intensities cannot be scaled to [0, 1] because their maximum is not positive.
    #[error("degenerate normalization for spectrum '{id}': maximum binned intensity is {max}")]
    DegenerateNormalization { id: String, max: f64 },

    /// Unknown metric or algorithm name, or parameters outside their valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A distance function produced a value that can't be stored in a distance matrix.
    #[error("invalid distance {value} between items {i} and {j}")]
    InvalidDistance { i: usize, j: usize, value: f64 },

    /// A unit of work in a parallel batch failed; the whole batch is discarded.
    #[error("worker failed on pair ({i}, {j}): {source}")]
    WorkerFailure {
        i: usize,
        j: usize,
        #[source]
        source: Box<CoreError>,
    },

    /// A structure string could not be read as a molecular graph.
    #[error("invalid structure '{structure}': {message}")]
    InvalidStructure { structure: String, message: String },

    #[error("could not parse matrix value '{token}' on line {line}")]
    MatrixParse { line: usize, token: String },

    #[error("spectrum cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
