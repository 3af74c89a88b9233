use smcore::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Two partitions, or a partition and its input, disagree on the number of items.
    #[error("input shape mismatch: {0}")]
    InputShape(String),

    /// Unknown strategy name, empty k range or too few samples to cluster.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The k-means backend rejected its parameters or failed to fit.
    #[error("k-means failed: {0}")]
    KMeans(String),

    /// A candidate in a parallel k scan failed; no partial scores are kept.
    #[error("clustering worker failed for k = {k}: {source}")]
    WorkerFailure {
        k: usize,
        #[source]
        source: Box<ClusterError>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
