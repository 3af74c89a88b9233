// src/lib.rs
pub mod error;

pub mod cluster {
    pub mod partition;
    pub mod quality;
    pub mod adapter;
    pub mod hac;
    pub mod density;
    pub mod kmeans;
}

pub mod compare {
    pub mod scores;
    pub mod layout;
}

pub mod io;

pub use error::{ClusterError, Result};
