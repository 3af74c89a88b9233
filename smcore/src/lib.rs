pub mod error;
pub mod config;
pub mod cache;

// data module
pub mod data {
    pub mod spectrum;
    pub mod structure;
    pub mod fingerprint;
    pub mod distance_matrix;
    pub mod smiles;
}

// algorithm module
pub mod algorithm {
    pub mod filter;
    pub mod binning;
    pub mod spectral_distance;
    pub mod fingerprint_distance;
    pub mod fingerprint_gen;
}

// pairwise matrix construction and serialization
pub mod matrix {
    pub mod builder;
    pub mod codec;
}

pub use error::{CoreError, Result};
