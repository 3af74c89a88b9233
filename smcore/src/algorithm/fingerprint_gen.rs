use std::collections::BTreeSet;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::data::fingerprint::{BitFingerprint, Fingerprint};
use crate::data::smiles::MolecularGraph;
use crate::data::structure::StructureString;
use crate::error::{CoreError, Result};

/// Seed of every feature hash; changing it changes every fingerprint.
const HASH_SEED: u64 = 0;

/// Platform independent 64 bit hash of a byte slice.
pub fn feature_hash(bytes: &[u8]) -> u64 {
    xxh64(bytes, HASH_SEED)
}

fn hash_words(words: &[u64]) -> u64 {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    feature_hash(&bytes)
}

/// Turns a structure string into a fingerprint. Implementations must be pure.
pub trait FingerprintGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate(&self, structure: &StructureString) -> Result<Fingerprint>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintAlgorithm {
    /// Extended connectivity hashing of atom neighbourhoods, also known as Morgan.
    Circular,
    /// Hashed character n-grams of the structure string.
    Lingo,
}

impl FromStr for FingerprintAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "circular" | "morgan" | "ecfp" => Ok(FingerprintAlgorithm::Circular),
            "lingo" => Ok(FingerprintAlgorithm::Lingo),
            other => Err(CoreError::InvalidConfiguration(format!("unknown fingerprint algorithm '{}'", other))),
        }
    }
}

/// Fingerprint settings, stored verbatim in result records.
///
/// # Example
///
/// ```rust
/// # use smcore::algorithm::fingerprint_gen::{FingerprintAlgorithm, FingerprintConfig};
/// let config = FingerprintConfig::default();
/// assert_eq!(config.algorithm, FingerprintAlgorithm::Circular);
/// assert_eq!(config.length, 2048);
/// assert_eq!(config.radius, 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub algorithm: FingerprintAlgorithm,
    /// Number of bits (circular) or count buckets (lingo).
    pub length: usize,
    pub radius: usize,
    pub ngram: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        FingerprintConfig {
            algorithm: FingerprintAlgorithm::Circular,
            length: 2048,
            radius: 2,
            ngram: 3,
        }
    }
}

impl FingerprintConfig {
    pub fn generator(&self) -> Result<Box<dyn FingerprintGenerator>> {
        if self.length == 0 {
            return Err(CoreError::InvalidConfiguration("fingerprint length must be positive".to_string()));
        }
        match self.algorithm {
            FingerprintAlgorithm::Circular => Ok(Box::new(CircularFingerprint { radius: self.radius, length: self.length })),
            FingerprintAlgorithm::Lingo => {
                if self.ngram == 0 {
                    return Err(CoreError::InvalidConfiguration("lingo n-gram size must be positive".to_string()));
                }
                Ok(Box::new(LingoFingerprint { n: self.ngram, length: self.length }))
            }
        }
    }
}

/// Computes the fingerprint of one structure string.
pub fn compute_fingerprint(structure: &StructureString, config: &FingerprintConfig) -> Result<Fingerprint> {
    config.generator()?.generate(structure)
}

/// Computes fingerprints for many structures with one resolved generator.
pub fn compute_fingerprints(structures: &[StructureString], config: &FingerprintConfig) -> Result<Vec<Fingerprint>> {
    let generator = config.generator()?;
    structures.iter().map(|s| generator.generate(s)).collect()
}

#[derive(Clone, Copy, Debug)]
pub struct CircularFingerprint {
    pub radius: usize,
    pub length: usize,
}

impl CircularFingerprint {
    fn initial_identifiers(graph: &MolecularGraph) -> Vec<u64> {
        graph.atoms().iter()
            .enumerate()
            .map(|(i, atom)| {
                hash_words(&[
                    feature_hash(atom.element.as_bytes()),
                    graph.degree(i) as u64,
                    graph.total_hydrogens(i) as u64,
                    atom.charge as i64 as u64,
                    atom.isotope as u64,
                    atom.aromatic as u64,
                    graph.in_ring(i) as u64,
                ])
            })
            .collect()
    }

    /// All environment identifiers from radius 0 up to `self.radius`, deduplicated.
    pub fn identifiers(&self, graph: &MolecularGraph) -> BTreeSet<u64> {
        let mut current = Self::initial_identifiers(graph);
        let mut features: BTreeSet<u64> = current.iter().copied().collect();

        for iteration in 1..=self.radius {
            let next: Vec<u64> = (0..graph.atom_count())
                .map(|i| {
                    let mut words = vec![iteration as u64, current[i]];
                    let environment = graph.neighbors(i).iter()
                        .map(|(j, order)| (order.code(), current[*j]))
                        .sorted();
                    for (bond, neighbour) in environment {
                        words.push(bond);
                        words.push(neighbour);
                    }
                    hash_words(&words)
                })
                .collect();
            features.extend(next.iter().copied());
            current = next;
        }

        features
    }
}

impl FingerprintGenerator for CircularFingerprint {
    fn name(&self) -> &'static str {
        "circular"
    }

    fn generate(&self, structure: &StructureString) -> Result<Fingerprint> {
        let graph = MolecularGraph::parse(structure.as_str())?;
        let mut bits = BitFingerprint::zeros(self.length);
        for id in self.identifiers(&graph) {
            bits.set((id % self.length as u64) as usize);
        }
        Ok(Fingerprint::Binary(bits))
    }
}

/// Character n-grams of a string; strings shorter than `n` have none.
pub fn lingos(structure: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = structure.chars().collect();
    if n == 0 || chars.len() < n {
        return Vec::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

#[derive(Clone, Copy, Debug)]
pub struct LingoFingerprint {
    pub n: usize,
    pub length: usize,
}

impl FingerprintGenerator for LingoFingerprint {
    fn name(&self) -> &'static str {
        "lingo"
    }

    fn generate(&self, structure: &StructureString) -> Result<Fingerprint> {
        let mut counts = vec![0.0; self.length];
        for lingo in lingos(structure.as_str(), self.n) {
            counts[(feature_hash(lingo.as_bytes()) % self.length as u64) as usize] += 1.0;
        }
        Ok(Fingerprint::Count(counts))
    }
}
