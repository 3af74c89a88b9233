use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A fixed-length bit vector packed into 64 bit words.
///
/// Bits beyond `n_bits` in the last word are always zero, so word-wise
/// population counts never see padding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PackedBits")]
pub struct BitFingerprint {
    n_bits: usize,
    words: Vec<u64>,
}

/// Serialized form of a [`BitFingerprint`], checked before it becomes one.
#[derive(Deserialize)]
struct PackedBits {
    n_bits: usize,
    words: Vec<u64>,
}

impl TryFrom<PackedBits> for BitFingerprint {
    type Error = CoreError;

    fn try_from(packed: PackedBits) -> Result<Self> {
        let expected = packed.n_bits.div_ceil(64);
        if packed.words.len() != expected {
            return Err(CoreError::InputShape(format!(
                "{} bits need {} words, got {}",
                packed.n_bits,
                expected,
                packed.words.len()
            )));
        }
        let used = packed.n_bits % 64;
        if let (Some(last), true) = (packed.words.last(), used != 0) {
            if last >> used != 0 {
                return Err(CoreError::InputShape(format!(
                    "padding bits beyond bit {} are set",
                    packed.n_bits
                )));
            }
        }
        Ok(BitFingerprint { n_bits: packed.n_bits, words: packed.words })
    }
}

impl BitFingerprint {
    /// Creates an all-zero fingerprint of the given length.
    pub fn zeros(n_bits: usize) -> Self {
        BitFingerprint { n_bits, words: vec![0; n_bits.div_ceil(64)] }
    }

    /// Creates a fingerprint from the positions of its set bits.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use smcore::data::fingerprint::BitFingerprint;
    /// let fp = BitFingerprint::from_indices(16, &[1, 3, 3]).unwrap();
    /// assert_eq!(fp.count_ones(), 2);
    /// assert!(fp.get(3));
    /// ```
    pub fn from_indices(n_bits: usize, indices: &[usize]) -> Result<Self> {
        let mut fp = BitFingerprint::zeros(n_bits);
        for &index in indices {
            if index >= n_bits {
                return Err(CoreError::InputShape(format!(
                    "bit index {} out of range for a {} bit fingerprint",
                    index, n_bits
                )));
            }
            fp.set(index);
        }
        Ok(fp)
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        let mut fp = BitFingerprint::zeros(bits.len());
        for (index, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
            fp.set(index);
        }
        fp
    }

    /// Parses a text line of `0` and `1` characters, one per bit.
    pub fn from_bit_string(line: &str) -> Result<Self> {
        let line = line.trim();
        let mut fp = BitFingerprint::zeros(line.len());
        for (index, c) in line.chars().enumerate() {
            match c {
                '1' => fp.set(index),
                '0' => {}
                other => {
                    return Err(CoreError::InputShape(format!(
                        "unexpected character '{}' at position {} of a bit string",
                        other, index
                    )))
                }
            }
        }
        Ok(fp)
    }

    pub fn to_bit_string(&self) -> String {
        (0..self.n_bits).map(|i| if self.get(i) { '1' } else { '0' }).collect()
    }

    /// Sets the bit at `index`, indices past the end are ignored.
    pub(crate) fn set(&mut self, index: usize) {
        if index < self.n_bits {
            self.words[index / 64] |= 1u64 << (index % 64);
        }
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.n_bits && (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    pub fn len(&self) -> usize {
        self.n_bits
    }

    pub fn is_empty(&self) -> bool {
        self.n_bits == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Indices of set bits in ascending order.
    pub fn ones(&self) -> Vec<usize> {
        (0..self.n_bits).filter(|&i| self.get(i)).collect()
    }

    pub fn to_dense(&self) -> Vec<f64> {
        (0..self.n_bits).map(|i| if self.get(i) { 1.0 } else { 0.0 }).collect()
    }
}

/// A molecular fingerprint, either a bit vector or a vector of feature counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Fingerprint {
    Binary(BitFingerprint),
    Count(Vec<f64>),
}

impl Fingerprint {
    pub fn len(&self) -> usize {
        match self {
            Fingerprint::Binary(bits) => bits.len(),
            Fingerprint::Count(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dense numeric view, used when stacking fingerprints into a feature matrix.
    pub fn to_dense(&self) -> Vec<f64> {
        match self {
            Fingerprint::Binary(bits) => bits.to_dense(),
            Fingerprint::Count(values) => values.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_bits_stay_clear() {
        let mut fp = BitFingerprint::zeros(70);
        fp.set(69);
        fp.set(70);
        assert_eq!(fp.words().len(), 2);
        assert_eq!(fp.count_ones(), 1);
        assert_eq!(fp.ones(), vec![69]);
    }

    #[test]
    fn test_deserialization_checks_words() {
        let fp = BitFingerprint::from_indices(70, &[0, 69]).unwrap();
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(serde_json::from_str::<BitFingerprint>(&json).unwrap(), fp);

        let short = r#"{"n_bits": 130, "words": [1, 2]}"#;
        assert!(serde_json::from_str::<BitFingerprint>(short).is_err());
        let padded = r#"{"n_bits": 4, "words": [16]}"#;
        assert!(serde_json::from_str::<BitFingerprint>(padded).is_err());
    }

    #[test]
    fn test_out_of_range_index() {
        assert!(BitFingerprint::from_indices(8, &[8]).is_err());
    }

    #[test]
    fn test_bit_string() {
        let fp = BitFingerprint::from_bit_string("0110\n").unwrap();
        assert_eq!(fp.ones(), vec![1, 2]);
        assert_eq!(fp.to_bit_string(), "0110");
        assert!(BitFingerprint::from_bit_string("01x").is_err());
    }

    #[test]
    fn test_dense_view() {
        let fp = Fingerprint::Binary(BitFingerprint::from_bools(&[true, false, true]));
        assert_eq!(fp.to_dense(), vec![1.0, 0.0, 1.0]);
        assert_eq!(fp.len(), 3);
    }
}
