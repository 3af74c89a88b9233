use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Metadata key holding the structure string of the measured compound.
pub const STRUCTURE_KEY: &str = "smiles";
/// Metadata key holding the compound name.
pub const COMPOUND_NAME_KEY: &str = "compound_name";

/// The grid a binned spectrum lives on.
///
/// # Description
///
/// Binned spectra store bin indices on their m/z axis. Two binned spectra can only be
/// merged peak by peak when they were produced with the same `BinGrid`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct BinGrid {
    pub bin_width: f64,
    pub origin_offset: f64,
}

impl BinGrid {
    /// Lower m/z edge of the bin with the given index.
    pub fn lower_edge(&self, bin_index: f64) -> f64 {
        self.origin_offset + bin_index * self.bin_width
    }
}

/// A fragmentation spectrum with its identity and metadata.
///
/// m/z values are kept in ascending order, ties keep their input order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Spectrum {
    id: String,
    mz: Vec<f64>,
    intensity: Vec<f64>,
    metadata: BTreeMap<String, String>,
    binning: Option<BinGrid>,
}

impl Spectrum {
    /// Constructs a new `Spectrum`.
    ///
    /// # Arguments
    ///
    /// * `id` - Opaque identity of the spectrum.
    /// * `mz` - A vector of m/z values.
    /// * `intensity` - A vector of intensity values corresponding to the m/z values.
    ///
    /// # Errors
    ///
    /// Fails with `InputShape` if the vectors differ in length or an m/z value is not finite.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use smcore::data::spectrum::Spectrum;
    /// let spectrum = Spectrum::new("s1", vec![200.0, 100.0], vec![20.0, 10.0]).unwrap();
    /// assert_eq!(spectrum.mz(), &[100.0, 200.0]);
    /// assert_eq!(spectrum.intensity(), &[10.0, 20.0]);
    /// ```
    pub fn new(id: impl Into<String>, mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        let id = id.into();
        if mz.len() != intensity.len() {
            return Err(CoreError::InputShape(format!(
                "spectrum '{}' has {} m/z values but {} intensities",
                id,
                mz.len(),
                intensity.len()
            )));
        }
        if let Some(bad) = mz.iter().find(|v| !v.is_finite()) {
            return Err(CoreError::InputShape(format!(
                "spectrum '{}' contains non-finite m/z value {}",
                id, bad
            )));
        }

        let (mz, intensity) = if mz.windows(2).all(|w| w[0] <= w[1]) {
            (mz, intensity)
        } else {
            // stable sort keeps equal m/z values in input order
            let mut pairs: Vec<(f64, f64)> = mz.into_iter().zip(intensity).collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            pairs.into_iter().unzip()
        };

        Ok(Spectrum { id, mz, intensity, metadata: BTreeMap::new(), binning: None })
    }

    /// Internal constructor for spectra whose axis is already sorted and validated.
    pub(crate) fn from_parts(
        id: String,
        mz: Vec<f64>,
        intensity: Vec<f64>,
        metadata: BTreeMap<String, String>,
        binning: Option<BinGrid>,
    ) -> Self {
        debug_assert_eq!(mz.len(), intensity.len());
        Spectrum { id, mz, intensity, metadata, binning }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// The structure string recorded for the compound, if any.
    pub fn structure(&self) -> Option<&str> {
        self.metadata.get(STRUCTURE_KEY).map(|s| s.as_str())
    }

    /// The grid this spectrum was binned on, `None` for raw spectra.
    pub fn binning(&self) -> Option<&BinGrid> {
        self.binning.as_ref()
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// Euclidean norm of the intensity vector.
    pub fn intensity_norm(&self) -> f64 {
        self.intensity.iter().map(|i| i * i).sum::<f64>().sqrt()
    }

    /// Keeps peaks inside the given m/z and intensity ranges (both inclusive).
    pub fn filter_ranged(&self, mz_min: f64, mz_max: f64, intensity_min: f64, intensity_max: f64) -> Self {
        let mut mz_vec: Vec<f64> = Vec::new();
        let mut intensity_vec: Vec<f64> = Vec::new();

        for (mz, intensity) in self.mz.iter().zip(self.intensity.iter()) {
            if mz_min <= *mz && *mz <= mz_max && *intensity >= intensity_min && *intensity <= intensity_max {
                mz_vec.push(*mz);
                intensity_vec.push(*intensity);
            }
        }
        Spectrum::from_parts(self.id.clone(), mz_vec, intensity_vec, self.metadata.clone(), self.binning)
    }
}

impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let base_peak = self.mz.iter()
            .zip(self.intensity.iter())
            .max_by(|a, b| a.1.total_cmp(b.1));

        match base_peak {
            Some((mz, i)) => write!(f, "Spectrum({}, data points: {}, max by intensity: ({:.3}, {}))", self.id, self.len(), mz, i),
            None => write!(f, "Spectrum({}, data points: 0)", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch() {
        let result = Spectrum::new("bad", vec![100.0, 200.0], vec![1.0]);
        assert!(matches!(result, Err(CoreError::InputShape(_))));
    }

    #[test]
    fn test_unsorted_input_keeps_tie_order() {
        let spectrum = Spectrum::new("s", vec![300.0, 100.0, 100.0], vec![3.0, 1.0, 2.0]).unwrap();
        assert_eq!(spectrum.mz(), &[100.0, 100.0, 300.0]);
        assert_eq!(spectrum.intensity(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_structure_lookup() {
        let spectrum = Spectrum::new("s", vec![], vec![])
            .unwrap()
            .with_field(STRUCTURE_KEY, "CCO");
        assert_eq!(spectrum.structure(), Some("CCO"));
        assert!(spectrum.is_empty());
        assert!(spectrum.binning().is_none());
    }

    #[test]
    fn test_filter_ranged() {
        let spectrum = Spectrum::new("s", vec![100.0, 200.0, 300.0], vec![10.0, 20.0, 30.0]).unwrap();
        let filtered = spectrum.filter_ranged(150.0, 250.0, 15.0, 25.0);
        assert_eq!(filtered.mz(), &[200.0]);
        assert_eq!(filtered.intensity(), &[20.0]);
        assert_eq!(filtered.id(), "s");
    }

    #[test]
    fn test_bin_grid_lower_edge() {
        let grid = BinGrid { bin_width: 0.5, origin_offset: 20.0 };
        assert!((grid.lower_edge(4.0) - 22.0).abs() < 1e-12);
    }
}
