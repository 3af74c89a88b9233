use std::collections::BTreeMap;
use std::str::FromStr;

use log::{info, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ProcessingConfig, Workers};
use crate::data::spectrum::{BinGrid, Spectrum};
use crate::error::{CoreError, Result};

/// How intensities that fall into the same bin are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    #[default]
    Sum,
    Average,
}

impl FromStr for Aggregation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sum" | "somme" => Ok(Aggregation::Sum),
            "average" | "mean" | "moyenne" => Ok(Aggregation::Average),
            other => Err(CoreError::InvalidConfiguration(format!("unknown aggregation '{}'", other))),
        }
    }
}

/// Aggregates the peaks of a spectrum into fixed-width bins.
///
/// # Arguments
///
/// * `spectrum` - The spectrum to bin.
/// * `bin_width` - Width of one bin in m/z units, must be positive.
/// * `aggregation` - Sum or average of the intensities falling into one bin.
/// * `config` - Supplies the origin bins are counted from.
///
/// # Description
///
/// Each peak goes to bin `floor((mz - origin_offset) / bin_width)`. The returned spectrum
/// carries the distinct bin indices on its m/z axis, its intensities divided by their maximum,
/// and the `BinGrid` it was produced with. Use [`rescale_to_mz`] to get m/z values back.
///
/// # Errors
///
/// `DegenerateNormalization` when the largest binned intensity is not positive, which includes
/// spectra without peaks.
///
/// # Example
///
/// ```rust
/// # use smcore::config::ProcessingConfig;
/// # use smcore::data::spectrum::Spectrum;
/// # use smcore::algorithm::binning::{bin_spectrum, Aggregation};
/// let spectrum = Spectrum::new("s", vec![20.2, 20.7, 22.5], vec![1.0, 1.0, 4.0]).unwrap();
/// let binned = bin_spectrum(&spectrum, 1.0, Aggregation::Sum, &ProcessingConfig::default()).unwrap();
/// assert_eq!(binned.mz(), &[0.0, 2.0]);
/// assert_eq!(binned.intensity(), &[0.5, 1.0]);
/// ```
pub fn bin_spectrum(spectrum: &Spectrum, bin_width: f64, aggregation: Aggregation, config: &ProcessingConfig) -> Result<Spectrum> {
    if !(bin_width > 0.0) || !bin_width.is_finite() {
        return Err(CoreError::InvalidConfiguration(format!("bin width must be positive, got {}", bin_width)));
    }

    let mut bins: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for (mz, intensity) in spectrum.mz().iter().zip(spectrum.intensity().iter()) {
        let index = ((mz - config.origin_offset) / bin_width).floor() as i64;
        let entry = bins.entry(index).or_insert((0.0, 0));
        entry.0 += intensity;
        entry.1 += 1;
    }

    let (mz, mut intensity): (Vec<f64>, Vec<f64>) = bins.into_iter()
        .map(|(index, (sum, count))| {
            let value = match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Average => sum / count as f64,
            };
            (index as f64, value)
        })
        .unzip();

    let max = intensity.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(max > 0.0) {
        return Err(CoreError::DegenerateNormalization {
            id: spectrum.id().to_string(),
            max: if intensity.is_empty() { 0.0 } else { max },
        });
    }
    intensity.iter_mut().for_each(|i| *i /= max);

    let grid = BinGrid { bin_width, origin_offset: config.origin_offset };
    Ok(Spectrum::from_parts(spectrum.id().to_string(), mz, intensity, spectrum.metadata().clone(), Some(grid)))
}

/// Replaces the bin indices of a binned spectrum by the lower m/z edge of each bin.
///
/// The result is a raw spectrum again, it no longer carries a grid.
pub fn rescale_to_mz(binned: &Spectrum) -> Result<Spectrum> {
    let grid = binned.binning().ok_or_else(|| {
        CoreError::InvalidConfiguration(format!("spectrum '{}' is not binned", binned.id()))
    })?;
    let mz = binned.mz().iter().map(|index| grid.lower_edge(*index)).collect();
    Ok(Spectrum::from_parts(binned.id().to_string(), mz, binned.intensity().to_vec(), binned.metadata().clone(), None))
}

/// Dense histogram of a spectrum over `[mz_min, mz_max]` with fixed steps.
///
/// There are `ceil((mz_max - mz_min) / bin_width)` bins; a peak exactly at `mz_max` counts to the
/// last bin, peaks outside the range are ignored. Intensities are summed and not normalised.
pub fn fixed_width_histogram(spectrum: &Spectrum, bin_width: f64, mz_min: f64, mz_max: f64) -> Result<Vec<f64>> {
    if !(bin_width > 0.0) || !(mz_max > mz_min) {
        return Err(CoreError::InvalidConfiguration(format!(
            "histogram needs a positive bin width and mz_max > mz_min, got width {} on [{}, {}]",
            bin_width, mz_min, mz_max
        )));
    }

    let n_bins = ((mz_max - mz_min) / bin_width).ceil() as usize;
    let mut histogram = vec![0.0; n_bins];

    for (mz, intensity) in spectrum.mz().iter().zip(spectrum.intensity().iter()) {
        if *mz < mz_min || *mz > mz_max {
            continue;
        }
        let index = (((mz - mz_min) / bin_width).floor() as usize).min(n_bins - 1);
        histogram[index] += intensity;
    }

    Ok(histogram)
}

/// Stacks the fixed-width histograms of many spectra into an `n_spectra x n_bins` matrix.
pub fn feature_matrix(spectra: &[Spectrum], bin_width: f64, mz_min: f64, mz_max: f64) -> Result<DMatrix<f64>> {
    let rows = spectra.iter()
        .map(|s| fixed_width_histogram(s, bin_width, mz_min, mz_max))
        .collect::<Result<Vec<_>>>()?;

    let n_cols = ((mz_max - mz_min) / bin_width).ceil() as usize;
    Ok(DMatrix::from_fn(rows.len(), n_cols, |i, j| rows[i][j]))
}

/// Outcome of binning a whole collection.
#[derive(Clone, Debug)]
pub struct BinnedCollection {
    pub spectra: Vec<Spectrum>,
    /// Ids of spectra that could not be normalised and were left out.
    pub discarded: Vec<String>,
}

/// Bins many spectra in parallel, keeping input order.
///
/// Spectra failing with `DegenerateNormalization` are dropped with a warning and reported in
/// `discarded`; any other error aborts the whole batch.
pub fn bin_collection(
    spectra: &[Spectrum],
    bin_width: f64,
    aggregation: Aggregation,
    config: &ProcessingConfig,
    workers: Workers,
) -> Result<BinnedCollection> {
    config.validate()?;

    let bin_all = || -> Vec<Result<Spectrum>> {
        spectra.par_iter()
            .map(|s| bin_spectrum(s, bin_width, aggregation, config))
            .collect()
    };

    let results = match workers.thread_pool()? {
        Some(pool) => pool.install(bin_all),
        None => spectra.iter().map(|s| bin_spectrum(s, bin_width, aggregation, config)).collect(),
    };

    let mut binned = Vec::with_capacity(results.len());
    let mut discarded = Vec::new();

    for result in results {
        match result {
            Ok(spectrum) => binned.push(spectrum),
            Err(CoreError::DegenerateNormalization { id, max }) => {
                warn!("discarding spectrum '{}': maximum binned intensity is {}", id, max);
                discarded.push(id);
            }
            Err(e) => return Err(e),
        }
    }

    info!("binned {} spectra with width {}, {} discarded", binned.len(), bin_width, discarded.len());
    Ok(BinnedCollection { spectra: binned, discarded })
}

/// Aligns two spectra on the union of their m/z values, filling missing peaks with zero.
pub fn align_on_union(a: &Spectrum, b: &Spectrum) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut axis: Vec<f64> = Vec::with_capacity(a.len() + b.len());
    let mut left = Vec::with_capacity(a.len() + b.len());
    let mut right = Vec::with_capacity(a.len() + b.len());

    let (mz1, int1) = (a.mz(), a.intensity());
    let (mz2, int2) = (b.mz(), b.intensity());
    let (mut i, mut j) = (0, 0);

    while i < mz1.len() || j < mz2.len() {
        let take_left = j >= mz2.len() || (i < mz1.len() && mz1[i] < mz2[j]);
        let take_right = i >= mz1.len() || (j < mz2.len() && mz2[j] < mz1[i]);

        if take_left {
            axis.push(mz1[i]);
            left.push(int1[i]);
            right.push(0.0);
            i += 1;
        } else if take_right {
            axis.push(mz2[j]);
            left.push(0.0);
            right.push(int2[j]);
            j += 1;
        } else {
            axis.push(mz1[i]);
            left.push(int1[i]);
            right.push(int2[j]);
            i += 1;
            j += 1;
        }
    }

    (axis, left, right)
}
