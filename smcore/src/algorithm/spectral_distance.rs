use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::data::spectrum::Spectrum;
use crate::error::{CoreError, Result};

/// m/z tolerance used when a tolerance based metric is named without one.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// A distance function between two spectra, resolved once and then called per pair.
pub type SpectralDistanceFn = Box<dyn Fn(&Spectrum, &Spectrum) -> Result<f64> + Send + Sync>;

/// The spectral distance metrics.
///
/// The binned metrics expect inputs produced by the binner, the tolerance metrics work on
/// raw m/z values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpectralMetric {
    /// `|1 - cos|` over peaks sharing a bin.
    CosineBinned,
    /// Sum of absolute intensity differences over a shared bin grid.
    ManhattanBinned,
    /// `1 - 2 * matches / (n1 + n2)` with one-to-one matching inside the tolerance.
    Simple { tolerance: f64 },
    /// Greedy peak matching by descending intensity difference.
    ManhattanTolerance { tolerance: f64 },
}

impl SpectralMetric {
    /// Parses a metric name; `tolerance` is kept only by the tolerance based metrics.
    pub fn from_name(name: &str, tolerance: f64) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "cosinus" | "cosine" => Ok(SpectralMetric::CosineBinned),
            "manhattan" => Ok(SpectralMetric::ManhattanBinned),
            "simple" => Ok(SpectralMetric::Simple { tolerance }),
            "manhattan_tolerance" | "manhattan_tol" => Ok(SpectralMetric::ManhattanTolerance { tolerance }),
            other => Err(CoreError::InvalidConfiguration(format!("unknown spectral metric '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpectralMetric::CosineBinned => "cosinus",
            SpectralMetric::ManhattanBinned => "manhattan",
            SpectralMetric::Simple { .. } => "simple",
            SpectralMetric::ManhattanTolerance { .. } => "manhattan_tolerance",
        }
    }

    /// Checks the parameters and returns the concrete distance function.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use smcore::data::spectrum::Spectrum;
    /// # use smcore::algorithm::spectral_distance::SpectralMetric;
    /// let a = Spectrum::new("a", vec![100.0, 101.0, 200.0], vec![1.0, 1.0, 1.0]).unwrap();
    /// let b = Spectrum::new("b", vec![100.05, 150.0, 200.0], vec![1.0, 1.0, 1.0]).unwrap();
    /// let distance = SpectralMetric::Simple { tolerance: 0.1 }.resolve().unwrap();
    /// assert!((distance(&a, &b).unwrap() - 1.0 / 3.0).abs() < 1e-9);
    /// ```
    pub fn resolve(self) -> Result<SpectralDistanceFn> {
        match self {
            SpectralMetric::CosineBinned => Ok(Box::new(|a: &Spectrum, b: &Spectrum| Ok(cosine_binned(a, b)))),
            SpectralMetric::ManhattanBinned => Ok(Box::new(manhattan_binned)),
            SpectralMetric::Simple { tolerance } => {
                check_tolerance(tolerance)?;
                Ok(Box::new(move |a: &Spectrum, b: &Spectrum| Ok(simple_distance(a, b, tolerance))))
            }
            SpectralMetric::ManhattanTolerance { tolerance } => {
                check_tolerance(tolerance)?;
                Ok(Box::new(move |a: &Spectrum, b: &Spectrum| Ok(manhattan_tolerance(a, b, tolerance))))
            }
        }
    }

    /// One-off distance computation; batch callers should `resolve` once instead.
    pub fn distance(self, a: &Spectrum, b: &Spectrum) -> Result<f64> {
        (self.resolve()?)(a, b)
    }
}

impl FromStr for SpectralMetric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        SpectralMetric::from_name(s, DEFAULT_TOLERANCE)
    }
}

impl fmt::Display for SpectralMetric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn check_tolerance(tolerance: f64) -> Result<()> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidConfiguration(format!("tolerance must be a non-negative number, got {}", tolerance)))
    }
}

/// Cosine distance over peaks with identical m/z (bin index).
///
/// Two empty spectra are at distance 0, otherwise a zero norm on either side gives `1.0`.
pub fn cosine_binned(a: &Spectrum, b: &Spectrum) -> f64 {
    let (mz1, int1) = (a.mz(), a.intensity());
    let (mz2, int2) = (b.mz(), b.intensity());
    if mz1.is_empty() && mz2.is_empty() {
        return 0.0;
    }

    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;

    while i < mz1.len() && j < mz2.len() {
        if mz1[i] < mz2[j] {
            i += 1;
        } else if mz2[j] < mz1[i] {
            j += 1;
        } else {
            dot += int1[i] * int2[j];
            i += 1;
            j += 1;
        }
    }

    let norm1 = a.intensity_norm();
    let norm2 = b.intensity_norm();
    if norm1 == 0.0 || norm2 == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm1 * norm2)).abs()
}

/// Manhattan distance between two spectra binned on the same grid.
///
/// # Errors
///
/// `InvalidConfiguration` when either spectrum is unbinned or the grids differ.
pub fn manhattan_binned(a: &Spectrum, b: &Spectrum) -> Result<f64> {
    match (a.binning(), b.binning()) {
        (Some(grid_a), Some(grid_b)) if grid_a == grid_b => {}
        (grid_a, grid_b) => {
            return Err(CoreError::InvalidConfiguration(format!(
                "manhattan distance needs spectra binned on the same grid, '{}' has {:?} and '{}' has {:?}",
                a.id(), grid_a, b.id(), grid_b
            )));
        }
    }

    let (mz1, int1) = (a.mz(), a.intensity());
    let (mz2, int2) = (b.mz(), b.intensity());

    let (mut i, mut j) = (0, 0);
    let mut distance = 0.0;

    while i < mz1.len() || j < mz2.len() {
        if i < mz1.len() && (j >= mz2.len() || mz1[i] < mz2[j]) {
            distance += int1[i].abs();
            i += 1;
        } else if j < mz2.len() && (i >= mz1.len() || mz2[j] < mz1[i]) {
            distance += int2[j].abs();
            j += 1;
        } else {
            distance += (int1[i] - int2[j]).abs();
            i += 1;
            j += 1;
        }
    }

    Ok(distance)
}

/// Share of peaks without a partner within `tolerance`, rounded to 10 decimals.
///
/// Two empty spectra are at distance 0.
pub fn simple_distance(a: &Spectrum, b: &Spectrum, tolerance: f64) -> f64 {
    let (mz1, mz2) = (a.mz(), b.mz());
    if mz1.is_empty() && mz2.is_empty() {
        return 0.0;
    }

    let (mut i, mut j) = (0, 0);
    let mut count = 0usize;

    while i < mz1.len() && j < mz2.len() {
        if (mz1[i] - mz2[j]).abs() <= tolerance {
            count += 1;
            i += 1;
            j += 1;
        } else if mz1[i] < mz2[j] {
            i += 1;
        } else {
            j += 1;
        }
    }

    let score = 1.0 - (2 * count) as f64 / (mz1.len() + mz2.len()) as f64;
    (score * 1e10).round() / 1e10
}

/// All `(i, j, |intensity_i - intensity_j|)` with `|mz_i - mz_j| <= tolerance`, in ascending `i`
/// then ascending `j`.
fn tolerance_candidates(a: &Spectrum, b: &Spectrum, tolerance: f64) -> Vec<(usize, usize, f64)> {
    let (mz1, int1) = (a.mz(), a.intensity());
    let (mz2, int2) = (b.mz(), b.intensity());

    let mut candidates = Vec::new();
    let mut lowest = 0;

    for (i, mz) in mz1.iter().enumerate() {
        let low = mz - tolerance;
        let high = mz + tolerance;

        // both axes are sorted, so peaks below this window stay below every later window
        while lowest < mz2.len() && mz2[lowest] < low {
            lowest += 1;
        }
        for j in lowest..mz2.len() {
            if mz2[j] > high {
                break;
            }
            candidates.push((i, j, (int1[i] - int2[j]).abs()));
        }
    }

    candidates
}

/// Manhattan distance with one-to-one greedy peak matching inside `tolerance`.
///
/// Candidate pairs are confirmed by descending intensity difference; among equal differences
/// the later generated candidate wins. A peak is matched at most once, and every peak left
/// unmatched adds its full intensity.
pub fn manhattan_tolerance(a: &Spectrum, b: &Spectrum, tolerance: f64) -> f64 {
    let mut candidates = tolerance_candidates(a, b, tolerance);
    candidates.sort_by_key(|c| OrderedFloat(c.2));

    let mut used1: HashSet<usize> = HashSet::new();
    let mut used2: HashSet<usize> = HashSet::new();
    let mut score = 0.0;

    for (i, j, diff) in candidates.into_iter().rev() {
        if !used1.contains(&i) && !used2.contains(&j) {
            score += diff;
            used1.insert(i);
            used2.insert(j);
        }
    }

    score += a.intensity().iter()
        .enumerate()
        .filter(|(i, _)| !used1.contains(i))
        .map(|(_, v)| v)
        .sum::<f64>();
    score += b.intensity().iter()
        .enumerate()
        .filter(|(j, _)| !used2.contains(j))
        .map(|(_, v)| v)
        .sum::<f64>();

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::binning::{bin_spectrum, Aggregation};
    use crate::config::ProcessingConfig;

    fn spectrum(id: &str, mz: Vec<f64>, intensity: Vec<f64>) -> Spectrum {
        Spectrum::new(id, mz, intensity).unwrap()
    }

    #[test]
    fn test_simple_tolerance_scenario() {
        let a = spectrum("a", vec![100.0, 101.0, 200.0], vec![1.0; 3]);
        let b = spectrum("b", vec![100.05, 150.0, 200.0], vec![1.0; 3]);
        let d = simple_distance(&a, &b, 0.1);
        assert!((d - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_simple_edge_cases() {
        let empty = spectrum("e", vec![], vec![]);
        let a = spectrum("a", vec![100.0], vec![1.0]);
        assert_eq!(simple_distance(&empty, &empty, 0.1), 0.0);
        assert_eq!(simple_distance(&a, &empty, 0.1), 1.0);
        assert_eq!(simple_distance(&a, &a, 0.0), 0.0);
    }

    #[test]
    fn test_cosine_identical_and_disjoint() {
        let a = spectrum("a", vec![1.0, 2.0, 3.0], vec![0.2, 1.0, 0.5]);
        let b = spectrum("b", vec![4.0, 5.0], vec![1.0, 0.3]);
        assert!(cosine_binned(&a, &a) < 1e-12);
        assert!((cosine_binned(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_zero_norm() {
        let a = spectrum("a", vec![1.0], vec![0.0]);
        let b = spectrum("b", vec![1.0], vec![1.0]);
        assert_eq!(cosine_binned(&a, &b), 1.0);
        let empty = spectrum("e", vec![], vec![]);
        assert_eq!(cosine_binned(&empty, &b), 1.0);
        assert_eq!(cosine_binned(&empty, &empty), 0.0);
    }

    #[test]
    fn test_cosine_bounds() {
        let a = spectrum("a", vec![1.0, 2.0, 4.0], vec![0.5, 1.0, 0.25]);
        let b = spectrum("b", vec![1.0, 3.0, 4.0], vec![1.0, 0.1, 0.7]);
        let d = cosine_binned(&a, &b);
        assert!((0.0..=1.0).contains(&d));
        assert!((d - cosine_binned(&b, &a)).abs() < 1e-15);
    }

    #[test]
    fn test_manhattan_binned_requires_grid() {
        let config = ProcessingConfig::default();
        let raw_a = spectrum("a", vec![100.2, 101.7], vec![1.0, 0.5]);
        let raw_b = spectrum("b", vec![100.4, 102.1], vec![0.5, 1.0]);
        assert!(matches!(manhattan_binned(&raw_a, &raw_b), Err(CoreError::InvalidConfiguration(_))));

        let a = bin_spectrum(&raw_a, 1.0, Aggregation::Sum, &config).unwrap();
        let b = bin_spectrum(&raw_b, 1.0, Aggregation::Sum, &config).unwrap();
        // bins 80, 81 against 80, 82
        let d = manhattan_binned(&a, &b).unwrap();
        assert!((d - (0.5 + 0.5 + 1.0)).abs() < 1e-12);

        let coarse = bin_spectrum(&raw_b, 2.0, Aggregation::Sum, &config).unwrap();
        assert!(manhattan_binned(&a, &coarse).is_err());
    }

    #[test]
    fn test_manhattan_tolerance_greedy() {
        // both peaks of b are within tolerance of a[0]; the larger difference is confirmed first
        let a = spectrum("a", vec![100.0], vec![1.0]);
        let b = spectrum("b", vec![99.95, 100.05], vec![0.2, 0.9]);
        let d = manhattan_tolerance(&a, &b, 0.1);
        assert!((d - (0.8 + 0.9)).abs() < 1e-12);
    }

    #[test]
    fn test_manhattan_tolerance_ties_go_to_later_candidate() {
        // one peak of `a` with two partners at the same intensity difference of 0.25
        let a = spectrum("a", vec![100.0], vec![0.5]);
        let b = spectrum("b", vec![99.95, 100.05], vec![0.25, 0.75]);
        assert_eq!(tolerance_candidates(&a, &b, 0.1), vec![(0, 0, 0.25), (0, 1, 0.25)]);
        // (0, 1) is confirmed, the 0.25 peak of `b` stays unmatched
        assert_eq!(manhattan_tolerance(&a, &b, 0.1), 0.5);

        // two peaks of `a` competing for one partner
        let a = spectrum("a", vec![100.0, 100.05], vec![0.25, 0.75]);
        let b = spectrum("b", vec![100.02], vec![0.5]);
        assert_eq!(tolerance_candidates(&a, &b, 0.1), vec![(0, 0, 0.25), (1, 0, 0.25)]);
        assert_eq!(manhattan_tolerance(&a, &b, 0.1), 0.5);
    }

    #[test]
    fn test_manhattan_tolerance_no_candidates() {
        let a = spectrum("a", vec![100.0, 200.0], vec![1.0, 0.5]);
        let b = spectrum("b", vec![150.0], vec![0.25]);
        assert!((manhattan_tolerance(&a, &b, 0.1) - 1.75).abs() < 1e-12);
        let empty = spectrum("e", vec![], vec![]);
        assert_eq!(manhattan_tolerance(&empty, &empty, 0.1), 0.0);
    }

    #[test]
    fn test_candidate_window_slides() {
        let a = spectrum("a", vec![10.0, 20.0, 30.0], vec![1.0; 3]);
        let b = spectrum("b", vec![9.95, 10.05, 19.0, 20.0, 30.05], vec![1.0; 5]);
        let pairs: Vec<(usize, usize)> = tolerance_candidates(&a, &b, 0.1)
            .into_iter()
            .map(|(i, j, _)| (i, j))
            .collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (1, 3), (2, 4)]);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!("cosinus".parse::<SpectralMetric>().unwrap(), SpectralMetric::CosineBinned);
        assert_eq!(
            SpectralMetric::from_name("simple", 0.02).unwrap(),
            SpectralMetric::Simple { tolerance: 0.02 }
        );
        assert!(matches!("euclid".parse::<SpectralMetric>(), Err(CoreError::InvalidConfiguration(_))));
        assert!(SpectralMetric::Simple { tolerance: -1.0 }.resolve().is_err());
    }
}
