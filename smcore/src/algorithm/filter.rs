use std::collections::BTreeMap;

use log::warn;

use crate::config::ProcessingConfig;
use crate::data::spectrum::{Spectrum, COMPOUND_NAME_KEY, STRUCTURE_KEY};

const COLLISION_ENERGY_MARKER: &str = "CollisionEnergy";

/// Keeps peaks inside the configured m/z window and rescales them to a maximum of one.
///
/// # Arguments
///
/// * `spectrum` - The raw spectrum.
/// * `config` - `lower_bound`, `upper_bound` and `min_intensity` are used.
///
/// # Description
///
/// Peaks with `lower_bound <= mz <= upper_bound` are kept and divided by the largest kept
/// intensity; peaks whose relative intensity is not above `min_intensity` are dropped.
/// A window without peaks, or whose maximum is not positive, yields an empty spectrum.
///
/// # Example
///
/// ```rust
/// # use smcore::config::ProcessingConfig;
/// # use smcore::data::spectrum::Spectrum;
/// # use smcore::algorithm::filter::filter_peaks;
/// let spectrum = Spectrum::new("s", vec![10.0, 100.0, 200.0], vec![5.0, 50.0, 0.01]).unwrap();
/// let filtered = filter_peaks(&spectrum, &ProcessingConfig::default());
/// assert_eq!(filtered.mz(), &[100.0]);
/// assert_eq!(filtered.intensity(), &[1.0]);
/// ```
pub fn filter_peaks(spectrum: &Spectrum, config: &ProcessingConfig) -> Spectrum {
    let ranged = spectrum.filter_ranged(config.lower_bound, config.upper_bound, f64::NEG_INFINITY, f64::INFINITY);

    let max_intensity = ranged.intensity().iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if ranged.is_empty() || max_intensity <= 0.0 {
        return Spectrum::from_parts(
            spectrum.id().to_string(),
            Vec::new(),
            Vec::new(),
            spectrum.metadata().clone(),
            spectrum.binning().copied(),
        );
    }

    let (mz, intensity): (Vec<f64>, Vec<f64>) = ranged.mz().iter()
        .zip(ranged.intensity().iter())
        .map(|(mz, i)| (*mz, *i / max_intensity))
        .filter(|(_, i)| *i > config.min_intensity)
        .unzip();

    Spectrum::from_parts(spectrum.id().to_string(), mz, intensity, spectrum.metadata().clone(), spectrum.binning().copied())
}

/// Removes a trailing `CollisionEnergy...` annotation from a compound name.
///
/// Only the last occurrence is cut; names carrying the marker more than once are logged.
pub fn clean_compound_name(compound_name: &str) -> String {
    match compound_name.rfind(COLLISION_ENERGY_MARKER) {
        Some(position) => {
            if compound_name.matches(COLLISION_ENERGY_MARKER).count() > 1 {
                warn!("multiple '{}' occurrences in compound name '{}'", COLLISION_ENERGY_MARKER, compound_name);
            }
            compound_name[..position].to_string()
        }
        None => compound_name.to_string(),
    }
}

/// Reduces spectrum metadata to the cleaned compound name and the structure string.
///
/// Missing fields become empty strings.
pub fn clean_metadata(metadata: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let name = metadata.get(COMPOUND_NAME_KEY).map(|s| s.as_str()).unwrap_or("");
    let structure = metadata.get(STRUCTURE_KEY).cloned().unwrap_or_default();

    let mut cleaned = BTreeMap::new();
    cleaned.insert(COMPOUND_NAME_KEY.to_string(), clean_compound_name(name));
    cleaned.insert(STRUCTURE_KEY.to_string(), structure);
    cleaned
}

/// A key identifying spectra with identical metadata, the `id` field excluded.
///
/// Fields are joined in key order with ASCII record and unit separators.
pub fn metadata_key(metadata: &BTreeMap<String, String>) -> String {
    metadata.iter()
        .filter(|(key, _)| key.as_str() != "id")
        .map(|(key, value)| format!("{}\u{1f}{}", key, value))
        .collect::<Vec<_>>()
        .join("\u{1e}")
}
