use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bincode::{Decode, Encode};
use log::info;

use crate::data::spectrum::Spectrum;
use crate::error::{CoreError, Result};

const CACHE_VERSION: u32 = 1;
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// On-disk container for a collection of (binned) spectra.
#[derive(Encode, Decode)]
pub struct SpectrumCacheFile {
    pub version: u32,
    pub spectra: Vec<Spectrum>,
}

impl SpectrumCacheFile {
    pub fn new(spectra: Vec<Spectrum>) -> Self {
        Self { version: CACHE_VERSION, spectra }
    }
}

pub fn encode_spectra(spectra: &[Spectrum]) -> Result<Vec<u8>> {
    let file = SpectrumCacheFile::new(spectra.to_vec());
    bincode::encode_to_vec(&file, bincode::config::standard())
        .map_err(|e| CoreError::Cache(e.to_string()))
}

pub fn decode_spectra(bytes: &[u8]) -> Result<Vec<Spectrum>> {
    let (file, _): (SpectrumCacheFile, usize) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CoreError::Cache(e.to_string()))?;
    if file.version != CACHE_VERSION {
        return Err(CoreError::Cache(format!(
            "unsupported cache version {}, expected {}",
            file.version, CACHE_VERSION
        )));
    }
    Ok(file.spectra)
}

/// Writes spectra to `path`, zstd compressed when `compress` is set.
pub fn save_spectra(path: impl AsRef<Path>, spectra: &[Spectrum], compress: bool) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_spectra(spectra)?;
    let file = File::create(path)?;

    if compress {
        let mut encoder = zstd::Encoder::new(file, 3)?;
        encoder.write_all(&bytes)?;
        encoder.finish()?;
    } else {
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
    }

    info!("cached {} spectra in {}", spectra.len(), path.display());
    Ok(())
}

/// Reads spectra written by [`save_spectra`], compressed or not.
pub fn load_spectra(path: impl AsRef<Path>) -> Result<Vec<Spectrum>> {
    let mut raw = Vec::new();
    BufReader::new(File::open(path.as_ref())?).read_to_end(&mut raw)?;

    let bytes = if raw.starts_with(&ZSTD_MAGIC) {
        zstd::decode_all(raw.as_slice())?
    } else {
        raw
    };
    decode_spectra(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::binning::{bin_spectrum, Aggregation};
    use crate::config::ProcessingConfig;

    fn spectra() -> Vec<Spectrum> {
        let raw = Spectrum::new("s1", vec![100.0, 150.5, 150.7], vec![10.0, 5.0, 5.0])
            .unwrap()
            .with_field("smiles", "CCO");
        let binned = bin_spectrum(&raw, 0.5, Aggregation::Sum, &ProcessingConfig::default()).unwrap();
        vec![raw, binned]
    }

    #[test]
    fn test_encode_decode_keeps_grid_and_metadata() {
        let original = spectra();
        let decoded = decode_spectra(&encode_spectra(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert!(decoded[1].binning().is_some());
        assert_eq!(decoded[0].structure(), Some("CCO"));
    }

    #[test]
    fn test_files_with_and_without_compression() {
        let dir = tempfile::tempdir().unwrap();
        for compress in [false, true] {
            let path = dir.path().join(format!("cache-{}.bin", compress));
            save_spectra(&path, &spectra(), compress).unwrap();
            assert_eq!(load_spectra(&path).unwrap(), spectra());
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(decode_spectra(&[0xff, 0xff, 0xff]), Err(CoreError::Cache(_))));
    }
}
