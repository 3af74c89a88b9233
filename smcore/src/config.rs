use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Settings that govern peak filtering and binning of spectra.
///
/// # Description
///
/// `origin_offset` is the lower bound that bin indices are counted from, `lower_bound` and
/// `upper_bound` delimit the accepted m/z range and `min_intensity` is the relative
/// intensity (after max-normalisation) a peak must exceed to be kept.
///
/// # Example
///
/// ```rust
/// # use smcore::config::ProcessingConfig;
/// let config = ProcessingConfig::from_json_str(r#"{"upper_bound": 2000.0}"#).unwrap();
/// assert_eq!(config.origin_offset, 20.0);
/// assert_eq!(config.upper_bound, 2000.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Origin bin indices are measured from (default: 20.0)
    pub origin_offset: f64,
    /// Smallest accepted m/z (default: 20.0)
    pub lower_bound: f64,
    /// Largest accepted m/z (default: 20000.0)
    pub upper_bound: f64,
    /// Relative intensity threshold applied after normalisation (default: 0.001)
    pub min_intensity: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            origin_offset: 20.0,
            lower_bound: 20.0,
            upper_bound: 20000.0,
            min_intensity: 0.001,
        }
    }
}

impl ProcessingConfig {
    /// Reads a configuration from a JSON document, missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ProcessingConfig = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidConfiguration(format!("processing config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.origin_offset, self.lower_bound, self.upper_bound, self.min_intensity];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidConfiguration(
                "processing config values must be finite".to_string(),
            ));
        }
        if self.lower_bound > self.upper_bound {
            return Err(CoreError::InvalidConfiguration(format!(
                "lower bound {} exceeds upper bound {}",
                self.lower_bound, self.upper_bound
            )));
        }
        Ok(())
    }
}

/// Number of workers used by the parallel fan-out points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Workers {
    /// Run on the calling thread.
    Sequential,
    /// Half of the available hardware parallelism, at least one.
    Auto,
    Fixed(usize),
}

impl Default for Workers {
    fn default() -> Self {
        Workers::Auto
    }
}

impl Workers {
    /// Resolves to a concrete thread count.
    pub fn count(&self) -> Result<usize> {
        match *self {
            Workers::Sequential => Ok(1),
            Workers::Auto => {
                let available = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                Ok((available / 2).max(1))
            }
            Workers::Fixed(0) => Err(CoreError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            )),
            Workers::Fixed(n) => Ok(n),
        }
    }

    /// Builds a dedicated rayon pool, or `None` when work should stay on the calling thread.
    pub fn thread_pool(&self) -> Result<Option<rayon::ThreadPool>> {
        if let Workers::Sequential = self {
            return Ok(None);
        }
        let num_threads = self.count()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| CoreError::InvalidConfiguration(format!("thread pool: {}", e)))?;
        Ok(Some(pool))
    }
}
