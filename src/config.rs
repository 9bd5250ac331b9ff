use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calibration::FitMode;
use crate::linalg::Elimination;
use crate::reading::Bounds;
use crate::Result;

/// Settings of a probe component, read from a TOML file
///
/// Every field has a default, so an empty file is a valid configuration.
///
/// ```toml
/// poll_interval_ms = 5000
/// fit_mode = "linear"
///
/// [bounds]
/// min = 0.0
/// max = 14.0
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time between two readings
    pub poll_interval_ms: u64,
    /// Factor taking the signal source output to mV
    pub signal_scale: f64,
    pub bounds: Bounds,
    pub fit_mode: FitMode,
    /// Pivots at or below this magnitude mark a calibration set as degenerate
    pub pivot_tolerance: f64,
    /// Key the calibration points are persisted under
    pub store_key: String,
    /// Attach the stored calibration points to every reading
    pub publish_calibration: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 15_000,
            signal_scale: 1000.0,
            bounds: Bounds::PH,
            fit_mode: FitMode::Quadratic,
            pivot_tolerance: 0.0,
            store_key: "ph_probe".to_owned(),
            publish_calibration: true,
        }
    }
}

impl Config {
    /// # Errors
    /// Returns an error if `contents` is not valid TOML for a `Config`, or if the parsed values
    /// are inconsistent.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a valid `Config`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// # Errors
    /// Returns an error describing the first inconsistent setting.
    pub fn validate(&self) -> Result<()> {
        if !self.bounds.is_consistent() {
            return Err(format!(
                "lower bound {:?} exceeds upper bound {:?}",
                self.bounds.min, self.bounds.max
            )
            .into());
        }
        if !(self.signal_scale.is_finite() && self.signal_scale != 0.0) {
            return Err(format!("signal scale {} is unusable", self.signal_scale).into());
        }
        if !(self.pivot_tolerance.is_finite() && self.pivot_tolerance >= 0.0) {
            return Err(format!(
                "pivot tolerance {} must be finite and non-negative",
                self.pivot_tolerance
            )
            .into());
        }
        if self.store_key.is_empty() {
            return Err("store key must not be empty".into());
        }
        Ok(())
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn elimination(&self) -> Elimination<f64> {
        Elimination::solver().with_tolerance(self.pivot_tolerance)
    }
}
