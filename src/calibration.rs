use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CalibrationError, MatrixError};
use crate::linalg::Elimination;
use crate::math::first_repeated_pair;
use crate::polyfit::{fit_exact, Polynomial};

/// Open window of raw signals, in mV, produced by the probe in a neutral buffer (pH 6 to 8)
pub const NEUTRAL_BUFFER_WINDOW: (f64, f64) = (1122.0, 1478.0);
/// Open window of raw signals, in mV, produced by the probe in an acid buffer (pH 3 to 5)
pub const ACID_BUFFER_WINDOW: (f64, f64) = (1654.0, 2010.0);

/// A single reference solution and the raw signal the probe produced in it
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Known value of the reference solution, in pH
    pub reference: f64,
    /// Raw probe signal in mV
    pub signal: f64,
}

impl CalibrationPoint {
    #[must_use]
    pub const fn new(reference: f64, signal: f64) -> Self {
        Self { reference, signal }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.reference.is_finite() && self.signal.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CalibrationSlot {
    Acid,
    Neutral,
    Base,
}

impl CalibrationSlot {
    pub const ALL: [Self; 3] = [Self::Acid, Self::Neutral, Self::Base];
}

impl fmt::Display for CalibrationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acid => "acid",
            Self::Neutral => "neutral",
            Self::Base => "base",
        };
        write!(f, "{name}")
    }
}

/// The three stored calibration points of a probe
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    pub acid: CalibrationPoint,
    pub neutral: CalibrationPoint,
    pub base: CalibrationPoint,
}

impl CalibrationSet {
    /// Points used until the probe has been calibrated
    pub const FACTORY: Self = Self {
        acid: CalibrationPoint::new(4.0, 2032.44),
        neutral: CalibrationPoint::new(7.0, 1500.0),
        base: CalibrationPoint::new(10.0, 967.56),
    };

    #[must_use]
    pub const fn point(&self, slot: CalibrationSlot) -> CalibrationPoint {
        match slot {
            CalibrationSlot::Acid => self.acid,
            CalibrationSlot::Neutral => self.neutral,
            CalibrationSlot::Base => self.base,
        }
    }

    pub fn set(&mut self, slot: CalibrationSlot, point: CalibrationPoint) {
        match slot {
            CalibrationSlot::Acid => self.acid = point,
            CalibrationSlot::Neutral => self.neutral = point,
            CalibrationSlot::Base => self.base = point,
        }
    }

    /// A stored record with any non-finite value is treated as corrupt
    #[must_use]
    pub fn is_finite(&self) -> bool {
        CalibrationSlot::ALL
            .iter()
            .all(|&slot| self.point(slot).is_finite())
    }

    fn participating(&self, mode: FitMode) -> Vec<(CalibrationSlot, CalibrationPoint)> {
        mode.slots()
            .iter()
            .map(|&slot| (slot, self.point(slot)))
            .collect()
    }
}

impl Default for CalibrationSet {
    fn default() -> Self {
        Self::FACTORY
    }
}

/// Which stored points take part in the fit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// A quadratic through all three points
    #[default]
    Quadratic,
    /// A line through the acid and neutral points
    Linear,
}

impl FitMode {
    #[must_use]
    pub const fn slots(self) -> &'static [CalibrationSlot] {
        match self {
            Self::Quadratic => &[
                CalibrationSlot::Acid,
                CalibrationSlot::Neutral,
                CalibrationSlot::Base,
            ],
            Self::Linear => &[CalibrationSlot::Acid, CalibrationSlot::Neutral],
        }
    }
}

/// Fit the curve mapping raw signal to pH through the points selected by `mode`
///
/// # Errors
/// Returns [`CalibrationError::DegenerateCalibrationSet`] when the points cannot define a unique
/// curve: a non-finite point, two points sharing a raw signal, a singular system or non-finite
/// coefficients.
pub fn fit(
    set: &CalibrationSet,
    mode: FitMode,
    elimination: &Elimination<f64>,
) -> Result<Polynomial<f64>, CalibrationError> {
    let points = set.participating(mode);

    if let Some((slot, _)) = points.iter().find(|(_, point)| !point.is_finite()) {
        return Err(CalibrationError::DegenerateCalibrationSet {
            reason: format!("the {slot} point is not finite"),
        });
    }

    let signals = points.iter().map(|(_, p)| p.signal).collect::<Vec<_>>();
    let references = points.iter().map(|(_, p)| p.reference).collect::<Vec<_>>();

    if let Some((ii, jj)) = first_repeated_pair(&signals) {
        return Err(CalibrationError::DegenerateCalibrationSet {
            reason: format!(
                "the {} and {} points share the raw signal {}",
                points[ii].0, points[jj].0, signals[ii]
            ),
        });
    }

    let polynomial = fit_exact(&signals, &references, elimination).map_err(|e| match e {
        MatrixError::Singular { .. } => CalibrationError::DegenerateCalibrationSet {
            reason: e.to_string(),
        },
        MatrixError::DimensionMismatch { .. } => e.into(),
    })?;

    if !polynomial.is_finite() {
        return Err(CalibrationError::DegenerateCalibrationSet {
            reason: "the fitted coefficients are not finite".to_owned(),
        });
    }

    Ok(polynomial)
}

/// The accepted calibration curve of a probe
///
/// The held polynomial only ever changes through a successful [`Calibration::refit`], so a
/// rejected set leaves the published formula untouched.
#[derive(Clone, Debug)]
pub struct Calibration {
    polynomial: Polynomial<f64>,
    mode: FitMode,
    elimination: Elimination<f64>,
}

impl Calibration {
    /// # Errors
    /// Fails if `set` is degenerate, see [`fit`].
    pub fn new(
        set: &CalibrationSet,
        mode: FitMode,
        elimination: Elimination<f64>,
    ) -> Result<Self, CalibrationError> {
        let polynomial = fit(set, mode, &elimination)?;
        Ok(Self {
            polynomial,
            mode,
            elimination,
        })
    }

    /// Refit from `set`, keeping the current curve if the set is rejected
    ///
    /// # Errors
    /// Fails if `set` is degenerate, see [`fit`].
    pub fn refit(&mut self, set: &CalibrationSet) -> Result<(), CalibrationError> {
        match fit(set, self.mode, &self.elimination) {
            Ok(polynomial) => {
                debug!(coefficients = ?polynomial.coefficients(), "calibration refit");
                self.polynomial = polynomial;
                Ok(())
            }
            Err(e) => {
                warn!("keeping previous calibration: {e}");
                Err(e)
            }
        }
    }

    #[must_use]
    pub const fn polynomial(&self) -> &Polynomial<f64> {
        &self.polynomial
    }

    #[must_use]
    pub const fn mode(&self) -> FitMode {
        self.mode
    }
}

/// Guess which buffer the probe is sitting in from its raw signal in mV
///
/// Only the neutral and acid buffers have known windows.
#[must_use]
pub fn identify_buffer(signal: f64) -> Option<CalibrationSlot> {
    let inside = |(low, high): (f64, f64)| signal > low && signal < high;
    if inside(NEUTRAL_BUFFER_WINDOW) {
        Some(CalibrationSlot::Neutral)
    } else if inside(ACID_BUFFER_WINDOW) {
        Some(CalibrationSlot::Acid)
    } else {
        None
    }
}
