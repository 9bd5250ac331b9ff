use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationSet;
use crate::polyfit::Polynomial;

/// Limits applied to every published value, either side may be disabled
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    /// The full pH scale
    pub const PH: Self = Self {
        min: Some(0.0),
        max: Some(14.0),
    };

    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Limit `value` to the enabled bounds, NaN passes through untouched
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        match (self.min, self.max) {
            (_, Some(max)) if value > max => max,
            (Some(min), _) if value < min => min,
            _ => value,
        }
    }

    /// Whether both bounds are set and in order
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::PH
    }
}

/// Maps raw signals to published values through a calibration curve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluator {
    bounds: Bounds,
}

impl Evaluator {
    #[must_use]
    pub const fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    #[must_use]
    pub fn evaluate(&self, curve: &Polynomial<f64>, signal: f64) -> f64 {
        self.bounds.clamp(curve.evaluate(signal))
    }
}

/// A single published measurement
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    /// Index of the tick that produced the reading
    pub tick: u64,
    /// Raw probe signal in mV
    pub signal: f64,
    /// Calibrated and clamped value
    pub value: f64,
    /// Stored calibration points at the time of the reading, when telemetry is enabled
    pub calibration: Option<CalibrationSet>,
}

#[cfg(test)]
mod tests {
    use super::{Bounds, Evaluator};
    use crate::polyfit::Polynomial;

    #[test]
    fn values_above_the_upper_bound_are_clamped() {
        let curve = Polynomial::new(vec![20.0]);
        let evaluator = Evaluator::new(Bounds::PH);

        assert_eq!(evaluator.evaluate(&curve, 1500.0), 14.0);
    }

    #[test]
    fn values_below_the_lower_bound_are_clamped() {
        let curve = Polynomial::new(vec![0.0, -1.0]);
        let evaluator = Evaluator::new(Bounds::PH);

        assert_eq!(evaluator.evaluate(&curve, 3.0), 0.0);
    }

    #[test]
    fn disabled_bounds_pass_values_through() {
        let curve = Polynomial::new(vec![20.0]);
        let evaluator = Evaluator::new(Bounds::disabled());

        assert_eq!(evaluator.evaluate(&curve, 1500.0), 20.0);
    }

    #[test]
    fn one_sided_bounds_only_limit_one_side() {
        let bounds = Bounds {
            min: None,
            max: Some(14.0),
        };

        assert_eq!(bounds.clamp(-3.0), -3.0);
        assert_eq!(bounds.clamp(15.0), 14.0);
        assert!(bounds.clamp(f64::NAN).is_nan());
    }

    #[test]
    fn inverted_bounds_are_inconsistent() {
        let bounds = Bounds {
            min: Some(14.0),
            max: Some(0.0),
        };

        assert!(!bounds.is_consistent());
        assert!(Bounds::PH.is_consistent());
        assert!(Bounds::disabled().is_consistent());
    }
}
