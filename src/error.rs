use thiserror::Error;

/// Failures of the dense matrix kernel.
///
/// Operations that cannot produce a meaningful matrix return one of these rather than an empty
/// result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("{operation}: incompatible shapes {left:?} and {right:?}")]
    DimensionMismatch {
        operation: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("matrix is singular, no usable pivot in column {column}")]
    Singular { column: usize },
}

impl MatrixError {
    pub(crate) const fn mismatch(
        operation: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    ) -> Self {
        Self::DimensionMismatch {
            operation,
            left,
            right,
        }
    }
}

/// Failures raised while fitting or driving a probe calibration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// The points cannot define a unique curve, the previous fit is kept.
    #[error("degenerate calibration set: {reason}")]
    DegenerateCalibrationSet { reason: String },

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    /// The captured signal does not sit inside any known buffer window.
    #[error("signal {signal:.2} mV does not match a known buffer solution")]
    UnrecognisedBuffer { signal: f64 },

    #[error("signal source failed: {0}")]
    Signal(String),

    /// A probe constant computed during calibration fell outside its accepted window.
    #[error("calibration rejected: {0}")]
    OutOfRange(String),
}
