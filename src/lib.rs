#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

pub mod calibration;
pub mod config;
pub mod error;
pub mod linalg;
pub mod math;
pub mod matrix;
pub mod polyfit;
pub mod reading;
pub mod sensor;
pub mod store;
pub mod tds;
pub mod telemetry;

pub use error::{CalibrationError, MatrixError};
pub use matrix::{transpose, Element, Matrix};

pub type Result<T> = ::std::result::Result<T, Box<dyn ::std::error::Error>>;
