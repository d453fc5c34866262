//! Common errors across the gcsat-rs crate

/// Errors related to working with datetimes
#[derive(Debug, thiserror::Error)]
pub enum DateTimeError {
    #[error("Could not parse time units '{0}', expected '<unit> since <reference datetime>'")]
    InvalidUnits(String),
    #[error("Unknown time unit '{0}'")]
    UnknownUnit(String),
    #[error("Could not parse '{0}' as a date and time")]
    InvalidDatetime(String),
    #[error("Time value {value} is not representable with units '{units}'")]
    OutOfRange { value: f64, units: String },
}

/// Errors raised when arrays describing the same set of observations or model
/// fields disagree about their shapes.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("{field} has shape {actual:?}, expected {expected:?}")]
    Mismatch {
        field: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("{field} is ragged: element {index} has length {actual}, expected {expected}")]
    Ragged {
        field: String,
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{0} must not be empty")]
    Empty(String),
}

impl ShapeError {
    pub fn mismatch<S: ToString>(field: S, expected: &[usize], actual: &[usize]) -> Self {
        Self::Mismatch {
            field: field.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub fn ragged<S: ToString>(field: S, index: usize, expected: usize, actual: usize) -> Self {
        Self::Ragged {
            field: field.to_string(),
            index,
            expected,
            actual,
        }
    }

    pub fn empty<S: ToString>(field: S) -> Self {
        Self::Empty(field.to_string())
    }
}

/// Check that an array has the expected shape, returning a [`ShapeError::Mismatch`] naming `field` if not.
pub fn check_shape(field: &str, expected: &[usize], actual: &[usize]) -> Result<(), ShapeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ShapeError::mismatch(field, expected, actual))
    }
}
