use itertools::Itertools;
use num_traits::Float;
use std::fmt::Debug;

#[derive(Debug, thiserror::Error)]
pub enum InterpolationError {
    #[error("Input arrays were different lengths (x.len() = {x_len}, y.len() = {y_len}")]
    InputLengthMismatch { x_len: usize, y_len: usize },
    #[error(
        "Input arrays were too short, needed at least {req_len} elements but got only {actual_len}"
    )]
    InputTooShort { req_len: usize, actual_len: usize },
    #[error(
        "Requested output coordinate ({out}) falls outside the input domain ({left} to {right})"
    )]
    OutOfDomain {
        left: String,
        right: String,
        out: String,
    },
    #[error("Invalid input coordinate: {0}")]
    InvalidCoordinate(String),
}

pub trait InterpolationMethod {
    fn interp1d<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
    ) -> Result<F, InterpolationError>;

    fn check_1d_inputs<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
        must_be_in_bounds: bool,
        min_len: usize,
    ) -> Result<(), InterpolationError> {
        if input_x.len() != input_y.len() {
            return Err(InterpolationError::InputLengthMismatch {
                x_len: input_x.len(),
                y_len: input_y.len(),
            });
        }

        // Now we know both are the same length, so only need to test 1
        if input_x.len() < min_len {
            return Err(InterpolationError::InputTooShort {
                req_len: min_len,
                actual_len: input_x.len(),
            });
        }

        if !output_x.is_finite() {
            return Err(InterpolationError::InvalidCoordinate(format!("{output_x:?}")));
        }

        if must_be_in_bounds {
            let (left_bound, right_bound) = match input_x.iter().copied().minmax_by(|a, b| {
                a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
            }) {
                itertools::MinMaxResult::NoElements => return Ok(()),
                itertools::MinMaxResult::OneElement(x) => (x, x),
                itertools::MinMaxResult::MinMax(a, b) => (a, b),
            };

            if output_x < left_bound || output_x > right_bound {
                return Err(InterpolationError::OutOfDomain {
                    left: format!("{left_bound:?}"),
                    right: format!("{right_bound:?}"),
                    out: format!("{output_x:?}"),
                });
            }
        }

        Ok(())
    }
}

/// Piecewise linear interpolation over inputs sorted in either direction.
///
/// With extrapolation allowed, outputs beyond the ends of the input get the value at
/// the nearer end point (i.e. the profile is held constant rather than extended along
/// the end slope).
pub struct LinearInterp {
    allow_extrapolation: bool,
}

impl LinearInterp {
    pub fn new(allow_extrapolation: bool) -> Self {
        Self {
            allow_extrapolation,
        }
    }
}

impl InterpolationMethod for LinearInterp {
    fn interp1d<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
    ) -> Result<F, InterpolationError> {
        self.check_1d_inputs(input_x, input_y, output_x, !self.allow_extrapolation, 1)?;
        let n = input_x.len();
        if n == 1 {
            return Ok(input_y[0]);
        }

        let ascending = input_x[0] <= input_x[n - 1];
        let (first, last) = if ascending { (0, n - 1) } else { (n - 1, 0) };
        if output_x <= input_x[first] {
            return Ok(input_y[first]);
        }
        if output_x >= input_x[last] {
            return Ok(input_y[last]);
        }

        for (i, (x0, x1)) in input_x.iter().copied().tuple_windows().enumerate() {
            let (lo, hi) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
            if output_x < lo || output_x > hi {
                continue;
            }
            if hi == lo {
                return Ok(input_y[i]);
            }
            let w = (output_x - x0) / (x1 - x0);
            return Ok(input_y[i] + w * (input_y[i + 1] - input_y[i]));
        }

        Err(InterpolationError::InvalidCoordinate(format!(
            "input x values are not monotonic, could not bracket {output_x:?}"
        )))
    }
}

/// Interpolate linearly in ln(pressure).
///
/// `pressure` may be ordered either way but every value must be positive. `p_out` must
/// be positive too, unless extrapolation is allowed and it is at or above the top of
/// `pressure`, in which case the top value is returned.
pub fn log_pressure_interp(
    pressure: &[f64],
    values: &[f64],
    p_out: f64,
    allow_extrapolation: bool,
) -> Result<f64, InterpolationError> {
    if let Some(p) = pressure.iter().find(|p| !(**p > 0.0)) {
        return Err(InterpolationError::InvalidCoordinate(format!(
            "pressure must be positive to take its logarithm, got {p}"
        )));
    }
    if allow_extrapolation && p_out.is_finite() && pressure.len() == values.len() {
        let top = pressure
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (i, *p));
        if let Some((itop, p_top)) = top {
            if p_out <= p_top {
                return Ok(values[itop]);
            }
        }
    }
    if !(p_out > 0.0) {
        return Err(InterpolationError::InvalidCoordinate(format!(
            "output pressure must be positive to take its logarithm, got {p_out}"
        )));
    }

    let ln_p = pressure.iter().map(|p| p.ln()).collect_vec();
    LinearInterp::new(allow_extrapolation).interp1d(&ln_p, values, p_out.ln())
}
