//! Satellite observations, as needed by the column operator.
use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2, ArrayView1};

use crate::{
    error::{check_shape, ShapeError},
    vertical::{LevelKind, LevelOrder},
};

/// Corner coordinates of each pixel footprint, shape `(nobs, ncorners)`. Corners are
/// listed in order around the pixel (either direction).
#[derive(Debug, Clone)]
pub struct PixelCorners {
    pub lat: Array2<f64>,
    pub lon: Array2<f64>,
}

impl PixelCorners {
    pub fn pixel(&self, iobs: usize) -> (ArrayView1<f64>, ArrayView1<f64>) {
        (self.lat.row(iobs), self.lon.row(iobs))
    }
}

/// A batch of satellite retrievals.
///
/// Pressures are in hPa and all vertical arrays are ordered from the surface up; see
/// [`SatelliteObs::flip_levels`] for data stored the other way around.
#[derive(Debug, Clone)]
pub struct SatelliteObs {
    pub time: Vec<DateTime<Utc>>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub corners: Option<PixelCorners>,
    /// `(nobs, nlevels)` pressure levels, interpreted according to `level_kind`.
    pub levels: Array2<f64>,
    pub level_kind: LevelKind,
    /// `(nobs, nlayers)` column averaging kernel.
    pub averaging_kernel: Array2<f64>,
    /// `(nobs, nlayers)` pressure weighting function.
    pub pressure_weight: Array2<f64>,
    /// `(nobs, nlayers)` a priori mixing ratio profile, in the retrieval's units.
    pub prior_profile: Option<Array2<f64>>,
    pub retrieved_column: Option<Array1<f64>>,
    pub qa_value: Option<Array1<f64>>,
}

impl SatelliteObs {
    pub fn nobs(&self) -> usize {
        self.time.len()
    }

    pub fn nlevels(&self) -> usize {
        self.levels.ncols()
    }

    pub fn nlayers(&self) -> usize {
        self.level_kind.nlayers(self.nlevels())
    }

    /// Check that every array agrees on the number of observations and layers.
    pub fn validate(&self) -> Result<(), ShapeError> {
        let nobs = self.nobs();
        check_shape("satellite latitude", &[nobs], self.lat.shape())?;
        check_shape("satellite longitude", &[nobs], self.lon.shape())?;
        if let Some(corners) = &self.corners {
            let ncorner = corners.lat.ncols();
            if ncorner < 3 {
                return Err(ShapeError::mismatch("pixel corner latitudes", &[nobs, 4], corners.lat.shape()));
            }
            check_shape("pixel corner latitudes", &[nobs, ncorner], corners.lat.shape())?;
            check_shape("pixel corner longitudes", &[nobs, ncorner], corners.lon.shape())?;
        }

        if self.levels.nrows() != nobs {
            return Err(ShapeError::mismatch("pressure levels", &[nobs, self.nlevels()], self.levels.shape()));
        }
        let nlay = self.nlayers();
        if nlay == 0 {
            return Err(ShapeError::empty("satellite vertical layers"));
        }
        check_shape("averaging kernel", &[nobs, nlay], self.averaging_kernel.shape())?;
        check_shape("pressure weight", &[nobs, nlay], self.pressure_weight.shape())?;
        if let Some(prior) = &self.prior_profile {
            check_shape("prior profile", &[nobs, nlay], prior.shape())?;
        }
        if let Some(col) = &self.retrieved_column {
            check_shape("retrieved column", &[nobs], col.shape())?;
        }
        if let Some(qa) = &self.qa_value {
            check_shape("QA value", &[nobs], qa.shape())?;
        }
        Ok(())
    }

    /// Reverse the vertical axis of the levels, averaging kernel, pressure weight and prior.
    pub fn flip_levels(&mut self) {
        fn flip(arr: &Array2<f64>) -> Array2<f64> {
            arr.slice(s![.., ..;-1]).to_owned()
        }
        self.levels = flip(&self.levels);
        self.averaging_kernel = flip(&self.averaging_kernel);
        self.pressure_weight = flip(&self.pressure_weight);
        self.prior_profile = self.prior_profile.as_ref().map(flip);
    }

    /// Put the vertical arrays in surface-first order given how they were stored.
    pub fn ensure_surface_first(&mut self, stored_order: LevelOrder) {
        if let LevelOrder::TopFirst = stored_order {
            self.flip_levels();
        }
    }

    /// Multiply the pressure levels by `factor`, e.g. to convert Pa to hPa.
    pub fn scale_pressure(&mut self, factor: f64) {
        self.levels.mapv_inplace(|p| p * factor);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    /// Two observations on a 3-edge (2-layer) grid, stored surface first.
    pub(crate) fn two_obs() -> SatelliteObs {
        let t0 = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
        SatelliteObs {
            time: vec![t0, t0 + chrono::Duration::minutes(30)],
            lat: array![0.5, 1.5],
            lon: array![0.5, 1.5],
            corners: None,
            levels: array![[1000.0, 500.0, 0.1], [990.0, 500.0, 0.1]],
            level_kind: LevelKind::Edges,
            averaging_kernel: array![[1.0, 0.5], [0.9, 0.4]],
            pressure_weight: array![[0.6, 0.4], [0.5, 0.5]],
            prior_profile: Some(array![[1800.0, 1700.0], [1810.0, 1710.0]]),
            retrieved_column: Some(array![1850.0, 1860.0]),
            qa_value: Some(array![1.0, 0.2]),
        }
    }

    #[test]
    fn test_validate() {
        let obs = two_obs();
        obs.validate().unwrap();
        assert_eq!(obs.nlayers(), 2);

        let mut bad = two_obs();
        bad.pressure_weight = array![[0.6, 0.4, 0.0], [0.5, 0.5, 0.0]];
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("pressure weight"), "{err}");

        let mut bad = two_obs();
        bad.level_kind = LevelKind::Centers;
        assert!(bad.validate().is_err(), "centers need one AK value per level");
    }

    #[test]
    fn test_flip_levels() {
        let mut obs = two_obs();
        obs.ensure_surface_first(LevelOrder::TopFirst);
        assert_eq!(obs.levels.row(0).to_vec(), vec![0.1, 500.0, 1000.0]);
        assert_eq!(obs.averaging_kernel.row(1).to_vec(), vec![0.4, 0.9]);
        assert_eq!(obs.prior_profile.unwrap().row(0).to_vec(), vec![1700.0, 1800.0]);
    }
}
