//! The column operator: model profiles sampled like a satellite would see them.
//!
//! For each observation the closest model time and the overlapping model cells are found,
//! the model profile is put on the retrieval's vertical grid, and the retrieval's
//! averaging kernel and pressure weighting function are applied. The result can be
//! compared directly with the retrieved column.
use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayView1, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
    model::ModelFields,
    observations::SatelliteObs,
    regrid::{regrid_gc_to_sat_pixels, CellWeights},
    satellites::SatelliteOperator,
    settings::Settings,
    time_match::get_closest_time,
    units::{dmf_conv_factor, UnknownUnitError},
    vertical::{remap_profile, SatelliteVerticalGrid, VerticalError},
};

const PW_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    #[error("{field} has {actual} layers, expected {expected}")]
    LayerMismatch { field: &'static str, expected: usize, actual: usize },
    #[error("{0} contains non-finite values")]
    NonFinite(&'static str),
    #[error("Pressure weights sum to {0}, which cannot be normalized")]
    BadPressureWeightSum(f64),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Could not convert mole fraction units")]
    Units(#[from] UnknownUnitError),
    #[error("Could not match satellite times to model times")]
    TimeMatch,
    #[error("Could not find the model cells for the satellite pixels")]
    Colocation,
}

/// Outcome of the operator for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObsStatus {
    Valid,
    /// QA value below the configured minimum, or missing.
    FailedQa,
    /// No model output close enough in time.
    NoTimeMatch,
    /// Pixel is off a regional model grid.
    OutsideModelGrid,
    /// Too little of the pixel (or of its vertical extent) is covered by the model.
    InsufficientCoverage,
    /// Non-finite or inconsistent satellite levels, averaging kernel or weights.
    InvalidSatelliteData,
    /// Non-finite or non-monotonic model values in a contributing cell.
    MissingModelData,
}

/// Number of observations with each status, in [`ObsStatus`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary(IndexMap<ObsStatus, usize>);

impl StatusSummary {
    fn from_statuses(statuses: &[ObsStatus]) -> Self {
        let mut counts: IndexMap<ObsStatus, usize> = ObsStatus::iter().map(|s| (s, 0)).collect();
        for s in statuses {
            *counts.entry(*s).or_default() += 1;
        }
        Self(counts)
    }

    pub fn count(&self, status: ObsStatus) -> usize {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObsStatus, usize)> + '_ {
        self.0.iter().map(|(s, n)| (*s, *n))
    }
}

/// Model minus satellite statistics over observations with both values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparisonStats {
    pub n: usize,
    pub mean_bias: f64,
    pub std: f64,
    pub rmse: f64,
    /// Pearson correlation; NaN with fewer than two points or no variance.
    pub r: f64,
}

/// Model columns sampled at satellite observations.
#[derive(Debug, Clone)]
pub struct ModelColumns {
    pub operator: String,
    pub species: String,
    /// Mole fraction units of the model and retrieved columns.
    pub units: String,
    pub time: Vec<DateTime<Utc>>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    /// NaN where `status` is not [`ObsStatus::Valid`].
    pub model_column: Array1<f64>,
    /// `(nobs, nlayers)` model mixing ratio on the satellite layers.
    pub model_profile: Array2<f64>,
    pub retrieved_column: Option<Array1<f64>>,
    pub status: Vec<ObsStatus>,
    /// Index into `model_times` of the model snapshot used for each observation.
    pub time_index: Vec<Option<usize>>,
    pub model_times: Vec<DateTime<Utc>>,
    pub n_cells: Vec<usize>,
    pub coverage: Array1<f64>,
    /// Mean (latitude, longitude) spacing of the model grid, in degrees.
    pub grid_resolution: (f64, f64),
}

impl ModelColumns {
    pub fn nobs(&self) -> usize {
        self.status.len()
    }

    pub fn summary(&self) -> StatusSummary {
        StatusSummary::from_statuses(&self.status)
    }

    /// Compare valid model columns with the retrieved ones. Returns `None` if there is
    /// no retrieved column or no observation has both values.
    pub fn comparison(&self) -> Option<ComparisonStats> {
        let retrieved = self.retrieved_column.as_ref()?;
        let pairs: Vec<(f64, f64)> = self
            .status
            .iter()
            .zip(self.model_column.iter().zip(retrieved.iter()))
            .filter(|(s, (m, r))| **s == ObsStatus::Valid && m.is_finite() && r.is_finite())
            .map(|(_, (m, r))| (*m, *r))
            .collect();
        if pairs.is_empty() {
            return None;
        }

        let n = pairs.len() as f64;
        let diffs = pairs.iter().map(|(m, r)| m - r).collect::<Vec<_>>();
        let mean_bias = diffs.iter().sum::<f64>() / n;
        let std = (diffs.iter().map(|d| (d - mean_bias).powi(2)).sum::<f64>() / n).sqrt();
        let rmse = (diffs.iter().map(|d| d * d).sum::<f64>() / n).sqrt();

        let mean_m = pairs.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_r = pairs.iter().map(|p| p.1).sum::<f64>() / n;
        let (cov, var_m, var_r) = pairs.iter().fold((0.0, 0.0, 0.0), |(c, vm, vr), (m, r)| {
            let (dm, dr) = (m - mean_m, r - mean_r);
            (c + dm * dr, vm + dm * dm, vr + dr * dr)
        });
        let r = if pairs.len() > 1 && var_m > 0.0 && var_r > 0.0 {
            cov / (var_m * var_r).sqrt()
        } else {
            f64::NAN
        };

        Some(ComparisonStats { n: pairs.len(), mean_bias, std, rmse, r })
    }
}

/// Apply a column averaging kernel and pressure weighting function to a model profile.
///
/// With a prior profile `xa` this computes `sum(pw * (xa + ak * (x - xa)))`, otherwise
/// `sum(pw * ak * x)`. If `normalize` is true, pressure weights that do not sum to one
/// are rescaled first.
pub fn apply_averaging_kernel(
    model_profile: ArrayView1<f64>,
    averaging_kernel: ArrayView1<f64>,
    pressure_weight: ArrayView1<f64>,
    prior_profile: Option<ArrayView1<f64>>,
    normalize: bool,
) -> Result<f64, OperatorError> {
    let n = model_profile.len();
    check_layers("averaging kernel", n, averaging_kernel.len())?;
    check_layers("pressure weight", n, pressure_weight.len())?;
    if let Some(prior) = &prior_profile {
        check_layers("prior profile", n, prior.len())?;
    }

    check_finite("model profile", model_profile)?;
    check_finite("averaging kernel", averaging_kernel)?;
    check_finite("pressure weight", pressure_weight)?;
    if let Some(prior) = prior_profile {
        check_finite("prior profile", prior)?;
    }

    let pw_sum = pressure_weight.sum();
    let pw_scale = if normalize && (pw_sum - 1.0).abs() > PW_SUM_TOLERANCE {
        if pw_sum <= 0.0 {
            return Err(OperatorError::BadPressureWeightSum(pw_sum));
        }
        log::debug!("Pressure weights sum to {pw_sum}, normalizing");
        1.0 / pw_sum
    } else {
        1.0
    };

    let column = match prior_profile {
        Some(prior) => Zip::from(&model_profile)
            .and(&averaging_kernel)
            .and(&pressure_weight)
            .and(&prior)
            .fold(0.0, |acc, &x, &a, &w, &xa| acc + w * pw_scale * (xa + a * (x - xa))),
        None => Zip::from(&model_profile)
            .and(&averaging_kernel)
            .and(&pressure_weight)
            .fold(0.0, |acc, &x, &a, &w| acc + w * pw_scale * a * x),
    };
    Ok(column)
}

fn check_layers(field: &'static str, expected: usize, actual: usize) -> Result<(), OperatorError> {
    if expected == actual {
        Ok(())
    } else {
        Err(OperatorError::LayerMismatch { field, expected, actual })
    }
}

fn check_finite(field: &'static str, values: ArrayView1<f64>) -> Result<(), OperatorError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(OperatorError::NonFinite(field))
    }
}

struct ObsResult {
    status: ObsStatus,
    column: f64,
    profile: Option<Array1<f64>>,
}

impl ObsResult {
    fn rejected(status: ObsStatus) -> Self {
        Self { status, column: f64::NAN, profile: None }
    }
}

/// Sample the model at every observation in `sat`.
///
/// `sat` must already be in hPa and ordered surface first (the readers take care of
/// this). Observations that cannot be processed are not errors: they get a NaN column
/// and a status saying why. Errors are returned only for inputs that are unusable as
/// a whole, such as inconsistent array shapes or unknown units.
pub fn get_model_columns(
    model: &ModelFields,
    sat: &SatelliteObs,
    operator_name: &str,
    operator: &SatelliteOperator,
    settings: &Settings,
) -> error_stack::Result<ModelColumns, OperatorError> {
    model
        .validate()
        .change_context_lazy(|| OperatorError::InvalidInput("model fields".to_string()))?;
    sat.validate()
        .change_context_lazy(|| OperatorError::InvalidInput("satellite observations".to_string()))?;
    let grid = model
        .grid()
        .change_context_lazy(|| OperatorError::InvalidInput("model grid".to_string()))?;

    let out_units = settings.output.units.as_deref().unwrap_or(&operator.units);
    let model_factor = dmf_conv_factor(&model.units, out_units)
        .map_err(OperatorError::from)
        .attach_printable_lazy(|| format!("converting model {} from {} to {out_units}", model.species, model.units))?;
    let sat_factor = dmf_conv_factor(&operator.units, out_units)
        .map_err(OperatorError::from)
        .attach_printable_lazy(|| format!("converting satellite values from {} to {out_units}", operator.units))?;
    let prior = sat.prior_profile.as_ref().map(|p| p * sat_factor);

    let time_index = get_closest_time(&model.times, &sat.time, settings.colocation.max_time_offset())
        .change_context(OperatorError::TimeMatch)?;
    let cell_weights = regrid_gc_to_sat_pixels(
        sat.lat.view(),
        sat.lon.view(),
        sat.corners.as_ref(),
        &grid,
        &settings.colocation,
    )
    .change_context(OperatorError::Colocation)?;

    let min_qa = settings.filters.min_qa;
    if min_qa.is_some() && sat.qa_value.is_none() {
        log::warn!("A minimum QA value is configured, but the {operator_name} data has no QA values; no QA filtering will be done");
    }

    log::info!(
        "Applying {operator_name} operator to {} observations using {} model times",
        sat.nobs(),
        model.ntime()
    );

    let results: Vec<ObsResult> = (0..sat.nobs())
        .into_par_iter()
        .map(|i| {
            if let (Some(min_qa), Some(qa)) = (min_qa, &sat.qa_value) {
                if !(qa[i] >= min_qa) {
                    return ObsResult::rejected(ObsStatus::FailedQa);
                }
            }
            let Some(itime) = time_index[i] else {
                log::debug!("Observation {i} at {} has no model time within the allowed offset", sat.time[i]);
                return ObsResult::rejected(ObsStatus::NoTimeMatch);
            };
            let weights = &cell_weights[i];
            if weights.is_empty() {
                log::debug!("Observation {i} at ({}, {}) is outside the model grid", sat.lat[i], sat.lon[i]);
                return ObsResult::rejected(ObsStatus::OutsideModelGrid);
            }
            if weights.coverage < settings.colocation.min_coverage {
                log::debug!(
                    "Observation {i} is only {:.1}% covered by the model grid",
                    weights.coverage * 100.0
                );
                return ObsResult::rejected(ObsStatus::InsufficientCoverage);
            }

            let sat_grid = match SatelliteVerticalGrid::new(sat.levels.row(i), sat.level_kind) {
                Ok(g) => g,
                Err(e) => {
                    log::debug!("Observation {i} has invalid pressure levels: {e}");
                    return ObsResult::rejected(ObsStatus::InvalidSatelliteData);
                }
            };
            let profile = match horizontal_profile(model, itime, weights, &sat_grid, settings.vertical.extrapolate) {
                Ok(p) => p * model_factor,
                Err(status) => {
                    log::debug!("Observation {i} rejected with status {status}");
                    return ObsResult::rejected(status);
                }
            };

            let column = apply_averaging_kernel(
                profile.view(),
                sat.averaging_kernel.row(i),
                sat.pressure_weight.row(i),
                prior.as_ref().map(|p| p.row(i)),
                settings.vertical.normalize_pressure_weight,
            );
            match column {
                Ok(column) => ObsResult { status: ObsStatus::Valid, column, profile: Some(profile) },
                Err(e) => {
                    log::debug!("Observation {i} has invalid retrieval data: {e}");
                    ObsResult::rejected(ObsStatus::InvalidSatelliteData)
                }
            }
        })
        .collect();

    let nlay = sat.nlayers();
    let mut model_profile = Array2::from_elem((sat.nobs(), nlay), f64::NAN);
    for (mut row, res) in model_profile.rows_mut().into_iter().zip(results.iter()) {
        if let Some(p) = &res.profile {
            row.assign(p);
        }
    }

    let columns = ModelColumns {
        operator: operator_name.to_string(),
        species: operator.species.clone(),
        units: out_units.to_string(),
        time: sat.time.clone(),
        lat: sat.lat.clone(),
        lon: sat.lon.clone(),
        model_column: results.iter().map(|r| r.column).collect(),
        model_profile,
        retrieved_column: sat.retrieved_column.as_ref().map(|c| c * sat_factor),
        status: results.iter().map(|r| r.status).collect(),
        time_index,
        model_times: model.times.clone(),
        n_cells: cell_weights.iter().map(|w| w.cells.len()).collect(),
        coverage: cell_weights.iter().map(|w| w.coverage).collect(),
        grid_resolution: grid.resolution(),
    };

    let summary = columns.summary();
    log::info!(
        "{} of {} observations produced a model column",
        summary.count(ObsStatus::Valid),
        summary.total()
    );
    for (status, n) in summary.iter().filter(|(s, n)| *s != ObsStatus::Valid && *n > 0) {
        log::info!("  {n} observations rejected as {status}");
    }
    Ok(columns)
}

/// Average of the model profiles in the contributing cells, each on the satellite layers.
fn horizontal_profile(
    model: &ModelFields,
    itime: usize,
    weights: &CellWeights,
    sat_grid: &SatelliteVerticalGrid,
    extrapolate: bool,
) -> Result<Array1<f64>, ObsStatus> {
    let mut profile = Array1::zeros(sat_grid.nlayers());
    for &(cell, w) in weights.cells.iter() {
        let edges = model.column_edges(itime, cell);
        let values = model.column_profile(itime, cell);
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ObsStatus::MissingModelData);
        }
        let remapped = remap_profile(edges.view(), values, sat_grid, extrapolate).map_err(|e| match e {
            VerticalError::Interpolation(_) => ObsStatus::InsufficientCoverage,
            _ => ObsStatus::MissingModelData,
        })?;
        profile.scaled_add(w, &remapped);
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{tests::small_model, ModelPressure},
        observations::tests::two_obs,
        settings::SpatialMethod,
        vertical::LevelKind,
    };
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};
    use rstest::{fixture, rstest};

    #[fixture]
    fn point_settings() -> Settings {
        let mut settings = Settings::default();
        settings.colocation.method = SpatialMethod::Point;
        settings
    }

    #[test]
    fn test_averaging_kernel() {
        let x = array![1850.0, 1750.0];
        let ak = array![1.0, 0.5];
        let pw = array![0.6, 0.4];
        let prior = array![1800.0, 1700.0];

        let with_prior = apply_averaging_kernel(x.view(), ak.view(), pw.view(), Some(prior.view()), true).unwrap();
        assert_abs_diff_eq!(with_prior, 1800.0, epsilon = 1e-9);

        let without_prior = apply_averaging_kernel(x.view(), ak.view(), pw.view(), None, true).unwrap();
        assert_abs_diff_eq!(without_prior, 1460.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pressure_weight_normalization() {
        let x = array![1850.0, 1750.0];
        let ak = array![1.0, 0.5];
        let pw = array![1.2, 0.8];
        let prior = array![1800.0, 1700.0];

        let normed = apply_averaging_kernel(x.view(), ak.view(), pw.view(), Some(prior.view()), true).unwrap();
        assert_abs_diff_eq!(normed, 1800.0, epsilon = 1e-9);
        let raw = apply_averaging_kernel(x.view(), ak.view(), pw.view(), Some(prior.view()), false).unwrap();
        assert_abs_diff_eq!(raw, 3600.0, epsilon = 1e-9);

        let zero = array![0.0, 0.0];
        let err = apply_averaging_kernel(x.view(), ak.view(), zero.view(), None, true).unwrap_err();
        assert!(matches!(err, OperatorError::BadPressureWeightSum(_)));
    }

    #[test]
    fn test_averaging_kernel_bad_inputs() {
        let x = array![1850.0, 1750.0];
        let pw = array![0.6, 0.4];
        let nan_ak = array![1.0, f64::NAN];
        let err = apply_averaging_kernel(x.view(), nan_ak.view(), pw.view(), None, true).unwrap_err();
        assert!(matches!(err, OperatorError::NonFinite("averaging kernel")));

        let short_ak = array![1.0];
        let err = apply_averaging_kernel(x.view(), short_ak.view(), pw.view(), None, true).unwrap_err();
        assert!(matches!(err, OperatorError::LayerMismatch { expected: 2, actual: 1, .. }));
    }

    #[rstest]
    fn test_model_columns(point_settings: Settings) {
        let model = small_model();
        let sat = two_obs();
        let op = SatelliteOperator::default();
        let cols = get_model_columns(&model, &sat, "test", &op, &point_settings).unwrap();

        assert_eq!(cols.status, vec![ObsStatus::Valid, ObsStatus::Valid]);
        // The second observation is halfway between two model times and takes the earlier one
        assert_eq!(cols.time_index, vec![Some(1), Some(1)]);
        assert_eq!(cols.units, "ppb");
        assert_abs_diff_eq!(cols.model_profile, array![[1810.0, 1710.0], [1810.0, 1710.0]], epsilon = 1e-6);
        assert_abs_diff_eq!(cols.model_column[0], 1768.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cols.model_column[1], 1760.0, epsilon = 1e-6);

        let stats = cols.comparison().unwrap();
        assert_eq!(stats.n, 2);
        assert_abs_diff_eq!(stats.mean_bias, -91.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.std, 9.0, epsilon = 1e-6);
        assert_abs_diff_eq!(stats.rmse, 8362.0_f64.sqrt(), epsilon = 1e-6);
        assert_abs_diff_eq!(stats.r, -1.0, epsilon = 1e-9);
    }

    #[rstest]
    fn test_rejections(mut point_settings: Settings) {
        let model = small_model();
        let op = SatelliteOperator::default();
        point_settings.filters.min_qa = Some(0.5);

        let mut sat = two_obs();
        sat.lat[0] = 50.0;
        let cols = get_model_columns(&model, &sat, "test", &op, &point_settings).unwrap();
        assert_eq!(cols.status, vec![ObsStatus::OutsideModelGrid, ObsStatus::FailedQa]);
        assert!(cols.model_column.iter().all(|v| v.is_nan()));
        assert!(cols.comparison().is_none());

        let mut sat = two_obs();
        sat.time[0] = sat.time[0] + chrono::Duration::hours(5);
        sat.averaging_kernel[(1, 0)] = f64::NAN;
        point_settings.filters.min_qa = None;
        let cols = get_model_columns(&model, &sat, "test", &op, &point_settings).unwrap();
        assert_eq!(cols.status, vec![ObsStatus::NoTimeMatch, ObsStatus::InvalidSatelliteData]);

        let summary = cols.summary();
        assert_eq!(summary.count(ObsStatus::NoTimeMatch), 1);
        assert_eq!(summary.count(ObsStatus::Valid), 0);
        assert_eq!(summary.total(), 2);
    }

    #[rstest]
    fn test_missing_model_data(point_settings: Settings) {
        let mut model = small_model();
        model.mixing_ratio[(1, 0, 0, 0)] = f64::NAN;
        let cols = get_model_columns(&model, &two_obs(), "test", &SatelliteOperator::default(), &point_settings).unwrap();
        assert_eq!(cols.status, vec![ObsStatus::MissingModelData, ObsStatus::Valid]);
    }

    #[rstest]
    fn test_output_units(mut point_settings: Settings) {
        point_settings.output.units = Some("ppm".to_string());
        let cols = get_model_columns(&small_model(), &two_obs(), "test", &SatelliteOperator::default(), &point_settings)
            .unwrap();
        assert_eq!(cols.units, "ppm");
        assert_abs_diff_eq!(cols.model_column[0], 1.768, epsilon = 1e-9);
        assert_abs_diff_eq!(cols.retrieved_column.unwrap()[0], 1.85, epsilon = 1e-9);

        point_settings.output.units = Some("furlongs".to_string());
        let err = get_model_columns(&small_model(), &two_obs(), "test", &SatelliteOperator::default(), &point_settings)
            .unwrap_err();
        assert!(matches!(err.current_context(), OperatorError::Units(_)));
    }

    #[rstest]
    fn test_overlap_matches_point(point_settings: Settings) {
        let mut settings = point_settings.clone();
        settings.colocation.method = SpatialMethod::Overlap;
        let point = get_model_columns(&small_model(), &two_obs(), "test", &SatelliteOperator::default(), &point_settings)
            .unwrap();
        let overlap = get_model_columns(&small_model(), &two_obs(), "test", &SatelliteOperator::default(), &settings)
            .unwrap();
        assert_eq!(overlap.n_cells, vec![1, 1]);
        assert_abs_diff_eq!(point.model_column, overlap.model_column, epsilon = 1e-9);
    }

    #[rstest]
    fn test_hybrid_model_pressure(point_settings: Settings) {
        // Same coefficients as the fixed edges (1000, 500, 0.01 hPa) except where the
        // first observation falls, which has a 900 hPa surface: edges 900, 460, 0.01
        let mut model = small_model();
        let mut surface_pressure = Array3::from_elem((3, 2, 2), 1000.0);
        for t in 0..3 {
            surface_pressure[(t, 0, 0)] = 900.0;
        }
        model.pressure = ModelPressure::Hybrid {
            ap: array![0.0, 100.0, 0.01],
            bp: array![1.0, 0.4, 0.0],
            surface_pressure,
        };
        let cols = get_model_columns(&model, &two_obs(), "test", &SatelliteOperator::default(), &point_settings).unwrap();
        assert_eq!(cols.status, vec![ObsStatus::Valid, ObsStatus::Valid]);

        // The upper satellite layer (500 to 0.1 hPa) takes 40 hPa of the lower model layer
        let upper = 1710.0 + 40.0 * 100.0 / 499.9;
        assert_abs_diff_eq!(cols.model_profile[(0, 0)], 1810.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cols.model_profile[(0, 1)], upper, epsilon = 1e-6);
        let expected = 0.6 * 1810.0 + 0.4 * (1700.0 + 0.5 * (upper - 1700.0));
        assert_abs_diff_eq!(cols.model_column[0], expected, epsilon = 1e-6);
        assert_abs_diff_eq!(cols.model_column[1], 1760.0, epsilon = 1e-6);
    }

    #[rstest]
    fn test_level_centers(mut point_settings: Settings) {
        // Model layer centers are at 750 and 250.005 hPa
        let upper_center: f64 = 0.5 * (500.0 + 0.01);
        let p_mid = (750.0 * upper_center).sqrt();
        let mut sat = two_obs();
        sat.level_kind = LevelKind::Centers;
        sat.levels = array![[p_mid, upper_center], [1000.0, 0.0]];

        let cols = get_model_columns(&small_model(), &sat, "test", &SatelliteOperator::default(), &point_settings).unwrap();
        assert_eq!(cols.status, vec![ObsStatus::Valid, ObsStatus::Valid]);
        assert_abs_diff_eq!(cols.model_profile, array![[1760.0, 1710.0], [1810.0, 1710.0]], epsilon = 1e-6);
        assert_abs_diff_eq!(cols.model_column[0], 0.6 * 1760.0 + 0.4 * 1705.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cols.model_column[1], 1760.0, epsilon = 1e-6);

        // Without extrapolation, levels beyond the model's layer centers are rejected
        point_settings.vertical.extrapolate = false;
        let cols = get_model_columns(&small_model(), &sat, "test", &SatelliteOperator::default(), &point_settings).unwrap();
        assert_eq!(cols.status, vec![ObsStatus::Valid, ObsStatus::InsufficientCoverage]);
    }
}
