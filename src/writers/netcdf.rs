use std::path::Path;

use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use itertools::Itertools;
use ndarray::{Array1, ArrayView1, ArrayView2};
use netcdf::Extents;
use strum::IntoEnumIterator;

use super::{superobs::SuperObs, WriteError};
use crate::{
    operator::{ModelColumns, ObsStatus},
    units::dmf_long_name,
};

const OBS_DIM: &str = "obs";
const LAYER_DIM: &str = "layer";
const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00";

fn seconds_since_epoch(t: &DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

fn status_code(status: ObsStatus) -> i8 {
    ObsStatus::iter().position(|s| s == status).unwrap_or(0) as i8
}

fn write_time_var(nc: &mut netcdf::FileMut, name: &str, values: &[f64], long_name: &str) -> Result<(), netcdf::Error> {
    let mut var = nc.add_variable::<f64>(name, &[OBS_DIM])?;
    var.set_fill_value(f64::NAN)?;
    var.put_values(values, Extents::All)?;
    var.put_attribute("long_name", long_name)?;
    var.put_attribute("units", TIME_UNITS)?;
    var.put_attribute("calendar", "gregorian")?;
    Ok(())
}

fn write_1d_var(
    nc: &mut netcdf::FileMut,
    name: &str,
    values: ArrayView1<f64>,
    units: &str,
    long_name: &str,
) -> Result<(), netcdf::Error> {
    let mut var = nc.add_variable::<f64>(name, &[OBS_DIM])?;
    var.set_fill_value(f64::NAN)?;
    var.put(values, Extents::All)?;
    var.put_attribute("units", units)?;
    var.put_attribute("long_name", long_name)?;
    Ok(())
}

fn write_2d_var(
    nc: &mut netcdf::FileMut,
    name: &str,
    values: ArrayView2<f64>,
    units: &str,
    long_name: &str,
) -> Result<(), netcdf::Error> {
    let mut var = nc.add_variable::<f64>(name, &[OBS_DIM, LAYER_DIM])?;
    var.set_fill_value(f64::NAN)?;
    var.put(values, Extents::All)?;
    var.put_attribute("units", units)?;
    var.put_attribute("long_name", long_name)?;
    Ok(())
}

fn mole_fraction_units(units: &str) -> String {
    match dmf_long_name(units) {
        Ok(long) => format!("{units} ({long})"),
        Err(_) => units.to_string(),
    }
}

pub(super) fn write_columns_netcdf(path: &Path, columns: &ModelColumns) -> error_stack::Result<(), WriteError> {
    let mut nc = netcdf::create(path).change_context_lazy(|| WriteError::CouldNotCreate(path.to_path_buf()))?;
    let err = |name: &str| WriteError::Netcdf(name.to_string());

    nc.add_dimension(OBS_DIM, columns.nobs()).change_context_lazy(|| err(OBS_DIM))?;
    nc.add_dimension(LAYER_DIM, columns.model_profile.ncols()).change_context_lazy(|| err(LAYER_DIM))?;
    nc.add_attribute("operator", columns.operator.as_str()).change_context_lazy(|| err("operator"))?;
    nc.add_attribute("species", columns.species.as_str()).change_context_lazy(|| err("species"))?;

    let times = columns.time.iter().map(seconds_since_epoch).collect_vec();
    write_time_var(&mut nc, "time", &times, "observation time").change_context_lazy(|| err("time"))?;
    let model_times = columns
        .time_index
        .iter()
        .map(|it| it.map(|i| seconds_since_epoch(&columns.model_times[i])).unwrap_or(f64::NAN))
        .collect_vec();
    write_time_var(&mut nc, "model_time", &model_times, "time of the model output sampled")
        .change_context_lazy(|| err("model_time"))?;

    write_1d_var(&mut nc, "latitude", columns.lat.view(), "degrees_north", "pixel center latitude")
        .change_context_lazy(|| err("latitude"))?;
    write_1d_var(&mut nc, "longitude", columns.lon.view(), "degrees_east", "pixel center longitude")
        .change_context_lazy(|| err("longitude"))?;

    let units = mole_fraction_units(&columns.units);
    write_1d_var(
        &mut nc,
        "model_column",
        columns.model_column.view(),
        &units,
        &format!("model {} column with the satellite averaging kernel applied", columns.species),
    )
    .change_context_lazy(|| err("model_column"))?;
    if let Some(retrieved) = &columns.retrieved_column {
        write_1d_var(
            &mut nc,
            "retrieved_column",
            retrieved.view(),
            &units,
            &format!("retrieved {} column", columns.species),
        )
        .change_context_lazy(|| err("retrieved_column"))?;
    }
    write_2d_var(
        &mut nc,
        "model_profile",
        columns.model_profile.view(),
        &units,
        "model profile on the satellite layers, surface first",
    )
    .change_context_lazy(|| err("model_profile"))?;
    write_1d_var(&mut nc, "coverage", columns.coverage.view(), "1", "fraction of the pixel covered by the model grid")
        .change_context_lazy(|| err("coverage"))?;

    let n_cells = Array1::from_iter(columns.n_cells.iter().map(|&n| n as i32));
    let codes = Array1::from_iter(columns.status.iter().map(|&s| status_code(s)));
    (|| -> Result<(), netcdf::Error> {
        let mut var = nc.add_variable::<i32>("n_cells", &[OBS_DIM])?;
        var.put(n_cells.view(), Extents::All)?;
        var.put_attribute("long_name", "number of model cells contributing to the column")?;

        let mut var = nc.add_variable::<i8>("status", &[OBS_DIM])?;
        var.put(codes.view(), Extents::All)?;
        var.put_attribute("long_name", "operator status")?;
        var.put_attribute("flag_values", ObsStatus::iter().map(status_code).collect_vec())?;
        var.put_attribute("flag_meanings", ObsStatus::iter().map(|s| s.to_string()).join(" "))?;
        Ok(())
    })()
    .change_context_lazy(|| err("status"))?;

    Ok(())
}

pub(super) fn write_superobs_netcdf(path: &Path, superobs: &[SuperObs], units: &str) -> error_stack::Result<(), WriteError> {
    let mut nc = netcdf::create(path).change_context_lazy(|| WriteError::CouldNotCreate(path.to_path_buf()))?;
    let err = |name: &str| WriteError::Netcdf(name.to_string());
    nc.add_dimension(OBS_DIM, superobs.len()).change_context_lazy(|| err(OBS_DIM))?;

    let times = superobs.iter().map(|s| seconds_since_epoch(&s.time)).collect_vec();
    write_time_var(&mut nc, "time", &times, "model time of the super-observation").change_context_lazy(|| err("time"))?;

    let lat = Array1::from_iter(superobs.iter().map(|s| s.lat));
    let lon = Array1::from_iter(superobs.iter().map(|s| s.lon));
    let model = Array1::from_iter(superobs.iter().map(|s| s.model_column));
    let retrieved = Array1::from_iter(superobs.iter().map(|s| s.retrieved_column.unwrap_or(f64::NAN)));
    let units = mole_fraction_units(units);

    write_1d_var(&mut nc, "latitude", lat.view(), "degrees_north", "bin center latitude").change_context_lazy(|| err("latitude"))?;
    write_1d_var(&mut nc, "longitude", lon.view(), "degrees_east", "bin center longitude").change_context_lazy(|| err("longitude"))?;
    write_1d_var(&mut nc, "model_column", model.view(), &units, "mean model column").change_context_lazy(|| err("model_column"))?;
    write_1d_var(&mut nc, "retrieved_column", retrieved.view(), &units, "mean retrieved column")
        .change_context_lazy(|| err("retrieved_column"))?;

    let n_obs = Array1::from_iter(superobs.iter().map(|s| s.n_obs as i32));
    (|| -> Result<(), netcdf::Error> {
        let mut var = nc.add_variable::<i32>("n_obs", &[OBS_DIM])?;
        var.put(n_obs.view(), Extents::All)?;
        var.put_attribute("long_name", "number of observations averaged")?;
        Ok(())
    })()
    .change_context_lazy(|| err("n_obs"))?;
    Ok(())
}
