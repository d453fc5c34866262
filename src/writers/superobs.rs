//! Super-observations: valid model and retrieved columns averaged per model time and
//! lat/lon bin.
use std::{io::Write, path::Path};

use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use super::{create_file, output_format, WriteError};
use crate::{
    grid::snap_to_grid,
    operator::{ModelColumns, ObsStatus},
    readers::FileFormat,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuperObs {
    /// Time of the model output the observations were matched to.
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub n_obs: usize,
    pub model_column: f64,
    /// Mean of the finite retrieved columns in the bin.
    pub retrieved_column: Option<f64>,
}

#[derive(Default)]
struct Accumulator {
    n: usize,
    model_sum: f64,
    n_retrieved: usize,
    retrieved_sum: f64,
}

/// Average the valid observations in `columns` into bins of `resolution` (latitude,
/// longitude) degrees, one set of bins per model time. The result is sorted by time,
/// then latitude, then longitude.
pub fn aggregate(columns: &ModelColumns, resolution: (f64, f64)) -> Vec<SuperObs> {
    let (dlat, dlon) = resolution;
    let mut bins: IndexMap<(usize, i64, i64), Accumulator> = IndexMap::new();

    for i in 0..columns.nobs() {
        let Some(itime) = columns.time_index[i] else { continue };
        let model = columns.model_column[i];
        if columns.status[i] != ObsStatus::Valid || !model.is_finite() {
            continue;
        }
        // Bins are keyed by their index so that float rounding cannot split a bin
        let ilat = (snap_to_grid(columns.lat[i], dlat) / dlat).round() as i64;
        let ilon = lon_bin(columns.lon[i], dlon);
        let acc = bins.entry((itime, ilat, ilon)).or_default();
        acc.n += 1;
        acc.model_sum += model;
        if let Some(r) = columns.retrieved_column.as_ref().map(|c| c[i]).filter(|r| r.is_finite()) {
            acc.n_retrieved += 1;
            acc.retrieved_sum += r;
        }
    }

    let superobs = bins
        .into_iter()
        .sorted_by_key(|(k, _)| *k)
        .map(|((itime, ilat, ilon), acc)| SuperObs {
            time: columns.model_times[itime],
            lat: ilat as f64 * dlat,
            lon: ilon as f64 * dlon,
            n_obs: acc.n,
            model_column: acc.model_sum / acc.n as f64,
            retrieved_column: (acc.n_retrieved > 0).then(|| acc.retrieved_sum / acc.n_retrieved as f64),
        })
        .collect_vec();
    log::debug!(
        "Averaged {} valid observations into {} super-observations",
        superobs.iter().map(|s| s.n_obs).sum::<usize>(),
        superobs.len()
    );
    superobs
}

/// Longitude bin index, wrapped so that the bins at +180 and -180 are the same bin when
/// `dlon` divides the circle evenly.
fn lon_bin(lon: f64, dlon: f64) -> i64 {
    let lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
    let ilon = (snap_to_grid(lon, dlon) / dlon).round() as i64;
    let nbins = (360.0 / dlon).round();
    if nbins >= 1.0 && (nbins * dlon - 360.0).abs() < 1e-6 {
        let nbins = nbins as i64;
        (ilon + nbins / 2).rem_euclid(nbins) - nbins / 2
    } else {
        ilon
    }
}

#[derive(Serialize)]
struct SuperObsDocument<'a> {
    operator: &'a str,
    species: &'a str,
    units: &'a str,
    resolution: (f64, f64),
    superobs: &'a [SuperObs],
}

/// Aggregate `columns` and write the super-observations to `path` (JSON or netCDF).
pub fn write_superobs(path: &Path, columns: &ModelColumns, resolution: (f64, f64)) -> error_stack::Result<(), WriteError> {
    let superobs = aggregate(columns, resolution);
    match output_format(path)? {
        FileFormat::Json => {
            let doc = SuperObsDocument {
                operator: &columns.operator,
                species: &columns.species,
                units: &columns.units,
                resolution,
                superobs: &superobs,
            };
            let mut f = create_file(path)?;
            serde_json::to_writer_pretty(&mut f, &doc).change_context_lazy(|| WriteError::IoError(path.to_path_buf()))?;
            f.flush().change_context_lazy(|| WriteError::IoError(path.to_path_buf()))?;
        }
        #[cfg(feature = "netcdf")]
        FileFormat::NetCdf => super::netcdf::write_superobs_netcdf(path, &superobs, &columns.units)?,
        #[cfg(not(feature = "netcdf"))]
        FileFormat::NetCdf => return Err(WriteError::NetcdfDisabled(path.to_path_buf()).into()),
    }
    log::info!("Wrote {} super-observations to {}", superobs.len(), path.display());
    Ok(())
}
