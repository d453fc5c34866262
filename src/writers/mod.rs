//! Writing model columns and super-observations.
//!
//! As for reading, JSON output is always available and netCDF output needs the `netcdf`
//! feature. The format is chosen from the output file's extension.
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use serde::Serialize;

use crate::{
    operator::{ComparisonStats, ModelColumns, ObsStatus, StatusSummary},
    readers::FileFormat,
};

#[cfg(feature = "netcdf")]
mod netcdf;
pub mod superobs;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Could not create {}", .0.display())]
    CouldNotCreate(PathBuf),
    #[error("Could not write to {}", .0.display())]
    IoError(PathBuf),
    #[error("Output file {} must end in .json, .nc or .nc4", .0.display())]
    UnknownFormat(PathBuf),
    #[error("Cannot write {}: netCDF support was not compiled in (enable the 'netcdf' feature)", .0.display())]
    NetcdfDisabled(PathBuf),
    #[error("Error writing netCDF variable '{0}'")]
    Netcdf(String),
}

/// One observation's result, as written to JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnRecord {
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub status: ObsStatus,
    pub model_column: Option<f64>,
    pub retrieved_column: Option<f64>,
    pub model_time: Option<DateTime<Utc>>,
    pub n_cells: usize,
    pub coverage: f64,
    pub model_profile: Vec<Option<f64>>,
}

#[derive(Debug, Serialize)]
struct ColumnsDocument<'a> {
    operator: &'a str,
    species: &'a str,
    units: &'a str,
    summary: StatusSummary,
    comparison: Option<ComparisonStats>,
    observations: Vec<ColumnRecord>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Per-observation records of `columns`; NaNs become `None`.
pub fn column_records(columns: &ModelColumns) -> Vec<ColumnRecord> {
    (0..columns.nobs())
        .map(|i| ColumnRecord {
            time: columns.time[i],
            lat: columns.lat[i],
            lon: columns.lon[i],
            status: columns.status[i],
            model_column: finite(columns.model_column[i]),
            retrieved_column: columns.retrieved_column.as_ref().and_then(|c| finite(c[i])),
            model_time: columns.time_index[i].map(|it| columns.model_times[it]),
            n_cells: columns.n_cells[i],
            coverage: columns.coverage[i],
            model_profile: columns.model_profile.row(i).iter().map(|v| finite(*v)).collect(),
        })
        .collect()
}

/// Write model columns as JSON: the status summary, comparison statistics and one
/// record per observation.
pub fn write_columns_json<W: Write>(f: W, columns: &ModelColumns) -> serde_json::Result<()> {
    let doc = ColumnsDocument {
        operator: &columns.operator,
        species: &columns.species,
        units: &columns.units,
        summary: columns.summary(),
        comparison: columns.comparison(),
        observations: column_records(columns),
    };
    serde_json::to_writer_pretty(f, &doc)
}

fn output_format(path: &Path) -> Result<FileFormat, WriteError> {
    FileFormat::from_path(path).map_err(|_| WriteError::UnknownFormat(path.to_path_buf()))
}

pub(crate) fn create_file(path: &Path) -> error_stack::Result<BufWriter<File>, WriteError> {
    let f = File::create(path).change_context_lazy(|| WriteError::CouldNotCreate(path.to_path_buf()))?;
    Ok(BufWriter::new(f))
}

/// Write model columns to `path`, as JSON or netCDF depending on its extension.
pub fn write_model_columns(path: &Path, columns: &ModelColumns) -> error_stack::Result<(), WriteError> {
    match output_format(path)? {
        FileFormat::Json => {
            let mut f = create_file(path)?;
            write_columns_json(&mut f, columns).change_context_lazy(|| WriteError::IoError(path.to_path_buf()))?;
            f.flush().change_context_lazy(|| WriteError::IoError(path.to_path_buf()))?;
        }
        #[cfg(feature = "netcdf")]
        FileFormat::NetCdf => netcdf::write_columns_netcdf(path, columns)?,
        #[cfg(not(feature = "netcdf"))]
        FileFormat::NetCdf => return Err(WriteError::NetcdfDisabled(path.to_path_buf()).into()),
    }
    log::info!("Wrote {} model columns to {}", columns.nobs(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    pub(super) fn example_columns() -> ModelColumns {
        let t0 = Utc.with_ymd_and_hms(2019, 1, 1, 0, 10, 0).unwrap();
        let m0 = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        ModelColumns {
            operator: "test_sat".to_string(),
            species: "CH4".to_string(),
            units: "ppb".to_string(),
            time: vec![t0, t0, t0],
            lat: array![0.5, 0.6, 10.0],
            lon: array![0.5, 0.4, 10.0],
            model_column: array![1750.0, 1760.0, f64::NAN],
            model_profile: array![[1800.0, 1700.0], [1810.0, 1710.0], [f64::NAN, f64::NAN]],
            retrieved_column: Some(array![1755.0, 1770.0, 1790.0]),
            status: vec![ObsStatus::Valid, ObsStatus::Valid, ObsStatus::OutsideModelGrid],
            time_index: vec![Some(0), Some(0), Some(0)],
            model_times: vec![m0],
            n_cells: vec![1, 1, 0],
            coverage: array![1.0, 1.0, 0.0],
            grid_resolution: (2.0, 2.5),
        }
    }

    #[test]
    fn test_records() {
        let records = column_records(&example_columns());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].model_column, Some(1750.0));
        assert_eq!(records[2].model_column, None);
        assert_eq!(records[2].model_profile, vec![None, None]);
        assert_eq!(records[1].model_time, Some(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_json_output() {
        let mut buf = Vec::new();
        write_columns_json(&mut buf, &example_columns()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["operator"], "test_sat");
        assert_eq!(value["summary"]["valid"], 2);
        assert_eq!(value["summary"]["outside_model_grid"], 1);
        assert_eq!(value["comparison"]["n"], 2);
        assert_eq!(value["observations"][2]["status"], "outside_model_grid");
        assert!(value["observations"][2]["model_column"].is_null());
    }

    #[test]
    fn test_unknown_output_format() {
        let err = write_model_columns(Path::new("columns.csv"), &example_columns()).unwrap_err();
        assert!(matches!(err.current_context(), WriteError::UnknownFormat(_)));
    }
}
