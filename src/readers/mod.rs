//! Reading model output and satellite retrievals.
//!
//! JSON files can always be read. netCDF files (`.nc`, `.nc4`) need the `netcdf` feature.
//! Whatever the format, the readers return pressures in hPa with vertical arrays ordered
//! from the surface up.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};

use crate::{
    model::{concat_time, ModelFields},
    observations::{PixelCorners, SatelliteObs},
    satellites::SatelliteOperator,
    settings::ModelSettings,
    units::pressure_to_hpa,
    vertical::LevelOrder,
};

pub mod json;
#[cfg(feature = "netcdf")]
pub mod netcdf;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Could not open {}", .0.display())]
    CouldNotOpen(PathBuf),
    #[error("Could not parse {}: {cause}", .path.display())]
    Parse { path: PathBuf, cause: String },
    #[error("Unrecognized extension on {}, expected .json, .nc or .nc4", .0.display())]
    UnknownFormat(PathBuf),
    #[error("{} is a netCDF file, but netCDF support was not compiled in (enable the 'netcdf' feature)", .0.display())]
    NetcdfDisabled(PathBuf),
    #[error("Variable '{0}' not found")]
    MissingVariable(String),
    #[error("Variable '{variable}' is invalid: {reason}")]
    BadVariable { variable: String, reason: String },
    #[error("Invalid file pattern '{0}'")]
    BadPattern(String),
    #[error("No files match '{0}'")]
    NoFiles(String),
    #[error("The data read from {} are inconsistent", .0.display())]
    Inconsistent(PathBuf),
}

impl ReadError {
    pub(crate) fn bad_variable<S: ToString>(variable: &str, reason: S) -> Self {
        Self::BadVariable { variable: variable.to_string(), reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FileFormat {
    #[strum(serialize = "JSON")]
    Json,
    #[strum(serialize = "netCDF")]
    NetCdf,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, ReadError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("nc") | Some("nc4") | Some("netcdf") => Ok(Self::NetCdf),
            _ => Err(ReadError::UnknownFormat(path.to_path_buf())),
        }
    }
}

/// A file of named variables, such as a satellite product. Both the JSON and netCDF
/// readers go through this so that variable lookup works the same way for each.
pub(crate) trait VariableSource {
    fn has_variable(&self, name: &str) -> bool;

    /// Read a numeric variable as `f64`; fill values become NaN.
    fn read_array(&self, name: &str) -> Result<ArrayD<f64>, ReadError>;

    fn read_times(&self, name: &str) -> Result<Vec<DateTime<Utc>>, ReadError>;

    /// The variable's "units" attribute, if it has one.
    fn units(&self, name: &str) -> Option<String>;

    fn read_1d(&self, name: &str) -> Result<Array1<f64>, ReadError> {
        self.read_array(name)?
            .into_dimensionality::<Ix1>()
            .map_err(|e| ReadError::bad_variable(name, format!("expected a 1D array ({e})")))
    }

    fn read_2d(&self, name: &str) -> Result<Array2<f64>, ReadError> {
        self.read_array(name)?
            .into_dimensionality::<Ix2>()
            .map_err(|e| ReadError::bad_variable(name, format!("expected a 2D array ({e})")))
    }

    /// Read an optional variable: `Ok(None)` if `name` is `None` or, when `required` is false,
    /// if the variable is absent from the file.
    fn read_optional_1d(&self, name: Option<&str>, required: bool) -> Result<Option<Array1<f64>>, ReadError> {
        match name {
            Some(n) if self.has_variable(n) => self.read_1d(n).map(Some),
            Some(n) if required => Err(ReadError::MissingVariable(n.to_string())),
            Some(n) => {
                log::warn!("Variable '{n}' not found, continuing without it");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn read_optional_2d(&self, name: Option<&str>, required: bool) -> Result<Option<Array2<f64>>, ReadError> {
        match name {
            Some(n) if self.has_variable(n) => self.read_2d(n).map(Some),
            Some(n) if required => Err(ReadError::MissingVariable(n.to_string())),
            Some(n) => {
                log::warn!("Variable '{n}' not found, continuing without it");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Build satellite observations from a file's variables as described by `operator`.
///
/// The prior profile is required if the operator names one, since leaving it out changes
/// how the averaging kernel is applied. Missing corners, retrieved columns or QA values
/// are only warned about.
pub(crate) fn satellite_from_source<S: VariableSource>(
    src: &S,
    operator: &SatelliteOperator,
) -> Result<SatelliteObs, ReadError> {
    let vars = &operator.variables;
    let lat_corners = src.read_optional_2d(vars.lat_corners.as_deref(), false)?;
    let lon_corners = src.read_optional_2d(vars.lon_corners.as_deref(), false)?;
    let corners = match (lat_corners, lon_corners) {
        (Some(lat), Some(lon)) => Some(PixelCorners { lat, lon }),
        _ => None,
    };

    let mut levels = src.read_2d(&vars.pressure_levels)?;
    let pressure_units = src
        .units(&vars.pressure_levels)
        .unwrap_or_else(|| operator.pressure_units.clone());
    let factor = pressure_to_hpa(&pressure_units).map_err(|e| ReadError::bad_variable(&vars.pressure_levels, e))?;
    levels.mapv_inplace(|p| p * factor);

    let mut obs = SatelliteObs {
        time: src.read_times(&vars.time)?,
        lat: src.read_1d(&vars.lat)?,
        lon: src.read_1d(&vars.lon)?,
        corners,
        levels,
        level_kind: operator.level_kind,
        averaging_kernel: src.read_2d(&vars.averaging_kernel)?,
        pressure_weight: src.read_2d(&vars.pressure_weight)?,
        prior_profile: src.read_optional_2d(vars.prior_profile.as_deref(), true)?,
        retrieved_column: src.read_optional_1d(vars.retrieved_column.as_deref(), false)?,
        qa_value: src.read_optional_1d(vars.qa_value.as_deref(), false)?,
    };
    obs.ensure_surface_first(operator.level_order);
    Ok(obs)
}

/// Shift stored model data to hPa and surface-first order.
pub(crate) fn finalize_model(mut fields: ModelFields, pressure_units: &str, level_order: LevelOrder) -> Result<ModelFields, ReadError> {
    let factor = pressure_to_hpa(pressure_units).map_err(|e| ReadError::bad_variable("model pressure", e))?;
    if factor != 1.0 {
        fields.scale_pressure(factor);
    }
    fields.ensure_surface_first(level_order);
    Ok(fields)
}

/// Read one model output file.
pub fn read_model_file(path: &Path, settings: &ModelSettings) -> error_stack::Result<ModelFields, ReadError> {
    let fields = match FileFormat::from_path(path)? {
        FileFormat::Json => json::read_model_json(path, settings)?,
        #[cfg(feature = "netcdf")]
        FileFormat::NetCdf => netcdf::read_model_netcdf(path, settings)?,
        #[cfg(not(feature = "netcdf"))]
        FileFormat::NetCdf => return Err(ReadError::NetcdfDisabled(path.to_path_buf()).into()),
    };
    fields
        .validate()
        .change_context_lazy(|| ReadError::Inconsistent(path.to_path_buf()))?;
    log::debug!(
        "Read {} model times of {} from {}",
        fields.ntime(),
        fields.species,
        path.display()
    );
    Ok(fields)
}

/// Expand a model file argument: an existing path is used as is, anything else is
/// treated as a glob pattern. Matches are returned sorted.
pub fn expand_model_paths(pattern: &str) -> error_stack::Result<Vec<PathBuf>, ReadError> {
    let as_path = PathBuf::from(pattern);
    if as_path.exists() {
        return Ok(vec![as_path]);
    }

    let paths = glob::glob(pattern)
        .change_context_lazy(|| ReadError::BadPattern(pattern.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .change_context_lazy(|| ReadError::BadPattern(pattern.to_string()))?;
    if paths.is_empty() {
        return Err(ReadError::NoFiles(pattern.to_string()).into());
    }
    Ok(paths.into_iter().sorted().collect())
}

/// Read every model file matching `pattern` and join them along time.
pub fn read_model_files(pattern: &str, settings: &ModelSettings) -> error_stack::Result<ModelFields, ReadError> {
    let paths = expand_model_paths(pattern)?;
    log::info!("Reading {} model file(s) matching {pattern}", paths.len());
    let pieces = paths
        .iter()
        .map(|p| read_model_file(p, settings).attach_printable_lazy(|| format!("while reading {}", p.display())))
        .collect::<Result<Vec<_>, _>>()?;
    concat_time(pieces).change_context_lazy(|| ReadError::Inconsistent(PathBuf::from(pattern)))
}

/// Read a satellite file as described by `operator`.
pub fn read_satellite_file(path: &Path, operator: &SatelliteOperator) -> error_stack::Result<SatelliteObs, ReadError> {
    let obs = match FileFormat::from_path(path)? {
        FileFormat::Json => {
            let src = json::JsonVariables::open(path)?;
            satellite_from_source(&src, operator).attach_printable_lazy(|| format!("in {}", path.display()))?
        }
        #[cfg(feature = "netcdf")]
        FileFormat::NetCdf => {
            let src = netcdf::NcVariables::open(path)?;
            satellite_from_source(&src, operator).attach_printable_lazy(|| format!("in {}", path.display()))?
        }
        #[cfg(not(feature = "netcdf"))]
        FileFormat::NetCdf => return Err(ReadError::NetcdfDisabled(path.to_path_buf()).into()),
    };
    obs.validate()
        .change_context_lazy(|| ReadError::Inconsistent(path.to_path_buf()))?;
    log::info!("Read {} observations from {}", obs.nobs(), path.display());
    Ok(obs)
}
