//! netCDF input files.
//!
//! Variables may be given as paths into groups, e.g. `PRODUCT/qa_value`. `_FillValue` and
//! `missing_value` entries become NaN, and `scale_factor`/`add_offset` are applied.
//! Times must be numeric with CF units such as "minutes since 2019-01-01 00:00:00".
use std::{path::Path, str::FromStr};

use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use ndarray::{ArrayD, Ix1, Ix3, Ix4};
use netcdf::{AttributeValue, Extents};

use super::{finalize_model, ReadError, VariableSource};
use crate::{
    model::{ModelFields, ModelPressure},
    settings::{ModelPressureSettings, ModelSettings},
    utils::CfTimeUnits,
};

/// An open netCDF file.
pub struct NcVariables {
    file: netcdf::File,
}

impl NcVariables {
    pub fn open(path: &Path) -> error_stack::Result<Self, ReadError> {
        let file = netcdf::open(path).change_context_lazy(|| ReadError::CouldNotOpen(path.to_path_buf()))?;
        Ok(Self { file })
    }

    fn with_var<T, F>(&self, name: &str, f: F) -> Result<T, ReadError>
    where
        F: FnOnce(&netcdf::Variable) -> Result<T, ReadError>,
    {
        let missing = || ReadError::MissingVariable(name.to_string());
        match name.rsplit_once('/') {
            Some((group_path, var_name)) => {
                let group = self
                    .file
                    .group(group_path)
                    .map_err(|e| ReadError::bad_variable(name, e))?
                    .ok_or_else(missing)?;
                let var = group.variable(var_name).ok_or_else(missing)?;
                f(&var)
            }
            None => {
                let var = self.file.variable(name).ok_or_else(missing)?;
                f(&var)
            }
        }
    }
}

fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|x| *x as f64),
        _ => None,
    }
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn read_masked(var: &netcdf::Variable) -> Result<ArrayD<f64>, ReadError> {
    let name = var.name();
    let mut values = var
        .get::<f64, _>(Extents::All)
        .map_err(|e| ReadError::bad_variable(&name, e))?;

    let fills = ["_FillValue", "missing_value"]
        .into_iter()
        .filter_map(|a| numeric_attribute(var, a))
        .collect::<Vec<_>>();
    let scale = numeric_attribute(var, "scale_factor").unwrap_or(1.0);
    let offset = numeric_attribute(var, "add_offset").unwrap_or(0.0);

    values.mapv_inplace(|v| {
        if fills.iter().any(|f| (v - f).abs() <= f.abs() * 1e-6) {
            f64::NAN
        } else {
            v * scale + offset
        }
    });
    Ok(values)
}

impl VariableSource for NcVariables {
    fn has_variable(&self, name: &str) -> bool {
        self.with_var(name, |_| Ok(())).is_ok()
    }

    fn read_array(&self, name: &str) -> Result<ArrayD<f64>, ReadError> {
        self.with_var(name, read_masked)
    }

    fn read_times(&self, name: &str) -> Result<Vec<DateTime<Utc>>, ReadError> {
        self.with_var(name, |var| {
            let units = string_attribute(var, "units")
                .ok_or_else(|| ReadError::bad_variable(name, "time variable has no units attribute"))?;
            let units = CfTimeUnits::from_str(&units).map_err(|e| ReadError::bad_variable(name, e))?;
            read_masked(var)?
                .iter()
                .map(|&v| units.decode(v).map_err(|e| ReadError::bad_variable(name, e)))
                .collect()
        })
    }

    fn units(&self, name: &str) -> Option<String> {
        self.with_var(name, |var| Ok(string_attribute(var, "units"))).ok().flatten()
    }
}

/// Read model fields from a GEOS-Chem style netCDF file. Variable names come from the
/// model settings; the pressure variables must be in the same file as the species.
pub(crate) fn read_model_netcdf(path: &Path, settings: &ModelSettings) -> error_stack::Result<ModelFields, ReadError> {
    let src = NcVariables::open(path)?;
    let species_var = &settings.species_variable;

    let mixing_ratio = src
        .read_array(species_var)?
        .into_dimensionality::<Ix4>()
        .map_err(|e| ReadError::bad_variable(species_var, format!("expected (time, lev, lat, lon) ({e})")))?;

    let units = match &settings.units {
        Some(u) => u.clone(),
        None => src
            .units(species_var)
            .ok_or_else(|| ReadError::bad_variable(species_var, "no units attribute and no units in the settings"))?,
    };

    let (pressure, pressure_units) = match &settings.pressure {
        ModelPressureSettings::Edges { variable, units } => {
            let edges = src
                .read_array(variable)?
                .into_dimensionality::<Ix4>()
                .map_err(|e| ReadError::bad_variable(variable, format!("expected (time, ilev, lat, lon) ({e})")))?;
            (ModelPressure::Edges(edges), src.units(variable).unwrap_or_else(|| units.clone()))
        }
        ModelPressureSettings::Hybrid { ap_variable, bp_variable, surface_pressure_variable, units } => {
            let ap = src.read_1d(ap_variable)?;
            let bp = src.read_1d(bp_variable)?;
            let surface_pressure = src
                .read_array(surface_pressure_variable)?
                .into_dimensionality::<Ix3>()
                .map_err(|e| ReadError::bad_variable(surface_pressure_variable, format!("expected (time, lat, lon) ({e})")))?;
            let psurf_units = src.units(surface_pressure_variable).unwrap_or_else(|| units.clone());
            (ModelPressure::Hybrid { ap, bp, surface_pressure }, psurf_units)
        }
    };

    let fields = ModelFields {
        species: species_name(species_var),
        units,
        times: src.read_times(&settings.time_variable)?,
        lat: src.read_array(&settings.lat_variable)?.into_dimensionality::<Ix1>()
            .map_err(|e| ReadError::bad_variable(&settings.lat_variable, e))?,
        lon: src.read_array(&settings.lon_variable)?.into_dimensionality::<Ix1>()
            .map_err(|e| ReadError::bad_variable(&settings.lon_variable, e))?,
        pressure,
        mixing_ratio,
    };
    let fields = finalize_model(fields, &pressure_units, settings.level_order)?;
    Ok(fields)
}

/// The species from a GEOS-Chem diagnostic name, e.g. "CH4" from "SpeciesConcVV_CH4".
fn species_name(variable: &str) -> String {
    variable
        .rsplit_once('_')
        .map(|(_, s)| s)
        .unwrap_or(variable)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_species_name() {
        assert_eq!(species_name("SpeciesConcVV_CH4"), "CH4");
        assert_eq!(species_name("CO2"), "CO2");
    }
}
