//! JSON input files.
//!
//! A model file is one object:
//!
//! ```json
//! {
//!   "species": "CH4",
//!   "units": "mol/mol",
//!   "times": ["2019-01-01T00:00:00Z", "2019-01-01T03:00:00Z"],
//!   "lat": [-1.0, 1.0],
//!   "lon": [0.0, 2.5],
//!   "pressure_units": "hPa",
//!   "level_order": "surface_first",
//!   "pressure": [[[[1000.0, 1000.0], [1000.0, 1000.0]], [[500.0, 500.0], [500.0, 500.0]], [[0.01, 0.01], [0.01, 0.01]]]],
//!   "mixing_ratio": [[[[1.8e-6, 1.8e-6], [1.8e-6, 1.8e-6]], [[1.7e-6, 1.7e-6], [1.7e-6, 1.7e-6]]]]
//! }
//! ```
//!
//! with `pressure` either the `(time, edge, lat, lon)` edge pressures or an object with
//! hybrid `ap` and `bp` coefficients and a `(time, lat, lon)` `surface_pressure`.
//! `units`, `pressure_units` and `level_order` are optional and default to the model settings.
//!
//! A satellite file is an object mapping variable names to (nested) arrays, plus an
//! optional `units` object mapping variable names to their units. Times may be strings
//! or numbers with CF-style units. In both kinds of file, `null` stands for a missing value.
use std::{
    collections::HashMap,
    path::Path,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use error_stack::ResultExt;
use ndarray::{Array1, ArrayD, Ix3, Ix4, IxDyn};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{finalize_model, ReadError, VariableSource};
use crate::{
    error::ShapeError,
    model::{ModelFields, ModelPressure},
    settings::{ModelPressureSettings, ModelSettings},
    utils::{parse_datetime, CfTimeUnits},
    vertical::LevelOrder,
};

const UNITS_KEY: &str = "units";

#[derive(Debug, Deserialize)]
struct ModelJson {
    species: String,
    units: Option<String>,
    times: Vec<String>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    pressure_units: Option<String>,
    level_order: Option<LevelOrder>,
    pressure: PressureJson,
    mixing_ratio: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PressureJson {
    Hybrid { ap: Vec<f64>, bp: Vec<f64>, surface_pressure: Value },
    Edges(Value),
}

fn read_json_value(path: &Path) -> error_stack::Result<Value, ReadError> {
    let text = std::fs::read_to_string(path).change_context_lazy(|| ReadError::CouldNotOpen(path.to_path_buf()))?;
    serde_json::from_str(&text).map_err(|e| {
        ReadError::Parse { path: path.to_path_buf(), cause: e.to_string() }.into()
    })
}

pub(crate) fn read_model_json(path: &Path, settings: &ModelSettings) -> error_stack::Result<ModelFields, ReadError> {
    let value = read_json_value(path)?;
    let raw: ModelJson = serde_json::from_value(value)
        .map_err(|e| ReadError::Parse { path: path.to_path_buf(), cause: e.to_string() })?;

    let times = raw
        .times
        .iter()
        .map(|t| parse_datetime(t).map_err(|e| ReadError::bad_variable("times", e)))
        .collect::<Result<Vec<_>, _>>()?;

    let pressure = match raw.pressure {
        PressureJson::Edges(v) => {
            let edges = nested_to_array("pressure", &v, 4)?
                .into_dimensionality::<Ix4>()
                .map_err(|e| ReadError::bad_variable("pressure", e))?;
            ModelPressure::Edges(edges)
        }
        PressureJson::Hybrid { ap, bp, surface_pressure } => {
            let surface_pressure = nested_to_array("surface_pressure", &surface_pressure, 3)?
                .into_dimensionality::<Ix3>()
                .map_err(|e| ReadError::bad_variable("surface_pressure", e))?;
            ModelPressure::Hybrid { ap: Array1::from(ap), bp: Array1::from(bp), surface_pressure }
        }
    };
    let mixing_ratio = nested_to_array("mixing_ratio", &raw.mixing_ratio, 4)?
        .into_dimensionality::<Ix4>()
        .map_err(|e| ReadError::bad_variable("mixing_ratio", e))?;

    let units = settings
        .units
        .clone()
        .or(raw.units)
        .ok_or_else(|| ReadError::bad_variable("mixing_ratio", "no units given in the file or the settings"))?;
    let pressure_units = raw.pressure_units.unwrap_or_else(|| match &settings.pressure {
        ModelPressureSettings::Edges { units, .. } => units.clone(),
        ModelPressureSettings::Hybrid { units, .. } => units.clone(),
    });

    let fields = ModelFields {
        species: raw.species,
        units,
        times,
        lat: Array1::from(raw.lat),
        lon: Array1::from(raw.lon),
        pressure,
        mixing_ratio,
    };
    let fields = finalize_model(fields, &pressure_units, raw.level_order.unwrap_or(settings.level_order))?;
    Ok(fields)
}

/// The variables of a satellite JSON file.
#[derive(Debug)]
pub struct JsonVariables {
    variables: Map<String, Value>,
    units: HashMap<String, String>,
}

impl JsonVariables {
    pub fn open(path: &Path) -> error_stack::Result<Self, ReadError> {
        let value = read_json_value(path)?;
        let Value::Object(mut variables) = value else {
            return Err(ReadError::Parse {
                path: path.to_path_buf(),
                cause: "the top level must be an object of variables".to_string(),
            }
            .into());
        };

        let units = match variables.remove(UNITS_KEY) {
            Some(Value::Object(u)) => u
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                .collect(),
            Some(_) => {
                return Err(ReadError::Parse {
                    path: path.to_path_buf(),
                    cause: format!("'{UNITS_KEY}' must be an object of strings"),
                }
                .into())
            }
            None => HashMap::new(),
        };
        Ok(Self { variables, units })
    }

    fn get(&self, name: &str) -> Result<&Value, ReadError> {
        self.variables
            .get(name)
            .ok_or_else(|| ReadError::MissingVariable(name.to_string()))
    }
}

impl VariableSource for JsonVariables {
    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn read_array(&self, name: &str) -> Result<ArrayD<f64>, ReadError> {
        let value = self.get(name)?;
        nested_to_array(name, value, nesting_depth(value))
    }

    fn read_times(&self, name: &str) -> Result<Vec<DateTime<Utc>>, ReadError> {
        let values = self
            .get(name)?
            .as_array()
            .ok_or_else(|| ReadError::bad_variable(name, "expected an array of times"))?;

        if values.iter().all(|v| v.is_string()) {
            return values
                .iter()
                .map(|v| parse_datetime(v.as_str().unwrap_or_default()).map_err(|e| ReadError::bad_variable(name, e)))
                .collect();
        }

        let units = self
            .units(name)
            .ok_or_else(|| ReadError::bad_variable(name, "numeric times need CF units, e.g. \"seconds since 1970-01-01\""))?;
        let units = CfTimeUnits::from_str(&units).map_err(|e| ReadError::bad_variable(name, e))?;
        values
            .iter()
            .map(|v| {
                let x = json_number(name, v)?;
                units.decode(x).map_err(|e| ReadError::bad_variable(name, e))
            })
            .collect()
    }

    fn units(&self, name: &str) -> Option<String> {
        self.units.get(name).cloned()
    }
}

fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Array(a) => 1 + a.first().map(nesting_depth).unwrap_or(0),
        _ => 0,
    }
}

/// Convert `ndim` levels of nested JSON arrays into an array, rejecting ragged input.
fn nested_to_array(field: &str, value: &Value, ndim: usize) -> Result<ArrayD<f64>, ReadError> {
    let mut shape = Vec::with_capacity(ndim);
    let mut cur = value;
    for _ in 0..ndim {
        let arr = cur
            .as_array()
            .ok_or_else(|| ReadError::bad_variable(field, format!("expected {ndim} levels of nested arrays")))?;
        shape.push(arr.len());
        match arr.first() {
            Some(v) => cur = v,
            None => break,
        }
    }
    shape.resize(ndim, 0);

    let mut data = Vec::with_capacity(shape.iter().product());
    flatten_into(field, value, 0, &shape, &mut data)?;
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| ReadError::bad_variable(field, e))
}

fn flatten_into(field: &str, value: &Value, index: usize, shape: &[usize], out: &mut Vec<f64>) -> Result<(), ReadError> {
    match shape.split_first() {
        None => {
            out.push(json_number(field, value)?);
            Ok(())
        }
        Some((&n, rest)) => {
            let arr = value
                .as_array()
                .ok_or_else(|| ReadError::bad_variable(field, format!("element {index} is not an array")))?;
            if arr.len() != n {
                return Err(ReadError::bad_variable(field, ShapeError::ragged(field, index, n, arr.len())));
            }
            for (i, v) in arr.iter().enumerate() {
                flatten_into(field, v, i, rest, out)?;
            }
            Ok(())
        }
    }
}

fn json_number(field: &str, value: &Value) -> Result<f64, ReadError> {
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ReadError::bad_variable(field, format!("{n} is not representable as a float"))),
        other => Err(ReadError::bad_variable(field, format!("expected a number or null, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_data_dir;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn test_nested_to_array() {
        let v = json!([[1.0, 2.0, 3.0], [4.0, null, 6.0]]);
        let arr = nested_to_array("x", &v, nesting_depth(&v)).unwrap();
        assert_eq!(arr.shape(), &[2, 3]);
        assert!(arr[[1, 1]].is_nan());
        assert_abs_diff_eq!(arr[[1, 2]], 6.0);

        let ragged = json!([[1.0, 2.0], [3.0]]);
        let err = nested_to_array("x", &ragged, 2).unwrap_err();
        assert!(err.to_string().contains("ragged"), "{err}");

        let err = nested_to_array("x", &json!([1.0, "two"]), 1).unwrap_err();
        assert!(matches!(err, ReadError::BadVariable { .. }));
    }

    #[test]
    fn test_read_model_json() {
        let path = test_data_dir().join("inputs/model_20190101_a.json");
        let model = read_model_json(&path, &ModelSettings::default()).unwrap();
        assert_eq!(model.species, "CH4");
        assert_eq!(model.units, "mol/mol");
        assert_eq!(model.times[0], Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(model.mixing_ratio.dim(), (2, 2, 2, 2));
        model.validate().unwrap();
    }

    #[test]
    fn test_read_hybrid_top_first() {
        let path = test_data_dir().join("inputs/hybrid_model_top_first.json");
        let mut settings = ModelSettings::default();
        settings.units = Some("ppb".to_string());
        let model = read_model_json(&path, &settings).unwrap();
        // The settings take precedence over the file's units
        assert_eq!(model.units, "ppb");
        model.validate().unwrap();
        let edges = model.column_edges(0, crate::grid::CellIndex::new(0, 0));
        // Stored top first in Pa, returned surface first in hPa
        assert_abs_diff_eq!(edges, array![1000.0, 500.0, 0.0], epsilon = 1e-9);
        assert_abs_diff_eq!(model.column_profile(0, crate::grid::CellIndex::new(0, 0))[0], 1800.0);
    }

    #[test]
    fn test_satellite_variables() {
        let path = test_data_dir().join("inputs/satellite.json");
        let src = JsonVariables::open(&path).unwrap();
        assert!(src.has_variable("latitude"));
        assert!(!src.has_variable(UNITS_KEY));
        assert_eq!(src.units("pressure_levels").as_deref(), Some("Pa"));
        let times = src.read_times("time").unwrap();
        assert_eq!(times[0], Utc.with_ymd_and_hms(2019, 1, 1, 0, 10, 0).unwrap());
        assert!(matches!(src.read_array("no_such_var"), Err(ReadError::MissingVariable(_))));
    }
}
