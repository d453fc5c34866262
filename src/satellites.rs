//! Descriptions of how to read and apply the operator for specific satellite products.
//!
//! A [`SatelliteOperator`] names the variables to read from a satellite file and says how
//! to interpret its vertical grid. Several common products are built in; more can be
//! added (or the built-in ones overridden) in the `satellites` section of the config file.
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    settings::Settings,
    vertical::{LevelKind, LevelOrder},
};

#[derive(Debug, thiserror::Error)]
pub enum OperatorLookupError {
    #[error("Unknown satellite operator '{name}', known operators are: {}", .known.join(", "))]
    Unknown { name: String, known: Vec<String> },
}

/// Variable names to read from a satellite file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteVariables {
    pub time: String,
    pub lat: String,
    pub lon: String,
    pub lat_corners: Option<String>,
    pub lon_corners: Option<String>,
    pub pressure_levels: String,
    pub averaging_kernel: String,
    pub pressure_weight: String,
    pub prior_profile: Option<String>,
    pub retrieved_column: Option<String>,
    pub qa_value: Option<String>,
}

impl Default for SatelliteVariables {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            lat: "latitude".to_string(),
            lon: "longitude".to_string(),
            lat_corners: None,
            lon_corners: None,
            pressure_levels: "pressure_levels".to_string(),
            averaging_kernel: "averaging_kernel".to_string(),
            pressure_weight: "pressure_weight".to_string(),
            prior_profile: Some("prior_profile".to_string()),
            retrieved_column: Some("retrieved_column".to_string()),
            qa_value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteOperator {
    pub description: String,
    pub species: String,
    /// Mole fraction units of the retrieved column and prior profile.
    pub units: String,
    pub level_kind: LevelKind,
    pub level_order: LevelOrder,
    pub pressure_units: String,
    pub variables: SatelliteVariables,
}

impl Default for SatelliteOperator {
    fn default() -> Self {
        Self {
            description: String::new(),
            species: "CH4".to_string(),
            units: "ppb".to_string(),
            level_kind: LevelKind::Edges,
            level_order: LevelOrder::SurfaceFirst,
            pressure_units: "hPa".to_string(),
            variables: SatelliteVariables::default(),
        }
    }
}

fn some(s: &str) -> Option<String> {
    Some(s.to_string())
}

/// The operators available without any configuration.
pub fn builtin_operators() -> IndexMap<String, SatelliteOperator> {
    let mut ops = IndexMap::new();

    ops.insert(
        "tropomi_ch4".to_string(),
        SatelliteOperator {
            description: "TROPOMI XCH4 (S5P L2 CH4), layer edges in Pa".to_string(),
            species: "CH4".to_string(),
            units: "ppb".to_string(),
            level_kind: LevelKind::Edges,
            level_order: LevelOrder::SurfaceFirst,
            pressure_units: "Pa".to_string(),
            variables: SatelliteVariables {
                time: "time".to_string(),
                lat: "latitude".to_string(),
                lon: "longitude".to_string(),
                lat_corners: some("latitude_bounds"),
                lon_corners: some("longitude_bounds"),
                pressure_levels: "pressure_levels".to_string(),
                averaging_kernel: "column_averaging_kernel".to_string(),
                pressure_weight: "pressure_weight".to_string(),
                prior_profile: some("methane_profile_apriori"),
                retrieved_column: some("methane_mixing_ratio_bias_corrected"),
                qa_value: some("qa_value"),
            },
        },
    );

    ops.insert(
        "gosat_ch4".to_string(),
        SatelliteOperator {
            description: "GOSAT XCH4 proxy retrieval, level centers stored top first".to_string(),
            species: "CH4".to_string(),
            units: "ppb".to_string(),
            level_kind: LevelKind::Centers,
            level_order: LevelOrder::TopFirst,
            pressure_units: "hPa".to_string(),
            variables: SatelliteVariables {
                time: "time".to_string(),
                lat: "latitude".to_string(),
                lon: "longitude".to_string(),
                lat_corners: None,
                lon_corners: None,
                pressure_levels: "pressure_levels".to_string(),
                averaging_kernel: "xch4_averaging_kernel".to_string(),
                pressure_weight: "pressure_weight".to_string(),
                prior_profile: some("ch4_profile_apriori"),
                retrieved_column: some("xch4"),
                qa_value: some("xch4_quality_flag"),
            },
        },
    );

    ops.insert(
        "oco2_co2".to_string(),
        SatelliteOperator {
            description: "OCO-2 XCO2 lite files, level centers in hPa".to_string(),
            species: "CO2".to_string(),
            units: "ppm".to_string(),
            level_kind: LevelKind::Centers,
            level_order: LevelOrder::TopFirst,
            pressure_units: "hPa".to_string(),
            variables: SatelliteVariables {
                time: "time".to_string(),
                lat: "latitude".to_string(),
                lon: "longitude".to_string(),
                lat_corners: some("vertex_latitude"),
                lon_corners: some("vertex_longitude"),
                pressure_levels: "pressure_levels".to_string(),
                averaging_kernel: "xco2_averaging_kernel".to_string(),
                pressure_weight: "pressure_weight".to_string(),
                prior_profile: some("co2_profile_apriori"),
                retrieved_column: some("xco2"),
                qa_value: some("xco2_quality_flag"),
            },
        },
    );

    ops.insert(
        "tropomi_co".to_string(),
        SatelliteOperator {
            description: "TROPOMI CO total column; the averaging kernel applies directly to the model profile".to_string(),
            species: "CO".to_string(),
            units: "ppb".to_string(),
            level_kind: LevelKind::Edges,
            level_order: LevelOrder::SurfaceFirst,
            pressure_units: "Pa".to_string(),
            variables: SatelliteVariables {
                time: "time".to_string(),
                lat: "latitude".to_string(),
                lon: "longitude".to_string(),
                lat_corners: some("latitude_bounds"),
                lon_corners: some("longitude_bounds"),
                pressure_levels: "pressure_levels".to_string(),
                averaging_kernel: "column_averaging_kernel".to_string(),
                pressure_weight: "pressure_weight".to_string(),
                prior_profile: None,
                retrieved_column: some("carbonmonoxide_total_column"),
                qa_value: some("qa_value"),
            },
        },
    );

    ops
}

/// All operators known under `settings`: the built-in ones, then the user-defined ones.
/// A user operator with the same name as a built-in one replaces it.
pub fn all_operators(settings: &Settings) -> IndexMap<String, SatelliteOperator> {
    let mut ops = builtin_operators();
    for (name, op) in settings.satellites.iter() {
        ops.insert(name.clone(), op.clone());
    }
    ops
}

pub fn get_operator(name: &str, settings: &Settings) -> Result<SatelliteOperator, OperatorLookupError> {
    let mut ops = all_operators(settings);
    ops.swap_remove(name).ok_or_else(|| OperatorLookupError::Unknown {
        name: name.to_string(),
        known: ops.keys().cloned().collect_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let settings = Settings::default();
        let op = get_operator("tropomi_ch4", &settings).unwrap();
        assert_eq!(op.pressure_units, "Pa");
        assert_eq!(op.level_kind, LevelKind::Edges);

        let op = get_operator("tropomi_co", &settings).unwrap();
        assert!(op.variables.prior_profile.is_none());
    }

    #[test]
    fn test_user_override() {
        let settings = Settings::from_yaml_str(
            "
satellites:
  gosat_ch4:
    units: ppm
  my_no2:
    species: NO2
",
        )
        .unwrap();
        let op = get_operator("gosat_ch4", &settings).unwrap();
        // User entries replace the built-in operator entirely
        assert_eq!(op.units, "ppm");
        assert_eq!(op.level_kind, LevelKind::Edges);
        assert_eq!(get_operator("my_no2", &settings).unwrap().species, "NO2");
    }

    #[test]
    fn test_unknown_operator() {
        let err = get_operator("iasi_nh3", &Settings::default()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("iasi_nh3"), "{msg}");
        assert!(msg.contains("tropomi_ch4, gosat_ch4, oco2_co2, tropomi_co"), "{msg}");
    }
}
