//! Run configuration.
//!
//! Settings are read from a YAML file (conventionally `config.yml`) and may be overridden
//! by environment variables prefixed with `GCSAT_`, using a double underscore to separate
//! nested keys (e.g. `GCSAT_COLOCATION__METHOD=point`). Every field has a default, so an
//! empty file (or no file at all, see [`Settings::load_or_default`]) is a valid configuration.
//!
//! A complete example with the default values:
//!
//! ```yaml
//! model:
//!   species_variable: SpeciesConcVV_CH4
//!   units: null
//!   lat_variable: lat
//!   lon_variable: lon
//!   time_variable: time
//!   level_order: surface_first
//!   pressure:
//!     kind: edges
//!     variable: Met_PEDGE
//!     units: hPa
//! colocation:
//!   method: auto
//!   max_time_offset_minutes: 60.0
//!   min_coverage: 0.5
//!   default_footprint_deg: 0.05
//!   area_weighting: cos_lat
//!   auto_overlap_ratio: 0.25
//! vertical:
//!   normalize_pressure_weight: true
//!   extrapolate: true
//! filters:
//!   min_qa: null
//! output:
//!   units: null
//!   superobs: false
//!   superobs_resolution: null
//! satellites: {}
//! ```
//!
//! Custom satellite operators go in the `satellites` section, keyed by the name passed
//! to [`crate::satellites::get_operator`]; see [`SatelliteOperator`] for their fields.
use std::{path::Path, sync::OnceLock};

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{satellites::SatelliteOperator, vertical::LevelOrder};

pub const DEFAULT_CONFIG_FILE: &str = "config.yml";
pub const ENV_PREFIX: &str = "GCSAT_";

static GLOBAL_SETTINGS: OnceLock<Settings> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Configuration file {0} does not exist")]
    MissingFile(String),
    #[error("Could not parse configuration from {source_desc}: {cause}")]
    Parse { source_desc: String, cause: String },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("The process-wide settings were already initialized")]
    AlreadyInitialized,
}

impl SettingsError {
    fn invalid<S: ToString>(field: &'static str, reason: S) -> Self {
        Self::InvalidValue { field, reason: reason.to_string() }
    }
}

/// How model grid cells are associated with a satellite pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SpatialMethod {
    /// Use the single model cell containing the pixel center. Appropriate when model
    /// cells are much larger than satellite pixels.
    Point,
    /// Weight every model cell by its area of overlap with the pixel footprint.
    /// Appropriate when the model and satellite resolutions are comparable.
    Overlap,
    /// Choose between `Point` and `Overlap` per pixel based on its size relative to
    /// the model grid spacing.
    Auto,
}

/// How overlap areas in latitude/longitude space are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AreaWeighting {
    /// Scale by the cosine of latitude to approximate true surface area.
    CosLat,
    /// Use areas in square degrees.
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub colocation: ColocationSettings,
    pub vertical: VerticalSettings,
    pub filters: FilterSettings,
    pub output: OutputSettings,
    pub satellites: IndexMap<String, SatelliteOperator>,
}

/// Where to find the model fields in model netCDF files and how to interpret them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub species_variable: String,
    /// Units of the species mixing ratio. If `None`, the "units" attribute of the species
    /// variable (or the `units` field of a JSON model file) is used.
    pub units: Option<String>,
    pub lat_variable: String,
    pub lon_variable: String,
    pub time_variable: String,
    pub level_order: LevelOrder,
    pub pressure: ModelPressureSettings,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            species_variable: "SpeciesConcVV_CH4".to_string(),
            units: None,
            lat_variable: "lat".to_string(),
            lon_variable: "lon".to_string(),
            time_variable: "time".to_string(),
            level_order: LevelOrder::SurfaceFirst,
            pressure: ModelPressureSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelPressureSettings {
    /// A 4D (time, level edge, lat, lon) pressure edge variable, e.g. GEOS-Chem's `Met_PEDGE`.
    Edges {
        #[serde(default = "default_pedge_variable")]
        variable: String,
        #[serde(default = "default_hpa")]
        units: String,
    },
    /// Hybrid sigma-pressure coefficients plus a 3D (time, lat, lon) surface pressure;
    /// edge pressure is `ap + bp * surface_pressure`. `ap` and the surface pressure share `units`.
    Hybrid {
        #[serde(default = "default_ap_variable")]
        ap_variable: String,
        #[serde(default = "default_bp_variable")]
        bp_variable: String,
        #[serde(default = "default_psurf_variable")]
        surface_pressure_variable: String,
        #[serde(default = "default_hpa")]
        units: String,
    },
}

impl Default for ModelPressureSettings {
    fn default() -> Self {
        Self::Edges { variable: default_pedge_variable(), units: default_hpa() }
    }
}

fn default_pedge_variable() -> String {
    "Met_PEDGE".to_string()
}

fn default_ap_variable() -> String {
    "hyai".to_string()
}

fn default_bp_variable() -> String {
    "hybi".to_string()
}

fn default_psurf_variable() -> String {
    "Met_PSC2WET".to_string()
}

fn default_hpa() -> String {
    "hPa".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColocationSettings {
    pub method: SpatialMethod,
    /// Largest allowed difference between a satellite observation time and the closest
    /// model snapshot, in minutes. `None` disables the limit.
    pub max_time_offset_minutes: Option<f64>,
    /// Minimum fraction of a pixel footprint that must fall on the model grid for an
    /// overlap-weighted result to be kept.
    pub min_coverage: f64,
    /// Side length in degrees of the square footprint assumed for pixels without corners.
    pub default_footprint_deg: f64,
    pub area_weighting: AreaWeighting,
    /// In `auto` mode, use overlap weighting when the pixel extent is at least this
    /// fraction of the smallest model grid spacing.
    pub auto_overlap_ratio: f64,
}

impl Default for ColocationSettings {
    fn default() -> Self {
        Self {
            method: SpatialMethod::Auto,
            max_time_offset_minutes: Some(60.0),
            min_coverage: 0.5,
            default_footprint_deg: 0.05,
            area_weighting: AreaWeighting::CosLat,
            auto_overlap_ratio: 0.25,
        }
    }
}

impl ColocationSettings {
    pub fn max_time_offset(&self) -> Option<chrono::Duration> {
        self.max_time_offset_minutes
            .map(|m| chrono::Duration::milliseconds((m * 60_000.0).round() as i64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalSettings {
    /// Rescale pressure weights that do not sum to one.
    pub normalize_pressure_weight: bool,
    /// Hold the model profile constant beyond its top and bottom when the satellite
    /// levels extend past them. If false, such observations are rejected.
    pub extrapolate: bool,
}

impl Default for VerticalSettings {
    fn default() -> Self {
        Self { normalize_pressure_weight: true, extrapolate: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Observations with a QA value below this (or a NaN QA value) are skipped.
    pub min_qa: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Mole fraction units for model columns; defaults to the satellite operator's units.
    pub units: Option<String>,
    /// Also average valid observations into one value per model time and grid cell.
    pub superobs: bool,
    /// (latitude, longitude) bin size in degrees for super-observations. Defaults to
    /// the model grid spacing.
    pub superobs_resolution: Option<(f64, f64)>,
}

impl Settings {
    /// Read settings from a YAML file, applying `GCSAT_` environment overrides.
    pub fn from_yaml_file(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::MissingFile(path.display().to_string()));
        }
        let figment = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment, &path.display().to_string())
    }

    /// Read settings from a YAML string. Environment overrides are not applied.
    pub fn from_yaml_str(s: &str) -> Result<Self, SettingsError> {
        Self::from_figment(Figment::from(Yaml::string(s)), "YAML string")
    }

    /// Like [`Settings::from_yaml_file`], but falls back to the defaults (still with
    /// environment overrides) when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::from_yaml_file(path)
        } else {
            log::warn!("Configuration file {} not found, using default settings", path.display());
            let figment = Figment::from(figment::providers::Serialized::defaults(Settings::default()))
                .merge(Env::prefixed(ENV_PREFIX).split("__"));
            Self::from_figment(figment, "defaults")
        }
    }

    fn from_figment(figment: Figment, source_desc: &str) -> Result<Self, SettingsError> {
        let settings: Settings = figment.extract().map_err(|e| SettingsError::Parse {
            source_desc: source_desc.to_string(),
            cause: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let coloc = &self.colocation;
        if !(0.0..=1.0).contains(&coloc.min_coverage) {
            return Err(SettingsError::invalid(
                "colocation.min_coverage",
                format!("must be between 0 and 1, got {}", coloc.min_coverage),
            ));
        }
        if let Some(m) = coloc.max_time_offset_minutes {
            if !(m >= 0.0) {
                return Err(SettingsError::invalid(
                    "colocation.max_time_offset_minutes",
                    format!("must be non-negative, got {m}"),
                ));
            }
        }
        if !(coloc.default_footprint_deg > 0.0) {
            return Err(SettingsError::invalid(
                "colocation.default_footprint_deg",
                format!("must be positive, got {}", coloc.default_footprint_deg),
            ));
        }
        if !(coloc.auto_overlap_ratio > 0.0) {
            return Err(SettingsError::invalid(
                "colocation.auto_overlap_ratio",
                format!("must be positive, got {}", coloc.auto_overlap_ratio),
            ));
        }
        if let Some((dlat, dlon)) = self.output.superobs_resolution {
            if !(dlat > 0.0 && dlon > 0.0) {
                return Err(SettingsError::invalid(
                    "output.superobs_resolution",
                    format!("both resolutions must be positive, got ({dlat}, {dlon})"),
                ));
            }
        }
        Ok(())
    }
}

/// Install `settings` as the process-wide settings. May only be called once.
pub fn init_global(settings: Settings) -> Result<&'static Settings, SettingsError> {
    GLOBAL_SETTINGS
        .set(settings)
        .map_err(|_| SettingsError::AlreadyInitialized)?;
    GLOBAL_SETTINGS.get().ok_or(SettingsError::AlreadyInitialized)
}

/// The process-wide settings, if [`init_global`] has been called.
pub fn global() -> Option<&'static Settings> {
    GLOBAL_SETTINGS.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertical::LevelKind;

    #[test]
    fn test_empty_config_gives_defaults() {
        let settings = Settings::from_yaml_str("").unwrap();
        assert_eq!(settings.colocation.method, SpatialMethod::Auto);
        assert_eq!(settings.colocation.max_time_offset_minutes, Some(60.0));
        assert_eq!(settings.model.species_variable, "SpeciesConcVV_CH4");
        assert!(settings.vertical.normalize_pressure_weight);
        assert!(settings.satellites.is_empty());
    }

    #[test]
    fn test_partial_config() {
        let yaml = "
colocation:
  method: point
  max_time_offset_minutes: 30
model:
  species_variable: SpeciesConcVV_CO
  pressure:
    kind: hybrid
    surface_pressure_variable: PS
";
        let settings = Settings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.colocation.method, SpatialMethod::Point);
        assert_eq!(settings.colocation.max_time_offset(), Some(chrono::Duration::minutes(30)));
        // untouched fields keep their defaults
        assert_eq!(settings.colocation.min_coverage, 0.5);
        assert_eq!(settings.model.species_variable, "SpeciesConcVV_CO");
        match settings.model.pressure {
            ModelPressureSettings::Hybrid { ap_variable, surface_pressure_variable, .. } => {
                assert_eq!(ap_variable, "hyai");
                assert_eq!(surface_pressure_variable, "PS");
            }
            _ => panic!("Expected hybrid pressure settings"),
        }
    }

    #[test]
    fn test_custom_satellite() {
        let yaml = "
satellites:
  my_sat:
    species: NO2
    units: ppb
    level_kind: centers
    variables:
      averaging_kernel: ak
";
        let settings = Settings::from_yaml_str(yaml).unwrap();
        let op = settings.satellites.get("my_sat").unwrap();
        assert_eq!(op.level_kind, LevelKind::Centers);
        assert_eq!(op.variables.averaging_kernel, "ak");
        // Unspecified variables fall back to the generic names
        assert_eq!(op.variables.pressure_weight, "pressure_weight");
    }

    #[test]
    fn test_invalid_values() {
        let err = Settings::from_yaml_str("colocation:\n  min_coverage: 1.5\n").unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { field: "colocation.min_coverage", .. }));

        let err = Settings::from_yaml_str("colocation:\n  method: nearest\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::from_yaml_file(Path::new("/definitely/not/a/config.yml")).unwrap_err();
        assert!(matches!(err, SettingsError::MissingFile(_)));
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.yml", "colocation:\n  method: overlap\n  min_coverage: 0.25\n")?;
            jail.set_env("GCSAT_COLOCATION__METHOD", "point");
            jail.set_env("GCSAT_OUTPUT__SUPEROBS", "true");

            let settings = Settings::from_yaml_file(Path::new("config.yml")).unwrap();
            assert_eq!(settings.colocation.method, SpatialMethod::Point);
            assert_eq!(settings.colocation.min_coverage, 0.25);
            assert!(settings.output.superobs);

            // A YAML string is taken as is
            let settings = Settings::from_yaml_str("colocation:\n  method: overlap\n").unwrap();
            assert_eq!(settings.colocation.method, SpatialMethod::Overlap);
            Ok(())
        });
    }

    #[test]
    fn test_load_or_default() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GCSAT_COLOCATION__METHOD", "point");
            let settings = Settings::load_or_default(Path::new("missing.yml")).unwrap();
            assert_eq!(settings.colocation.method, SpatialMethod::Point);
            assert_eq!(settings.colocation.min_coverage, 0.5);
            assert!(settings.satellites.is_empty());

            jail.create_file("present.yml", "colocation:\n  min_coverage: 0.8\n")?;
            let settings = Settings::load_or_default(Path::new("present.yml")).unwrap();
            assert_eq!(settings.colocation.min_coverage, 0.8);
            assert_eq!(settings.colocation.method, SpatialMethod::Point);

            jail.create_file("bad.yml", "colocation:\n  min_coverage: 2.0\n")?;
            let err = Settings::load_or_default(Path::new("bad.yml")).unwrap_err();
            assert!(matches!(err, SettingsError::InvalidValue { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_global_settings() {
        assert!(global().is_none());
        let mut settings = Settings::default();
        settings.colocation.method = SpatialMethod::Overlap;
        let installed = init_global(settings).unwrap();
        assert_eq!(installed.colocation.method, SpatialMethod::Overlap);
        assert_eq!(global().map(|s| s.colocation.method), Some(SpatialMethod::Overlap));

        let err = init_global(Settings::default()).unwrap_err();
        assert!(matches!(err, SettingsError::AlreadyInitialized));
        assert_eq!(global().map(|s| s.colocation.method), Some(SpatialMethod::Overlap));
    }

    #[test]
    fn test_spatial_method_from_str() {
        use std::str::FromStr;
        assert_eq!(SpatialMethod::from_str("Overlap").unwrap(), SpatialMethod::Overlap);
        assert_eq!(SpatialMethod::Point.to_string(), "point");
    }
}
