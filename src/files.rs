//! Running the column operator directly on files.
use std::path::Path;

use error_stack::ResultExt;

use crate::{
    operator::{get_model_columns, ModelColumns},
    readers::{read_model_files, read_satellite_file},
    satellites::get_operator,
    settings::Settings,
};

#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    #[error("Could not set up the '{0}' operator")]
    Operator(String),
    #[error("Could not read the satellite file {}", .0.display())]
    Satellite(std::path::PathBuf),
    #[error("Could not read the model files '{0}'")]
    Model(String),
    #[error("Could not compute model columns")]
    Columns,
}

/// Sample the model output matching `gc_filepath` (a path or glob pattern) at the
/// observations in `satellite_filepath`, read as described by the `satellite_name` operator.
pub fn apply_operator_to_files(
    satellite_name: &str,
    gc_filepath: &str,
    satellite_filepath: &Path,
    settings: &Settings,
) -> error_stack::Result<ModelColumns, FilesError> {
    let operator =
        get_operator(satellite_name, settings).change_context_lazy(|| FilesError::Operator(satellite_name.to_string()))?;
    log::debug!("Using operator {satellite_name}: {}", operator.description);

    let sat = read_satellite_file(satellite_filepath, &operator)
        .change_context_lazy(|| FilesError::Satellite(satellite_filepath.to_path_buf()))?;
    let model = read_model_files(gc_filepath, &settings.model)
        .change_context_lazy(|| FilesError::Model(gc_filepath.to_string()))?;

    if model.species != operator.species {
        log::warn!(
            "Model species {} does not match the {satellite_name} species {}",
            model.species,
            operator.species
        );
    }

    get_model_columns(&model, &sat, satellite_name, &operator, settings).change_context(FilesError::Columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{operator::ObsStatus, test_utils::test_data_dir};
    use approx::assert_abs_diff_eq;

    fn test_settings() -> Settings {
        Settings::from_yaml_file(&test_data_dir().join("inputs/config.yml")).unwrap()
    }

    fn model_pattern() -> String {
        test_data_dir().join("inputs/model_*.json").to_string_lossy().to_string()
    }

    #[test]
    fn test_apply_operator_to_files() {
        let settings = test_settings();
        let sat_file = test_data_dir().join("inputs/satellite.json");
        let cols = apply_operator_to_files("test_sat", &model_pattern(), &sat_file, &settings).unwrap();

        assert_eq!(cols.nobs(), 4);
        assert_eq!(
            cols.status,
            vec![ObsStatus::Valid, ObsStatus::Valid, ObsStatus::FailedQa, ObsStatus::NoTimeMatch]
        );
        assert_eq!(cols.time_index[..2], [Some(0), Some(1)]);
        assert_eq!(cols.n_cells[..2], [1, 1]);
        assert_abs_diff_eq!(cols.model_column[0], 1750.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cols.model_column[1], 1770.0, epsilon = 1e-6);
        assert!(cols.model_column[2].is_nan());

        let stats = cols.comparison().unwrap();
        assert_eq!(stats.n, 2);
        assert_abs_diff_eq!(stats.mean_bias, -7.5, epsilon = 1e-6);
    }

    #[test]
    fn test_unknown_operator() {
        let sat_file = test_data_dir().join("inputs/satellite.json");
        let err = apply_operator_to_files("no_such_sat", &model_pattern(), &sat_file, &test_settings()).unwrap_err();
        assert!(matches!(err.current_context(), FilesError::Operator(_)));
    }

    #[test]
    fn test_missing_model_files() {
        let sat_file = test_data_dir().join("inputs/satellite.json");
        let pattern = test_data_dir().join("inputs/GEOSChem_*.nc4");
        let err = apply_operator_to_files("test_sat", &pattern.to_string_lossy(), &sat_file, &test_settings())
            .unwrap_err();
        assert!(matches!(err.current_context(), FilesError::Model(_)));
    }
}
