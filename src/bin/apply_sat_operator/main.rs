use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use gcsat_rs::{
    files::apply_operator_to_files,
    logging::init_logging,
    operator::{ModelColumns, ObsStatus},
    settings::{init_global, Settings, SpatialMethod, DEFAULT_CONFIG_FILE},
    writers::{superobs::write_superobs, write_model_columns},
};
use tabled::{settings::Style, Table, Tabled};

fn main() -> ExitCode {
    let clargs = Cli::parse();
    if let Err(e) = init_logging(clargs.verbosity.log_level_filter(), clargs.log_file.as_deref()) {
        eprintln!("Could not set up logging: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = driver(clargs) {
        eprintln!("An error occurred:\n{e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn driver(clargs: Cli) -> error_stack::Result<(), CliError> {
    let mut settings = Settings::load_or_default(&clargs.config)
        .change_context_lazy(|| CliError::Config(clargs.config.clone()))?;
    if let Some(method) = clargs.method {
        log::debug!("Overriding colocation method with {method}");
        settings.colocation.method = method;
    }
    let settings = init_global(settings).change_context_lazy(|| CliError::Config(clargs.config.clone()))?;

    let columns = apply_operator_to_files(&clargs.satellite_name, &clargs.model_files, &clargs.satellite_file, settings)
        .change_context(CliError::Operator)?;

    print_summary(&columns);

    if let Some(output) = &clargs.output {
        write_model_columns(output, &columns).change_context(CliError::Write)?;
    }

    match (&clargs.superobs_output, settings.output.superobs) {
        (Some(path), _) => {
            let resolution = settings.output.superobs_resolution.unwrap_or(columns.grid_resolution);
            write_superobs(path, &columns, resolution).change_context(CliError::Write)?;
        }
        (None, true) => log::warn!("output.superobs is set but no --superobs-output file was given"),
        (None, false) => {}
    }

    Ok(())
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Status")]
    status: ObsStatus,
    #[tabled(rename = "Observations")]
    count: usize,
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Statistic")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn print_summary(columns: &ModelColumns) {
    let rows = columns
        .summary()
        .iter()
        .map(|(status, count)| StatusRow { status, count })
        .collect::<Vec<_>>();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{} observations processed with the {} operator:\n{table}", columns.nobs(), columns.operator);

    let Some(stats) = columns.comparison() else {
        println!("No observations have both a model and retrieved column to compare");
        return;
    };
    let units = &columns.units;
    let rows = vec![
        StatsRow { name: "N", value: stats.n.to_string() },
        StatsRow { name: "Mean bias (model - satellite)", value: format!("{:.3} {units}", stats.mean_bias) },
        StatsRow { name: "Bias std. dev.", value: format!("{:.3} {units}", stats.std) },
        StatsRow { name: "RMSE", value: format!("{:.3} {units}", stats.rmse) },
        StatsRow { name: "Pearson r", value: format!("{:.4}", stats.r) },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("\n{} {} comparison:\n{table}", columns.species, columns.operator);
}

/// Sample GEOS-Chem output as a satellite would see it.
///
/// Each satellite observation is matched to the closest model time and the model cells
/// under its footprint, and the retrieval's averaging kernel and pressure weighting
/// function are applied to the model profile. Observations that cannot be processed
/// are kept with a status saying why.
#[derive(Debug, Parser)]
struct Cli {
    /// Name of the satellite operator to use, see list_sat_operators for the options.
    satellite_name: String,

    /// Model output file, or a glob pattern (quote it) matching several files to
    /// join along time.
    model_files: String,

    /// Satellite retrieval file (.json, or .nc/.nc4 with netCDF support).
    satellite_file: PathBuf,

    /// Configuration file. Defaults are used if it does not exist.
    #[clap(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Where to write the model columns (.json, or .nc/.nc4 with netCDF support).
    /// If not given, only the summary is printed.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Override the colocation method in the configuration (point, overlap or auto).
    #[clap(short, long)]
    method: Option<SpatialMethod>,

    /// Also average valid observations into super-observations and write them here.
    #[clap(long)]
    superobs_output: Option<PathBuf>,

    /// Also write log messages, including per-observation rejections, to this file.
    #[clap(long)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Could not load settings from {}", .0.display())]
    Config(PathBuf),
    #[error("Could not apply the satellite operator")]
    Operator,
    #[error("Could not write output")]
    Write,
}
