use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use gcsat_rs::{
    logging::init_logging,
    satellites::{all_operators, builtin_operators},
    settings::{Settings, DEFAULT_CONFIG_FILE},
};
use tabled::{settings::Style, Table, Tabled};

fn main() -> ExitCode {
    let clargs = Cli::parse();
    if let Err(e) = init_logging(clargs.verbosity.log_level_filter(), None) {
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

#[derive(Tabled)]
struct OperatorRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Species")]
    species: String,
    #[tabled(rename = "Units")]
    units: String,
    #[tabled(rename = "Levels")]
    levels: String,
    #[tabled(rename = "Source")]
    source: &'static str,
    #[tabled(rename = "Description")]
    description: String,
}

fn driver(clargs: Cli) -> error_stack::Result<(), CliError> {
    let settings = if clargs.builtin_only {
        Settings::default()
    } else {
        Settings::load_or_default(&clargs.config).change_context_lazy(|| CliError(clargs.config.clone()))?
    };

    let builtin = builtin_operators();
    let rows = all_operators(&settings)
        .into_iter()
        .map(|(name, op)| OperatorRow {
            source: if builtin.contains_key(&name) && !settings.satellites.contains_key(&name) {
                "built-in"
            } else {
                "config"
            },
            species: op.species,
            units: op.units,
            levels: format!("{}, {}, {}", op.level_kind, op.level_order, op.pressure_units),
            description: op.description,
            name,
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

/// List the satellite operators that apply_sat_operator can use: the built-in ones and
/// any defined in the configuration file.
#[derive(Debug, Parser)]
struct Cli {
    /// Configuration file to read user-defined operators from.
    #[clap(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Only list the built-in operators.
    #[clap(short, long)]
    builtin_only: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, thiserror::Error)]
#[error("Could not load settings from {}", .0.display())]
struct CliError(PathBuf);

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();

        let clargs = Cli::try_parse_from(["list_sat_operators", "-b"]).unwrap();
        assert!(clargs.builtin_only);
        assert_eq!(clargs.verbosity.log_level_filter(), log::LevelFilter::Info);

        let clargs = Cli::try_parse_from(["list_sat_operators", "-q", "--config", "sat.yml"]).unwrap();
        assert_eq!(clargs.config, PathBuf::from("sat.yml"));
        assert_eq!(clargs.verbosity.log_level_filter(), log::LevelFilter::Warn);
    }
}
