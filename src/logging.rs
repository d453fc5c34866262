use std::path::Path;

use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M} - {m}{n}";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Could not create log file {path}: {cause}")]
    LogFile { path: String, cause: String },
    #[error("Invalid logging configuration: {0}")]
    Config(String),
    #[error("A logger was already initialized")]
    AlreadyInitialized,
}

/// Set up logging to stderr at `level` and, optionally, to `log_file`.
///
/// The log file (overwritten if it exists) always records at least DEBUG messages so that
/// the reasons individual observations were rejected are kept even for quiet runs.
pub fn init_logging(level: log::LevelFilter, log_file: Option<&Path>) -> Result<(), LoggingError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({d(%Y-%m-%d %H:%M:%S)} [{l}] from line {L} in {M})} - {m}{n}")))
        .target(Target::Stderr)
        .build();

    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(level)))
            .build("stderr", Box::new(stderr)),
    );
    let mut root = Root::builder().appender("stderr");
    let mut root_level = level;

    if let Some(path) = log_file {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .append(false)
            .build(path)
            .map_err(|e| LoggingError::LogFile {
                path: path.display().to_string(),
                cause: e.to_string(),
            })?;
        builder = builder.appender(Appender::builder().build("logfile", Box::new(file)));
        root = root.appender("logfile");
        root_level = root_level.max(log::LevelFilter::Debug);
    }

    let config = builder
        .build(root.build(root_level))
        .map_err(|e| LoggingError::Config(e.to_string()))?;

    log4rs::init_config(config).map_err(|_| LoggingError::AlreadyInitialized)?;
    Ok(())
}
