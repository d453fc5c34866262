pub mod error;
pub mod utils;
pub mod units;
pub mod interpolation;
pub mod logging;
pub mod settings;
pub mod grid;
pub mod regrid;
pub mod vertical;
pub mod time_match;
pub mod model;
pub mod observations;
pub mod satellites;
pub mod operator;
pub mod readers;
pub mod writers;
pub mod files;

#[cfg(test)]
mod test_utils;
