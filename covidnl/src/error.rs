//! Error types.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CovidError {
    #[error("Failed to read daily report '{path}': {reason}")]
    InputFile { path: PathBuf, reason: String },
    #[error("No daily reports matched '{0}'")]
    NoReports(String),
    #[error("Missing column '{column}' in '{path}'")]
    MissingColumn { path: PathBuf, column: String },
    #[error(
        "Expected {expected} daily columns between the start and as-of dates but found {found}"
    )]
    ColumnCountMismatch { expected: usize, found: usize },
    #[error("Invalid merge rules: {0}")]
    InvalidMergeRules(String),
    #[error("Invalid coordinate overrides: {0}")]
    InvalidOverrides(String),
    #[error("Country not found in time series: {0}")]
    CountryNotFound(String),
    #[error("Nothing to plot: {0}")]
    EmptySeries(String),
}
