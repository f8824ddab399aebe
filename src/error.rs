//! Error types for the aggregation engine.

use crate::types::Window;
use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for the aggregation engine.
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Period {period} produced by both window {first_window} and window {second_window}")]
    AggregationConsistency {
        period: NaiveDate,
        first_window: Window,
        second_window: Window,
    },

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("No records loaded")]
    NoData,
}

impl AggregationError {
    /// Whether the run must stop when this error occurs.
    ///
    /// Checkpoint failures are the only recoverable kind: the in-memory
    /// matrix stays authoritative and aggregation continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AggregationError::CheckpointError(_))
    }
}

/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregationError>;
