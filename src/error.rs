//! Error types for the reweighting machinery

use polars::prelude::PolarsError;
use thiserror::Error;

/// Reweighting error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of stored corrections
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Weight database error
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Event source error
    #[error("event source error: {0}")]
    Polars(#[from] PolarsError),

    /// Campaign file parsing error
    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Accessor output does not match the stored correction
    #[error("arity mismatch for `{address}`: correction expects {expected} value(s), accessor gave {found}")]
    Arity { address: String, expected: usize, found: usize },

    /// Incompatible histogram binning
    #[error("binning error: {0}")]
    Binning(String),

    /// Plot rendering error
    #[error("plot error: {0}")]
    Plot(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
