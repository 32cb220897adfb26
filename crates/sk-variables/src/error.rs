//! Error types for variable storage

use std::path::PathBuf;
use thiserror::Error;

/// Result type for variable operations
pub type VariableResult<T> = Result<T, VariableError>;

#[derive(Debug, Error)]
pub enum VariableError {
    /// Name that cannot address a variable
    #[error("invalid variable name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Several values assigned to a single variable
    #[error("cannot set single variable '{name}' to {count} values")]
    MultipleValues { name: String, count: usize },

    /// Change that the stored value does not support
    #[error("cannot {change} {value} on variable '{name}'")]
    UnsupportedChange {
        name: String,
        change: &'static str,
        value: String,
    },

    /// Failed to read or write the variables file
    #[error("failed to access variables file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to encode or decode the variables file
    #[error("failed to parse variables file {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
