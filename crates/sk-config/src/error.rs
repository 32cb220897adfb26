//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A custom tag with an argument it cannot use
    #[error("bad {tag} in {}: {reason}", .file.display())]
    BadTag {
        tag: &'static str,
        file: PathBuf,
        reason: String,
    },

    /// Files in include order, ending with the file included twice
    #[error("include cycle: {}", chain_display(.chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error("environment variable '{name}' is not set and has no default")]
    MissingEnv { name: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

fn chain_display(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
