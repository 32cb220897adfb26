//! YAML configuration loading for the script engine
//!
//! Configuration files are plain YAML with two custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use sk_config::EngineConfig;
//!
//! let config = EngineConfig::load("skript.yaml")?;
//! println!("scripts in {}", config.scripts_dir.display());
//! ```

mod engine_config;
mod error;
mod loader;

pub use engine_config::{EngineConfig, ExecutorSettings, MatchPolicy, ParserSettings};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};

pub use serde_yaml::Value;
