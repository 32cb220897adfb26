//! Engine configuration
//!
//! Parsed from the root of `skript.yaml`. Every field has a default, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// How the parser picks between several matching syntax entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// The first entry in registry order wins
    FirstMatch,
    /// The entry consuming the most literal text wins
    #[default]
    BestMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    /// Maximum nesting of sub-expressions
    pub max_depth: usize,
    /// Step budget of a single pattern attempt
    pub max_steps: usize,
    /// Entry attempts and span resolutions allowed for one line
    pub max_line_steps: usize,
    pub policy: MatchPolicy,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_steps: 20_000,
            max_line_steps: 250_000,
            policy: MatchPolicy::BestMatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Bound on iterations of a single `while` loop run
    pub max_loop_iterations: usize,
    /// Length of one host tick
    pub tick_interval_ms: u64,
    /// Shorter delays are clamped to this
    pub min_delay_ms: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_loop_iterations: 10_000,
            tick_interval_ms: 50,
            min_delay_ms: 50,
        }
    }
}

/// Engine configuration from `skript.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory scanned for `*.sk` files
    pub scripts_dir: PathBuf,

    /// JSON file holding the global variables between runs
    pub variables_file: PathBuf,

    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,

    pub parser: ParserSettings,

    pub executor: ExecutorSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            variables_file: PathBuf::from("variables.json"),
            log_level: "info".to_string(),
            parser: ParserSettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    ///
    /// Relative paths in the file are taken relative to the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = path.file_name().map(Path::new).unwrap_or(path);
        let yaml = load_yaml(config_dir, file)?;

        let mut config = Self::from_yaml(&yaml)?;
        config.scripts_dir = resolve(config_dir, &config.scripts_dir);
        config.variables_file = resolve(config_dir, &config.variables_file);
        debug!(
            scripts_dir = %config.scripts_dir.display(),
            variables_file = %config.variables_file.display(),
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let config: EngineConfig = match yaml {
            // An empty document
            Value::Null => EngineConfig::default(),
            Value::Mapping(_) => {
                serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::InvalidValue {
                    key: "root".to_string(),
                    reason: e.to_string(),
                })?
            }
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "root".to_string(),
                    reason: "configuration must be a mapping".to_string(),
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |key: &str, reason: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.parser.max_depth == 0 {
            return invalid("parser.max_depth", "must be at least 1");
        }
        if self.parser.max_steps == 0 {
            return invalid("parser.max_steps", "must be at least 1");
        }
        if self.parser.max_line_steps == 0 {
            return invalid("parser.max_line_steps", "must be at least 1");
        }
        if self.executor.max_loop_iterations == 0 {
            return invalid("executor.max_loop_iterations", "must be at least 1");
        }
        if self.executor.tick_interval_ms == 0 {
            return invalid("executor.tick_interval_ms", "must be at least 1");
        }
        if self.log_level.trim().is_empty() {
            return invalid("log_level", "must not be empty");
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> ConfigResult<EngineConfig> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        EngineConfig::from_yaml(&value)
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.parser.max_depth, 32);
        assert_eq!(config.parser.max_steps, 20_000);
        assert_eq!(config.parser.max_line_steps, 250_000);
        assert_eq!(config.parser.policy, MatchPolicy::BestMatch);
        assert_eq!(config.executor.max_loop_iterations, 10_000);
        assert_eq!(config.executor.tick_interval_ms, 50);
        assert_eq!(config.executor.min_delay_ms, 50);
    }

    #[test]
    fn test_partial_sections() {
        let config = parse(
            r#"
log_level: debug
parser:
  policy: first_match
executor:
  min_delay_ms: 0
"#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.parser.policy, MatchPolicy::FirstMatch);
        assert_eq!(config.parser.max_depth, 32);
        assert_eq!(config.executor.min_delay_ms, 0);
        assert_eq!(config.executor.tick_interval_ms, 50);
    }

    #[test]
    fn test_validation() {
        let error = parse("parser:\n  max_depth: 0\n").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { ref key, .. } if key == "parser.max_depth"));
        let error = parse("parser:\n  max_line_steps: 0\n").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { ref key, .. } if key == "parser.max_line_steps"));

        let error = parse("executor:\n  tick_interval_ms: 0\n").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { ref key, .. } if key == "executor.tick_interval_ms"));

        assert!(matches!(
            parse("parser:\n  policy: random\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(parse("- a\n- b\n"), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("skript.yaml"),
            "scripts_dir: my-scripts\nvariables_file: /var/lib/skript/variables.json\n",
        )
        .unwrap();

        let config = EngineConfig::load(dir.path().join("skript.yaml")).unwrap();
        assert_eq!(config.scripts_dir, dir.path().join("my-scripts"));
        assert_eq!(
            config.variables_file,
            PathBuf::from("/var/lib/skript/variables.json")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path().join("absent.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
