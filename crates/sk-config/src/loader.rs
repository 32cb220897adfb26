//! YAML with `!include` and `!env_var`
//!
//! `!include file` splices in another document, resolved against the
//! directory of the file holding the tag. `!env_var NAME [default]` is
//! replaced by the variable's value, re-read as a YAML scalar so that
//! `!env_var STEPS 100` yields a number.

use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads YAML documents and expands their custom tags
pub struct YamlLoader {
    root: PathBuf,
    /// Files being expanded, outermost first
    chain: Vec<PathBuf>,
    env: EnvLookup,
}

impl YamlLoader {
    /// Relative paths given to [`load_file`](Self::load_file) start at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chain: Vec::new(),
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Read `!env_var` values from `lookup` instead of the process
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(lookup);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = absolute(&self.root, path.as_ref());
        if self.chain.contains(&path) {
            let mut chain = self.chain.clone();
            chain.push(path);
            return Err(ConfigError::IncludeCycle { chain });
        }
        debug!(path = %path.display(), depth = self.chain.len(), "Reading YAML");

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        self.chain.push(path.clone());
        let expanded = self.load_str(&text, &path);
        self.chain.pop();
        expanded
    }

    /// Parse `text` as if it were the content of `origin`
    pub fn load_str(&mut self, text: &str, origin: &Path) -> ConfigResult<Value> {
        let document: Value = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;
        self.expand(document, origin)
    }

    fn expand(&mut self, value: Value, origin: &Path) -> ConfigResult<Value> {
        Ok(match value {
            Value::Tagged(tagged) => self.expand_tag(*tagged, origin)?,
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| self.expand(item, origin))
                    .collect::<ConfigResult<_>>()?,
            ),
            Value::Mapping(entries) => {
                let mut expanded = Mapping::with_capacity(entries.len());
                for (key, value) in entries {
                    expanded.insert(self.expand(key, origin)?, self.expand(value, origin)?);
                }
                Value::Mapping(expanded)
            }
            scalar => scalar,
        })
    }

    fn expand_tag(&mut self, tagged: TaggedValue, origin: &Path) -> ConfigResult<Value> {
        let name = tagged.tag.to_string();
        trace!(tag = %name, file = %origin.display(), "Expanding tag");
        match name.trim_start_matches('!') {
            "include" => {
                let target = argument("!include", &tagged.value, origin)?;
                let base = origin.parent().unwrap_or(&self.root).to_path_buf();
                self.load_file(absolute(&base, Path::new(target)))
            }
            "env_var" => {
                let argument = argument("!env_var", &tagged.value, origin)?;
                self.env_var(argument)
            }
            // Left for the consumer
            _ => Ok(Value::Tagged(Box::new(TaggedValue {
                tag: tagged.tag,
                value: self.expand(tagged.value, origin)?,
            }))),
        }
    }

    fn env_var(&self, argument: &str) -> ConfigResult<Value> {
        let (name, default) = match argument.split_once(char::is_whitespace) {
            Some((name, default)) => (name, Some(default.trim())),
            None => (argument, None),
        };
        let raw = match ((self.env)(name), default) {
            (Some(value), _) => value,
            (None, Some(default)) => {
                debug!(var = name, "Environment variable unset, using default");
                default.to_string()
            }
            (None, None) => {
                return Err(ConfigError::MissingEnv {
                    name: name.to_string(),
                })
            }
        };
        Ok(match serde_yaml::from_str(&raw) {
            Ok(scalar @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => scalar,
            _ => Value::String(raw),
        })
    }
}

fn argument<'v>(tag: &'static str, value: &'v Value, origin: &Path) -> ConfigResult<&'v str> {
    match value.as_str().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(ConfigError::BadTag {
            tag,
            file: origin.to_path_buf(),
            reason: format!("expected a non-empty string, found {value:?}"),
        }),
    }
}

fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Load `file` from `root`, expanding custom tags
pub fn load_yaml(root: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(root).load_file(file)
}

/// Expand the custom tags of in-memory YAML named `name` under `root`
pub fn load_yaml_string(root: impl Into<PathBuf>, text: &str, name: &str) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(root);
    let origin = loader.root().join(name);
    loader.load_str(text, &origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, text: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }

    fn key<'a>(value: &'a Value, name: &str) -> &'a Value {
        value.get(name).unwrap_or_else(|| panic!("no key {name} in {value:?}"))
    }

    fn expand_with_env(text: &str, vars: &'static [(&'static str, &'static str)]) -> ConfigResult<Value> {
        let mut loader = YamlLoader::new("/etc/skript").with_env(move |name| {
            vars.iter()
                .find(|(var, _)| *var == name)
                .map(|(_, value)| value.to_string())
        });
        loader.load_str(text, Path::new("/etc/skript/skript.yaml"))
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "parts/executor.yaml", "tick_interval_ms: 20\n");
        write(dir.path(), "parts/engine.yaml", "executor: !include executor.yaml\n");
        write(dir.path(), "skript.yaml", "engine: !include parts/engine.yaml\n");

        let value = load_yaml(dir.path(), "skript.yaml").unwrap();
        let executor = key(key(&value, "engine"), "executor");
        assert_eq!(key(executor, "tick_interval_ms"), &Value::from(20));
    }

    #[test]
    fn test_include_cycle_names_every_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write(dir.path(), "b.yaml", "a: !include a.yaml\n");

        match load_yaml(dir.path(), "a.yaml") {
            Err(ConfigError::IncludeCycle { chain }) => {
                let names: Vec<_> = chain
                    .iter()
                    .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
                    .collect();
                assert_eq!(names, vec!["a.yaml", "b.yaml", "a.yaml"]);
            }
            other => panic!("expected an include cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_env_var_keeps_scalar_type() {
        let value = expand_with_env(
            "max_steps: !env_var SK_STEPS\nlog_level: !env_var SK_LEVEL\n",
            &[("SK_STEPS", "5000"), ("SK_LEVEL", "trace")],
        )
        .unwrap();
        assert_eq!(key(&value, "max_steps"), &Value::from(5000));
        assert_eq!(key(&value, "log_level"), &Value::from("trace"));
    }

    #[test]
    fn test_env_var_default() {
        let value = expand_with_env("log_level: !env_var SK_UNSET debug\n", &[]).unwrap();
        assert_eq!(key(&value, "log_level"), &Value::from("debug"));

        let missing = expand_with_env("log_level: !env_var SK_UNSET\n", &[]);
        assert!(matches!(missing, Err(ConfigError::MissingEnv { name }) if name == "SK_UNSET"));
    }

    #[test]
    fn test_tag_argument_must_be_text() {
        let error = load_yaml_string("/tmp", "parser: !include [a, b]\n", "skript.yaml").unwrap_err();
        assert!(matches!(error, ConfigError::BadTag { tag: "!include", .. }));
    }

    #[test]
    fn test_unknown_tags_are_kept() {
        let value = load_yaml_string("/tmp", "mode: !custom fast\n", "skript.yaml").unwrap();
        assert!(matches!(key(&value, "mode"), Value::Tagged(_)));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.yaml", "key: [unclosed\n");
        match load_yaml(dir.path(), "broken.yaml") {
            Err(ConfigError::Yaml { path, .. }) => assert!(path.ends_with("broken.yaml")),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
