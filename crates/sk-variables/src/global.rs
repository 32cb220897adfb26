//! Process-wide variables

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use sk_core::Value;
use tracing::{debug, info, instrument};

use crate::change::Change;
use crate::error::{VariableError, VariableResult};
use crate::name::VariableName;
use crate::node::VariableNode;

/// Global variables shared by every execution
///
/// Each top-level key (the part before the first `::`) has its own
/// reader/writer lock. Readers of unrelated keys never block each other,
/// and a change to one key is applied entirely under its write lock.
#[derive(Debug, Default)]
pub struct GlobalVariables {
    roots: DashMap<String, Arc<RwLock<VariableNode>>>,
}

/// Thread-safe handle to the global variables
pub type SharedGlobals = Arc<GlobalVariables>;

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    fn root(&self, key: &str) -> Option<Arc<RwLock<VariableNode>>> {
        self.roots.get(key).map(|root| Arc::clone(root.value()))
    }

    fn root_or_insert(&self, key: &str) -> Arc<RwLock<VariableNode>> {
        if let Some(root) = self.root(key) {
            return root;
        }
        Arc::clone(self.roots.entry(key.to_string()).or_default().value())
    }

    pub fn get(&self, name: &VariableName) -> Option<Value> {
        let root = self.root(name.root())?;
        let node = root.read();
        node.value(&name.path()[1..]).cloned()
    }

    pub fn read(&self, name: &VariableName) -> Vec<Value> {
        match self.root(name.root()) {
            Some(root) => root.read().read(name, &name.path()[1..]),
            None => Vec::new(),
        }
    }

    pub fn entries(&self, name: &VariableName) -> Vec<(String, Value)> {
        match self.root(name.root()) {
            Some(root) => root.read().entries(&name.path()[1..]),
            None => Vec::new(),
        }
    }

    /// Apply a change under the key's write lock
    #[instrument(skip(self, change), fields(variable = %name, change = change.verb()))]
    pub fn change(&self, name: &VariableName, change: &Change) -> VariableResult<()> {
        let root = self.root_or_insert(name.root());
        let mut node = root.write();
        node.apply(name, &name.path()[1..], change)?;
        debug!("Changed global variable");
        Ok(())
    }

    pub fn set(&self, name: &VariableName, value: Value) -> VariableResult<()> {
        self.change(name, &Change::Set(vec![value]))
    }

    /// Run `f` with exclusive access to the tree of `name`'s top-level key
    pub fn update<R>(&self, name: &VariableName, f: impl FnOnce(&mut VariableNode) -> R) -> R {
        let root = self.root_or_insert(name.root());
        let mut node = root.write();
        f(&mut node)
    }

    /// Number of top-level keys holding a value
    pub fn len(&self) -> usize {
        self.roots
            .iter()
            .filter(|root| !root.value().read().is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every non-empty top-level tree, sorted by key
    pub fn snapshot(&self) -> BTreeMap<String, VariableNode> {
        let roots: Vec<(String, Arc<RwLock<VariableNode>>)> = self
            .roots
            .iter()
            .map(|root| (root.key().clone(), Arc::clone(root.value())))
            .collect();
        roots
            .into_iter()
            .filter_map(|(key, root)| {
                let node = root.read();
                (!node.is_empty()).then(|| (key, node.clone()))
            })
            .collect()
    }

    /// Write the variables to a JSON file
    ///
    /// The file is written next to its final location and then renamed.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> VariableResult<()> {
        let snapshot = self.snapshot();
        let io_error = |source| VariableError::Io {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_vec_pretty(&snapshot).map_err(|source| {
            VariableError::Serialization {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let temp = path.with_extension("tmp");
        std::fs::write(&temp, json).map_err(io_error)?;
        std::fs::rename(&temp, path).map_err(io_error)?;

        info!(variables = snapshot.len(), "Saved global variables");
        Ok(())
    }

    /// Read variables saved by [`save`](Self::save)
    ///
    /// A missing file yields an empty store.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> VariableResult<Self> {
        let store = Self::new();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No variables file, starting empty");
                return Ok(store);
            }
            Err(source) => {
                return Err(VariableError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let roots: BTreeMap<String, VariableNode> =
            serde_json::from_str(&content).map_err(|source| VariableError::Serialization {
                path: path.to_path_buf(),
                source,
            })?;
        for (key, node) in roots {
            store.roots.insert(key, Arc::new(RwLock::new(node)));
        }

        info!(variables = store.roots.len(), "Loaded global variables");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> VariableName {
        VariableName::parse(raw).unwrap()
    }

    #[test]
    fn test_set_get() {
        let globals = GlobalVariables::new();
        globals.set(&name("var"), Value::from(5.0)).unwrap();
        assert_eq!(globals.get(&name("VAR")), Some(Value::from(5.0)));
        assert_eq!(globals.get(&name("other")), None);
        assert_eq!(globals.len(), 1);
    }

    #[test]
    fn test_list_paths() {
        let globals = GlobalVariables::new();
        globals.set(&name("list::1"), Value::from("a")).unwrap();
        globals.set(&name("list::2"), Value::from("b")).unwrap();
        assert_eq!(
            globals.read(&name("list::*")),
            vec![Value::from("a"), Value::from("b")]
        );

        globals.change(&name("list::1"), &Change::Delete).unwrap();
        assert_eq!(globals.read(&name("list::*")), vec![Value::from("b")]);

        globals.change(&name("list::*"), &Change::Delete).unwrap();
        assert!(globals.read(&name("list::*")).is_empty());
        assert!(globals.is_empty());
    }

    #[test]
    fn test_update_is_exclusive() {
        let globals = GlobalVariables::new();
        let counter = name("counter");
        let value = globals.update(&counter, |node| {
            node.value = Some(Value::from(1.0));
            node.value.clone()
        });
        assert_eq!(value, Some(Value::from(1.0)));
        assert_eq!(globals.get(&counter), Some(Value::from(1.0)));
    }
}
