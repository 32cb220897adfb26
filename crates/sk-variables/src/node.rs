//! Variable tree nodes

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sk_core::Value;

use crate::change::Change;
use crate::error::{VariableError, VariableResult};
use crate::name::VariableName;

/// A variable value together with its list children
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, VariableNode>,
}

impl VariableNode {
    pub fn leaf(value: Value) -> Self {
        Self {
            value: Some(value),
            children: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.values().all(VariableNode::is_empty)
    }

    pub fn node(&self, path: &[String]) -> Option<&VariableNode> {
        path.iter()
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    fn node_mut(&mut self, path: &[String]) -> Option<&mut VariableNode> {
        let mut node = self;
        for segment in path {
            node = node.children.get_mut(segment)?;
        }
        Some(node)
    }

    fn node_or_insert(&mut self, path: &[String]) -> &mut VariableNode {
        let mut node = self;
        for segment in path {
            node = node.children.entry(segment.clone()).or_default();
        }
        node
    }

    pub fn value(&self, path: &[String]) -> Option<&Value> {
        self.node(path)?.value.as_ref()
    }

    /// `(index, value)` pairs of the direct children holding a value
    pub fn entries(&self, path: &[String]) -> Vec<(String, Value)> {
        self.node(path)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|(index, child)| Some((index.clone(), child.value.clone()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Values addressed by `name`, relative to this node
    pub fn read(&self, name: &VariableName, path: &[String]) -> Vec<Value> {
        if name.is_list() {
            self.entries(path).into_iter().map(|(_, value)| value).collect()
        } else {
            self.value(path).cloned().into_iter().collect()
        }
    }

    /// Apply `change` to the variable at `path` below this node
    pub fn apply(
        &mut self,
        name: &VariableName,
        path: &[String],
        change: &Change,
    ) -> VariableResult<()> {
        if name.is_list() {
            self.apply_list(path, change);
            return Ok(());
        }

        match change {
            Change::Set(values) => match values.as_slice() {
                [] => self.delete(path),
                [value] => self.node_or_insert(path).value = Some(value.clone()),
                _ => {
                    return Err(VariableError::MultipleValues {
                        name: name.to_string(),
                        count: values.len(),
                    })
                }
            },
            Change::Delete => self.delete(path),
            Change::Add(values) | Change::Remove(values) => {
                let current = self.value(path).cloned();
                let updated = arithmetic(name, change, current, values)?;
                self.node_or_insert(path).value = Some(updated);
            }
        }
        Ok(())
    }

    fn apply_list(&mut self, path: &[String], change: &Change) {
        match change {
            Change::Set(values) => {
                let node = self.node_or_insert(path);
                node.children.clear();
                for (i, value) in values.iter().enumerate() {
                    node.children
                        .insert((i + 1).to_string(), VariableNode::leaf(value.clone()));
                }
            }
            Change::Add(values) => {
                let node = self.node_or_insert(path);
                for value in values {
                    let index = node.next_index();
                    node.children.insert(index, VariableNode::leaf(value.clone()));
                }
            }
            Change::Remove(values) => {
                if let Some(node) = self.node_mut(path) {
                    node.children.retain(|_, child| {
                        !child
                            .value
                            .as_ref()
                            .is_some_and(|current| values.iter().any(|v| v.loosely_equals(current)))
                    });
                }
            }
            Change::Delete => {
                if let Some(node) = self.node_mut(path) {
                    node.children.clear();
                }
            }
        }
    }

    /// Remove the value at `path`; a childless node leaves its list
    fn delete(&mut self, path: &[String]) {
        let Some((last, parent)) = path.split_last() else {
            self.value = None;
            return;
        };
        let Some(parent) = self.node_mut(parent) else {
            return;
        };
        match parent.children.get_mut(last) {
            Some(child) if child.children.is_empty() => {
                parent.children.shift_remove(last);
            }
            Some(child) => child.value = None,
            None => {}
        }
    }

    /// First free numeric index starting after the current size
    fn next_index(&self) -> String {
        let mut index = self.children.len() + 1;
        while self.children.contains_key(&index.to_string()) {
            index += 1;
        }
        index.to_string()
    }
}

fn arithmetic(
    name: &VariableName,
    change: &Change,
    current: Option<Value>,
    values: &[Value],
) -> VariableResult<Value> {
    let start = match (current, values.first()) {
        (Some(current), _) => current,
        (None, Some(Value::Timespan(_))) => Value::Timespan(Duration::ZERO),
        (None, _) => Value::Number(0.0),
    };
    let subtract = matches!(change, Change::Remove(_));

    values.iter().try_fold(start, |acc, value| match (&acc, value) {
        (Value::Number(a), Value::Number(b)) => {
            Ok(Value::Number(if subtract { a - b } else { a + b }))
        }
        (Value::Timespan(a), Value::Timespan(b)) => Ok(Value::Timespan(if subtract {
            a.saturating_sub(*b)
        } else {
            a.saturating_add(*b)
        })),
        _ => Err(VariableError::UnsupportedChange {
            name: name.to_string(),
            change: change.verb(),
            value: value.to_string(),
        }),
    })
}
