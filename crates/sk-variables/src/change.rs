//! Changes applied to variables

use sk_core::Value;

/// A mutation of a variable or list
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Replace the value; a list is reindexed from 1
    Set(Vec<Value>),
    /// Append to a list, or add numerically to a single variable
    Add(Vec<Value>),
    /// Remove matching list elements, or subtract from a single variable
    Remove(Vec<Value>),
    Delete,
}

impl Change {
    pub fn verb(&self) -> &'static str {
        match self {
            Change::Set(_) => "set",
            Change::Add(_) => "add",
            Change::Remove(_) => "remove",
            Change::Delete => "delete",
        }
    }
}
