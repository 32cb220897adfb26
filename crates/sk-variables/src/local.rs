//! Variables owned by one execution

use sk_core::Value;

use crate::change::Change;
use crate::error::VariableResult;
use crate::name::VariableName;
use crate::node::VariableNode;

/// Local scope of a single trigger invocation
///
/// Exclusively owned by its execution context, so no locking is involved.
/// Insertion order is preserved for list iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalVariables {
    root: VariableNode,
}

impl LocalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &VariableName) -> Option<Value> {
        self.root.value(name.path()).cloned()
    }

    pub fn read(&self, name: &VariableName) -> Vec<Value> {
        self.root.read(name, name.path())
    }

    pub fn entries(&self, name: &VariableName) -> Vec<(String, Value)> {
        self.root.entries(name.path())
    }

    pub fn change(&mut self, name: &VariableName, change: &Change) -> VariableResult<()> {
        self.root.apply(name, name.path(), change)
    }

    pub fn set(&mut self, name: &VariableName, value: Value) -> VariableResult<()> {
        self.change(name, &Change::Set(vec![value]))
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root = VariableNode::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_set_and_get() {
        let mut locals = LocalVariables::new();
        let name = VariableName::parse("_x").unwrap();
        locals.set(&name, Value::from(5.0)).unwrap();
        assert_eq!(locals.get(&name), Some(Value::from(5.0)));
        assert_eq!(locals.read(&name), vec![Value::from(5.0)]);

        locals.change(&name, &Change::Delete).unwrap();
        assert!(locals.is_empty());
    }

    #[test]
    fn test_local_list_entries() {
        let mut locals = LocalVariables::new();
        let list = VariableName::parse("_l::*").unwrap();
        locals
            .change(&list, &Change::Set(vec![Value::from("a"), Value::from("b")]))
            .unwrap();
        let entries = locals.entries(&list);
        assert_eq!(entries[0], ("1".to_string(), Value::from("a")));
        assert_eq!(entries[1], ("2".to_string(), Value::from("b")));
    }
}
