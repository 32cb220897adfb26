//! User-defined functions
//!
//! A script declares `function name(param: type, ...) :: type:`. The
//! signature is registered before any body is compiled, so calls anywhere
//! in the script, including recursive ones, resolve against it. The body
//! is attached once its script compiled without errors.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use sk_core::{TypeName, Value};
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::ExecutionContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub type_name: TypeName,
    /// Declared with the plural type name; bound as a list variable
    pub plural: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnType {
    pub type_name: TypeName,
    pub plural: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    /// Script declaring the function
    pub script: String,
    pub parameters: Vec<Parameter>,
    pub returns: Option<ReturnType>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.type_name))
            .collect();
        write!(f, "{}({})", self.name, parameters.join(", "))?;
        if let Some(returns) = &self.returns {
            write!(f, " :: {}", returns.type_name)?;
        }
        Ok(())
    }
}

/// Runs a function body with its bound arguments
pub trait FunctionBody: Send + Sync + fmt::Debug {
    /// `arguments` holds the values of each parameter in declared order
    fn call(&self, arguments: Vec<Vec<Value>>, caller: &ExecutionContext) -> RuntimeResult<Vec<Value>>;
}

#[derive(Debug)]
pub struct Function {
    pub signature: Signature,
    body: RwLock<Option<Arc<dyn FunctionBody>>>,
}

impl Function {
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            body: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn define(&self, body: Arc<dyn FunctionBody>) {
        *self.body.write() = Some(body);
    }

    pub fn is_defined(&self) -> bool {
        self.body.read().is_some()
    }

    pub fn call(&self, arguments: Vec<Vec<Value>>, caller: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let expected = self.signature.parameters.len();
        if arguments.len() != expected {
            return Err(RuntimeError::Failed(format!(
                "{} takes {expected} arguments, got {}",
                self.signature,
                arguments.len()
            )));
        }
        let body = self.body.read().clone().ok_or_else(|| {
            RuntimeError::Failed(format!("function '{}' has no body yet", self.signature.name))
        })?;
        body.call(arguments, caller)
    }
}

/// Declared functions by lowercase name
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Function>> {
        self.functions
            .get(&name.to_lowercase())
            .map(|function| Arc::clone(&function))
    }

    /// Register a signature, returning what it replaced
    ///
    /// A script may redeclare its own functions; a name owned by another
    /// script is refused. The body of a replaced function is carried over
    /// until the new one is defined.
    pub fn declare(&self, signature: Signature) -> Result<(Arc<Function>, Option<Arc<Function>>), String> {
        let key = signature.name.to_lowercase();
        let previous = self.get(&key);
        if let Some(previous) = &previous {
            if previous.signature.script != signature.script {
                return Err(format!(
                    "function '{}' is already defined in script '{}'",
                    signature.name, previous.signature.script
                ));
            }
        }

        let function = Arc::new(Function::new(signature));
        if let Some(body) = previous.as_ref().and_then(|p| p.body.read().clone()) {
            function.define(body);
        }
        debug!(function = %function.signature, "Declared function");
        self.functions.insert(key, Arc::clone(&function));
        Ok((function, previous))
    }

    /// Put back what a failed compile replaced
    pub fn restore(&self, name: &str, previous: Option<Arc<Function>>) {
        let key = name.to_lowercase();
        match previous {
            Some(previous) => {
                self.functions.insert(key, previous);
            }
            None => {
                self.functions.remove(&key);
            }
        }
    }

    pub fn declared_by(&self, script: &str) -> Vec<Arc<Function>> {
        self.functions
            .iter()
            .filter(|function| function.signature.script == script)
            .map(|function| Arc::clone(&function))
            .collect()
    }

    /// Drop every function declared by `script`
    pub fn remove_script(&self, script: &str) -> usize {
        let before = self.functions.len();
        self.functions
            .retain(|_, function| function.signature.script != script);
        before - self.functions.len()
    }

    /// Declared names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .iter()
            .map(|function| function.signature.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Echo;

    impl FunctionBody for Echo {
        fn call(&self, arguments: Vec<Vec<Value>>, _caller: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
            Ok(arguments.into_iter().flatten().collect())
        }
    }

    fn signature(name: &str, script: &str) -> Signature {
        Signature {
            name: name.to_string(),
            script: script.to_string(),
            parameters: vec![Parameter {
                name: "x".to_string(),
                type_name: TypeName::NUMBER,
                plural: false,
            }],
            returns: Some(ReturnType {
                type_name: TypeName::NUMBER,
                plural: false,
            }),
        }
    }

    #[test]
    fn test_declare_and_call() {
        let registry = FunctionRegistry::new();
        let (function, previous) = registry.declare(signature("Echo", "a")).unwrap();
        assert!(previous.is_none());
        assert_eq!(function.signature.to_string(), "Echo(x: number) :: number");

        let ctx = ExecutionContext::detached("test");
        assert!(function.call(vec![vec![Value::from(1.0)]], &ctx).is_err());

        function.define(Arc::new(Echo));
        let found = registry.get("echo").unwrap();
        assert_eq!(
            found.call(vec![vec![Value::from(1.0)]], &ctx).unwrap(),
            vec![Value::from(1.0)]
        );
        assert!(found.call(Vec::new(), &ctx).is_err());
    }

    #[test]
    fn test_names_belong_to_one_script() {
        let registry = FunctionRegistry::new();
        let (first, _) = registry.declare(signature("echo", "a")).unwrap();
        first.define(Arc::new(Echo));

        assert!(registry.declare(signature("echo", "b")).is_err());

        // Redeclaring keeps the old body until the new one is defined
        let (second, previous) = registry.declare(signature("echo", "a")).unwrap();
        assert!(second.is_defined());
        registry.restore("echo", previous);
        assert!(Arc::ptr_eq(&registry.get("echo").unwrap(), &first));

        assert_eq!(registry.remove_script("a"), 1);
        assert!(registry.is_empty());
    }
}
