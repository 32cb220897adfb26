//! Error types for script loading and execution

use std::fmt;
use std::path::PathBuf;

use sk_syntax::{CompileError, SyntaxError};
use sk_variables::VariableError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Every compile error of one script
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The script did not compile; none of its triggers were loaded
    #[error("script '{script}' has {} error(s): {errors}", errors.len())]
    Compile { script: String, errors: CompileErrors },

    #[error("failed to read script {path}: {source}")]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script '{0}' is not loaded")]
    UnknownScript(String),

    #[error("engine is shut down")]
    ShutDown,

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Variables(#[from] VariableError),
}
