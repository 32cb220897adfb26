//! Error types for registration, parsing and evaluation

use std::fmt;

use serde::Serialize;
use sk_core::TypeNameError;
use sk_patterns::PatternSyntaxError;
use sk_variables::VariableError;
use thiserror::Error;

use crate::category::Category;

/// Result type for registry operations
pub type SyntaxResult<T> = Result<T, SyntaxError>;

/// Errors raised while registering vocabulary
#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error(transparent)]
    Pattern(#[from] PatternSyntaxError),

    #[error("unknown type '{type_name}' in pattern '{pattern}'")]
    UnknownType { pattern: String, type_name: String },

    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    #[error(transparent)]
    TypeName(#[from] TypeNameError),
}

/// Result type for evaluation
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that abort a single trigger invocation
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{0} has no value")]
    MissingValue(String),

    #[error("{0} has more than one value")]
    NotSingle(String),

    #[error("expected {expected}, got {found}")]
    WrongType { expected: String, found: String },

    #[error("{0} cannot be changed")]
    NotChangeable(String),

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error("loop exceeded {0} iterations")]
    LoopLimit(usize),

    #[error("execution was cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// A placeholder span that parsed, but to a type the placeholder rejects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub text: String,
    pub found: String,
    pub expected: Vec<String>,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is {}, but {} is expected here",
            self.text,
            self.found,
            self.expected.join(" or ")
        )
    }
}

/// Why no registered entry accepted a line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseFailure {
    /// Normalized input
    pub input: String,
    pub category: Option<Category>,
    /// Every pattern tried, in order
    pub attempted: Vec<String>,
    /// Furthest byte offset any attempt reached
    pub furthest: usize,
    /// What would have been accepted at `furthest`
    pub expected: Vec<String>,
    /// Patterns whose attempt reached `furthest`
    pub candidates: Vec<String>,
    /// Messages from factories that refused a match
    pub rejections: Vec<String>,
    pub mismatches: Vec<TypeMismatch>,
    /// The nesting limit was hit
    pub too_deep: bool,
    /// The line ran out of parse steps
    pub too_complex: bool,
}

impl ParseFailure {
    pub fn new(input: impl Into<String>, category: Category) -> Self {
        Self {
            input: input.into(),
            category: Some(category),
            ..Self::default()
        }
    }

    /// Record a failed pattern attempt
    pub fn attempt(&mut self, pattern: &str, furthest: usize, expected: &[String]) {
        self.attempted.push(pattern.to_string());
        if furthest > self.furthest || self.candidates.is_empty() {
            self.furthest = furthest;
            self.expected.clear();
            self.candidates.clear();
        }
        if furthest == self.furthest {
            self.candidates.push(pattern.to_string());
            for e in expected {
                if !self.expected.contains(e) {
                    self.expected.push(e.clone());
                }
            }
        }
    }

    /// Fold another failure for the same input into this one
    pub fn merge(&mut self, other: ParseFailure) {
        self.attempted.extend(other.attempted);
        if other.furthest > self.furthest {
            self.furthest = other.furthest;
            self.expected = other.expected;
            self.candidates = other.candidates;
        } else if other.furthest == self.furthest {
            self.expected.extend(other.expected);
            self.candidates.extend(other.candidates);
        }
        self.rejections.extend(other.rejections);
        self.mismatches.extend(other.mismatches);
        self.too_deep |= other.too_deep;
        self.too_complex |= other.too_complex;
    }

    pub fn kind(&self) -> CompileErrorKind {
        if self.rejections.is_empty() && !self.mismatches.is_empty() {
            CompileErrorKind::TypeMismatch
        } else {
            CompileErrorKind::NoMatch
        }
    }

    /// Human-readable reason, `what` names the kind of line
    pub fn message(&self, what: &str) -> String {
        if self.too_complex {
            return format!("'{}' is too complex to parse", self.input);
        }
        if self.too_deep {
            return format!("'{}' is nested too deeply", self.input);
        }
        if let Some(rejection) = self.rejections.first() {
            return rejection.clone();
        }
        if let Some(mismatch) = self.mismatches.first() {
            return mismatch.to_string();
        }

        let mut message = format!("can't understand this {what}: '{}'", self.input);
        if !self.expected.is_empty() {
            let rest = self.input.get(self.furthest..).unwrap_or_default();
            let at = if rest.is_empty() {
                "at the end of the line".to_string()
            } else {
                format!("before '{rest}'")
            };
            message.push_str(&format!(" (expected {} {at})", self.expected.join(" or ")));
        }
        message
    }

    pub fn into_compile_error(self, line: usize, what: &str) -> CompileError {
        CompileError {
            line,
            span: self
                .input
                .get(self.furthest..)
                .unwrap_or_default()
                .to_string(),
            kind: self.kind(),
            message: self.message(what),
            candidates: self.candidates,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileErrorKind {
    NoMatch,
    TypeMismatch,
    Structure,
    Indentation,
}

/// A script line that could not be compiled
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[error("line {line}: {message}")]
pub struct CompileError {
    /// 1-based line number in the script
    pub line: usize,
    /// Offending text
    pub span: String,
    pub kind: CompileErrorKind,
    pub message: String,
    /// Patterns that came closest to matching
    pub candidates: Vec<String>,
}

impl CompileError {
    pub fn new(
        line: usize,
        kind: CompileErrorKind,
        span: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            span: span.into(),
            kind,
            message: message.into(),
            candidates: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_keeps_furthest_attempt() {
        let mut failure = ParseFailure::new("set to 5", Category::Effect);
        failure.attempt("broadcast %texts%", 0, &["'broadcast'".to_string()]);
        failure.attempt("set %~objects% to %objects%", 4, &["%objects%".to_string()]);
        failure.attempt("stop", 0, &["'stop'".to_string()]);

        assert_eq!(failure.attempted.len(), 3);
        assert_eq!(failure.furthest, 4);
        assert_eq!(failure.candidates, vec!["set %~objects% to %objects%"]);
        assert_eq!(
            failure.message("effect"),
            "can't understand this effect: 'set to 5' (expected %objects% before 'to 5')"
        );
    }

    #[test]
    fn test_mismatch_kind() {
        let mut failure = ParseFailure::new("wait \"soon\"", Category::Effect);
        failure.mismatches.push(TypeMismatch {
            text: "\"soon\"".into(),
            found: "text".into(),
            expected: vec!["timespan".into()],
        });
        let error = failure.into_compile_error(3, "effect");
        assert_eq!(error.kind, CompileErrorKind::TypeMismatch);
        assert_eq!(error.line, 3);
        assert!(error.message.contains("timespan"));
    }
}
