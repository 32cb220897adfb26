//! Error types for pattern compilation

use thiserror::Error;

/// Result type for pattern operations
pub type PatternResult<T> = Result<T, PatternSyntaxError>;

/// A registered pattern could not be compiled
///
/// Positions are character offsets into the pattern source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternSyntaxError {
    /// A group, placeholder or regex was opened but never closed
    #[error("missing closing '{expected}' for '{open}' at {position} in pattern '{pattern}'")]
    Unclosed {
        pattern: String,
        open: char,
        expected: char,
        position: usize,
    },

    /// A closing bracket without a matching opening bracket
    #[error("unexpected '{found}' at {position} in pattern '{pattern}'")]
    UnexpectedClose {
        pattern: String,
        found: char,
        position: usize,
    },

    /// `()` or `[]` with nothing inside
    #[error("empty group at {position} in pattern '{pattern}'")]
    EmptyGroup { pattern: String, position: usize },

    /// Placeholder with a missing or malformed type name
    #[error("malformed placeholder '%{placeholder}%' at {position} in pattern '{pattern}': {reason}")]
    MalformedPlaceholder {
        pattern: String,
        placeholder: String,
        position: usize,
        reason: String,
    },

    /// Regex group that does not compile
    #[error("invalid regex '<{regex}>' in pattern '{pattern}': {message}")]
    InvalidRegex {
        pattern: String,
        regex: String,
        message: String,
    },

    /// Parse mark that is not a number
    #[error("invalid parse mark '{mark}' at {position} in pattern '{pattern}'")]
    InvalidMark {
        pattern: String,
        mark: String,
        position: usize,
    },

    /// Structure the matcher could not split deterministically
    #[error("illegal nesting at {position} in pattern '{pattern}': {reason}")]
    IllegalNesting {
        pattern: String,
        position: usize,
        reason: String,
    },
}
