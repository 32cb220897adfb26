//! Type name identifying a kind of value

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Error type for invalid type names
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeNameError {
    #[error("type name cannot be empty")]
    Empty,

    #[error("type name '{0}' contains invalid characters (must be lowercase alphanumeric, spaces, '_' or '-', starting with a letter)")]
    InvalidChars(String),
}

/// Code name of a registered type (e.g. "number", "text", "player")
///
/// Type names are lowercase. The plural form used in patterns (`%numbers%`)
/// is not a TypeName; it is resolved through the type registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName(Cow<'static, str>);

impl TypeName {
    /// Root type every value belongs to
    pub const OBJECT: TypeName = TypeName(Cow::Borrowed("object"));
    pub const BOOLEAN: TypeName = TypeName(Cow::Borrowed("boolean"));
    pub const NUMBER: TypeName = TypeName(Cow::Borrowed("number"));
    pub const TEXT: TypeName = TypeName(Cow::Borrowed("text"));
    pub const TIMESPAN: TypeName = TypeName(Cow::Borrowed("timespan"));
    /// Structured payload data that has no more specific type
    pub const JSON: TypeName = TypeName(Cow::Borrowed("json"));

    /// Create a validated type name
    pub fn new(name: impl Into<String>) -> Result<Self, TypeNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(Cow::Owned(name)))
    }

    /// Check whether a string is a well-formed type name
    pub fn validate(name: &str) -> Result<(), TypeNameError> {
        let first = name.chars().next().ok_or(TypeNameError::Empty)?;
        let valid = first.is_ascii_lowercase()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, ' ' | '_' | '-'));
        if valid {
            Ok(())
        } else {
            Err(TypeNameError::InvalidChars(name.to_string()))
        }
    }

    /// Get the type name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TypeName {
    type Error = TypeNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TypeName> for String {
    fn from(name: TypeName) -> Self {
        name.0.into_owned()
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(TypeName::new("number").is_ok());
        assert!(TypeName::new("living entity").is_ok());
        assert!(TypeName::new("item_type-2").is_ok());
        assert_eq!(TypeName::new("number").unwrap(), TypeName::NUMBER);
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(TypeName::new(""), Err(TypeNameError::Empty));
        assert!(TypeName::new("Number").is_err());
        assert!(TypeName::new("2fast").is_err());
        assert!(TypeName::new("num%ber").is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&TypeName::TEXT).unwrap();
        assert_eq!(json, "\"text\"");
        let back: TypeName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TypeName::TEXT);
        assert!(serde_json::from_str::<TypeName>("\"Bad\"").is_err());
    }
}
