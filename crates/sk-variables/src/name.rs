//! Variable names and list paths

use std::fmt;

use crate::error::{VariableError, VariableResult};

/// Separator between the segments of a variable name
pub const LIST_SEPARATOR: &str = "::";

/// A parsed variable name
///
/// Names are case-insensitive. A leading `_` marks a local variable and a
/// trailing `::*` addresses the direct children of a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableName {
    raw: String,
    local: bool,
    path: Vec<String>,
    list: bool,
}

impl VariableName {
    pub fn parse(raw: &str) -> VariableResult<Self> {
        let raw = raw.trim();
        let invalid = |reason: &str| VariableError::InvalidName {
            name: raw.to_string(),
            reason: reason.to_string(),
        };

        let (local, body) = match raw.strip_prefix('_') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if body.is_empty() {
            return Err(invalid("name is empty"));
        }

        let segments: Vec<&str> = body.split(LIST_SEPARATOR).collect();
        let last = segments.len() - 1;
        let mut path = Vec::with_capacity(segments.len());
        let mut list = false;
        for (i, segment) in segments.into_iter().enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(invalid("name has an empty segment"));
            }
            if segment == "*" {
                if i != last {
                    return Err(invalid("'*' must be the last segment"));
                }
                list = true;
            } else {
                path.push(segment.to_lowercase());
            }
        }
        if path.is_empty() {
            return Err(invalid("list has no name"));
        }

        Ok(Self {
            raw: raw.to_string(),
            local,
            path,
            list,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    /// Lowercased segments, without the list marker
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// First segment, which selects the lock in the global store
    pub fn root(&self) -> &str {
        &self.path[0]
    }

    /// Name of one element of this list
    pub fn element(&self, index: &str) -> Self {
        let raw = match self.raw.strip_suffix('*') {
            Some(prefix) if self.list => format!("{prefix}{index}"),
            _ => format!("{}{LIST_SEPARATOR}{index}", self.raw),
        };
        let mut path = self.path.clone();
        path.push(index.to_lowercase());
        Self {
            raw,
            local: self.local,
            path,
            list: false,
        }
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let name = VariableName::parse("Score").unwrap();
        assert_eq!(name.path(), ["score"]);
        assert!(!name.is_local());
        assert!(!name.is_list());
    }

    #[test]
    fn test_parse_local_list() {
        let name = VariableName::parse("_items::*").unwrap();
        assert!(name.is_local());
        assert!(name.is_list());
        assert_eq!(name.path(), ["items"]);
        assert_eq!(name.root(), "items");
    }

    #[test]
    fn test_parse_nested() {
        let name = VariableName::parse("score::steve").unwrap();
        assert_eq!(name.path(), ["score", "steve"]);
    }

    #[test]
    fn test_element() {
        let list = VariableName::parse("list::*").unwrap();
        let element = list.element("2");
        assert_eq!(element.as_str(), "list::2");
        assert_eq!(element.path(), ["list", "2"]);
        assert!(!element.is_list());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(VariableName::parse("").is_err());
        assert!(VariableName::parse("_").is_err());
        assert!(VariableName::parse("a::::b").is_err());
        assert!(VariableName::parse("a::*::b").is_err());
        assert!(VariableName::parse("*").is_err());
    }
}
