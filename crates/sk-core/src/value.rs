//! Runtime values produced by expressions and stored in variables

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use crate::timespan::format_timespan;
use crate::TypeName;

/// A single runtime value
///
/// Expressions always evaluate to a list of values; a single-valued
/// expression yields at most one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Boolean(bool),
    Number(f64),
    Text(String),
    Timespan(Duration),
    /// A value of a vocabulary-defined type, carried as payload data
    Object {
        kind: TypeName,
        data: serde_json::Value,
    },
}

impl Value {
    /// Create a text value
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// The registered type this value belongs to
    pub fn type_name(&self) -> TypeName {
        match self {
            Value::Boolean(_) => TypeName::BOOLEAN,
            Value::Number(_) => TypeName::NUMBER,
            Value::Text(_) => TypeName::TEXT,
            Value::Timespan(_) => TypeName::TIMESPAN,
            Value::Object { kind, .. } => kind.clone(),
        }
    }

    /// Convert payload data into a value
    ///
    /// Returns `None` for JSON null. Arrays and objects become
    /// [`TypeName::JSON`] objects; callers that want list semantics should
    /// split arrays themselves.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            other => Some(Value::Object {
                kind: TypeName::JSON,
                data: other.clone(),
            }),
        }
    }

    /// Convert a value into payload data
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timespan(d) => serde_json::Value::from(d.as_millis() as u64),
            Value::Object { data, .. } => data.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timespan(&self) -> Option<Duration> {
        match self {
            Value::Timespan(d) => Some(*d),
            _ => None,
        }
    }

    /// Equality as scripts see it: text compares case-insensitively
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.eq_ignore_ascii_case(b),
            (Value::Number(a), Value::Number(b)) => (a - b).abs() < f64::EPSILON,
            _ => self == other,
        }
    }

    /// Ordering between comparable values of the same type
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Timespan(a), Value::Timespan(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Timespan(d) => f.write_str(&format_timespan(*d)),
            Value::Object { data, .. } => match data {
                serde_json::Value::String(s) => f.write_str(s),
                other => write!(f, "{}", other),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Timespan(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(5.0).to_string(), "5");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::text("hi").to_string(), "hi");
        assert_eq!(Value::Timespan(Duration::from_secs(2)).to_string(), "2 seconds");
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from_json(&json!(3)), Some(Value::Number(3.0)));
        assert_eq!(Value::from_json(&json!("x")), Some(Value::text("x")));
        assert_eq!(Value::from_json(&json!(null)), None);
        let obj = Value::from_json(&json!({"a": 1})).unwrap();
        assert_eq!(obj.type_name(), TypeName::JSON);
    }

    #[test]
    fn test_loose_equality_and_ordering() {
        assert!(Value::text("Steve").loosely_equals(&Value::text("steve")));
        assert!(!Value::text("5").loosely_equals(&Value::Number(5.0)));
        assert_eq!(
            Value::Number(1.0).compare(&Value::Number(2.0)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Number(1.0).compare(&Value::text("a")), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let value = Value::Object {
            kind: TypeName::new("player").unwrap(),
            data: json!({"name": "alex"}),
        };
        let encoded = serde_json::to_string(&value).unwrap();
        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, value);
    }
}
