//! Events delivered by the host to the script engine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Context;

/// Payload types with a fixed descriptor
pub trait EventPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const EVENT_TYPE: &'static str;
}

/// Event descriptor, compared case-insensitively
///
/// Stored trimmed and lowercased. `*` stands for every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn any() -> Self {
        Self("*".to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == "*"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One occurrence of an event
///
/// Untyped events carry a JSON payload, which triggers read through
/// `event-<key>` expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T = serde_json::Value> {
    pub event_type: EventType,
    pub data: T,
    pub fired_at: DateTime<Utc>,
    pub context: Context,
}

impl<T> Event<T> {
    pub fn new(event_type: impl Into<EventType>, data: T, context: Context) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            fired_at: Utc::now(),
            context,
        }
    }

    fn with_data<U>(self, data: U) -> Event<U> {
        Event {
            event_type: self.event_type,
            data,
            fired_at: self.fired_at,
            context: self.context,
        }
    }
}

impl<T: EventPayload> Event<T> {
    pub fn typed(data: T, context: Context) -> Self {
        Self::new(T::EVENT_TYPE, data, context)
    }

    /// The same event with its payload as JSON
    pub fn into_untyped(self) -> Event {
        let data = serde_json::to_value(&self.data).unwrap_or_default();
        self.with_data(data)
    }
}

impl Event {
    /// Top-level payload field; an exact key wins over a case-insensitive one
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        let map = self.data.as_object()?;
        map.get(key).or_else(|| {
            map.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value)
        })
    }

    /// The payload decoded as `T`, if this is a `T` event
    pub fn decode<T: EventPayload>(&self) -> Option<Event<T>> {
        if self.event_type.as_str() != T::EVENT_TYPE {
            return None;
        }
        let data = serde_json::from_value(self.data.clone()).ok()?;
        Some(self.clone().with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ScriptLoadData;
    use serde_json::json;

    #[test]
    fn test_event_type_is_case_insensitive() {
        assert_eq!(EventType::new("Join"), EventType::new(" join "));
        assert!(EventType::any().is_any());
        let decoded: EventType = serde_json::from_value(json!("Chat")).unwrap();
        assert_eq!(decoded.as_str(), "chat");
    }

    #[test]
    fn test_field_lookup() {
        let event = Event::new("chat", json!({"Player": "alex", "message": "hi"}), Context::new());
        assert_eq!(event.field("player"), Some(&json!("alex")));
        assert_eq!(event.field("message"), Some(&json!("hi")));
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn test_typed_round_trip() {
        let typed = Event::typed(
            ScriptLoadData {
                script: "greet".to_string(),
                triggers: 3,
            },
            Context::engine(),
        );
        let untyped = typed.into_untyped();
        assert_eq!(untyped.event_type.as_str(), "script_load");
        assert_eq!(untyped.field("triggers"), Some(&json!(3)));

        let decoded = untyped.decode::<ScriptLoadData>().unwrap();
        assert_eq!(decoded.data.script, "greet");
        assert!(Event::new("join", json!({}), Context::new())
            .decode::<ScriptLoadData>()
            .is_none());
    }
}
