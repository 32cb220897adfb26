//! Causality of events and invocations

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Who caused an event or invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Origin {
    /// Delivered by the host, e.g. read from stdin
    #[default]
    Host,
    /// Fired by the engine itself, e.g. `script_load`
    Engine,
    /// Caused by a running trigger
    Trigger(String),
}

/// Identity of an event or invocation plus the context that caused it
///
/// An event starts invocations with child contexts; events fired from an
/// invocation carry a child of the invocation's context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// A root context for a host event
    pub fn new() -> Self {
        Self::root(Origin::Host)
    }

    /// A root context for an event fired by the engine
    pub fn engine() -> Self {
        Self::root(Origin::Engine)
    }

    fn root(origin: Origin) -> Self {
        Self {
            id: Ulid::new().to_string(),
            origin,
            parent_id: None,
        }
    }

    /// A context caused by this one, keeping its origin
    pub fn child(&self) -> Self {
        self.caused_by(self.origin.clone())
    }

    /// A context caused by this one on behalf of `origin`
    pub fn caused_by(&self, origin: Origin) -> Self {
        Self {
            id: Ulid::new().to_string(),
            origin,
            parent_id: Some(self.id.clone()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
