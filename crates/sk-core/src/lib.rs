//! Core types for the script engine
//!
//! This crate provides the fundamental types shared by every layer of the
//! engine: [`Value`] and its [`TypeName`], the [`Event`] delivered by the
//! host, and the [`Context`] that tracks causality between invocations.

mod context;
mod event;
mod timespan;
mod type_name;
mod value;

pub use context::{Context, Origin};
pub use event::{Event, EventPayload, EventType};
pub use timespan::{format_timespan, parse_timespan, TICK};
pub use type_name::{TypeName, TypeNameError};
pub use value::Value;

/// Standard event types fired by the engine itself
pub mod events {
    use super::*;

    /// Fired once for every script after it has been (re)loaded
    pub const SCRIPT_LOAD: &str = "script_load";

    /// Prefix for descriptors of periodic triggers (`every 5 seconds:`)
    pub const PERIODIC_PREFIX: &str = "periodic:";

    /// Data for SCRIPT_LOAD events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct ScriptLoadData {
        pub script: String,
        pub triggers: usize,
    }

    impl EventPayload for ScriptLoadData {
        const EVENT_TYPE: &'static str = SCRIPT_LOAD;
    }
}
