//! Compiled scripts and triggers

use std::sync::Arc;
use std::time::Duration;

use sk_core::events::{PERIODIC_PREFIX, SCRIPT_LOAD};
use sk_core::{Event, EventType};
use sk_syntax::{ConditionNode, EffectNode, EventMatcher, SectionNode};

use crate::program::Program;

/// A statement of a trigger body
#[derive(Debug, Clone)]
pub struct Statement {
    /// 1-based line in the script
    pub line: usize,
    /// A delay may have run before this statement
    pub has_delay_before: bool,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Effect(EffectNode),
    Condition(ConditionNode),
    Section {
        section: SectionNode,
        body: Vec<Statement>,
    },
}

impl Statement {
    pub fn describe(&self) -> String {
        match &self.kind {
            StatementKind::Effect(effect) => effect.describe(),
            StatementKind::Condition(condition) => condition.describe(),
            StatementKind::Section { section, .. } => section.describe(),
        }
    }
}

/// What starts a trigger
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Event(EventMatcher),
    Periodic(Duration),
    /// Body of the named function; started by calls, never by events
    Function(String),
}

impl TriggerEvent {
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            TriggerEvent::Event(matcher) => Some(matcher.event_type.clone()),
            TriggerEvent::Periodic(interval) => Some(periodic_event_type(*interval)),
            TriggerEvent::Function(_) => None,
        }
    }
}

/// Descriptor of the events fired for `every <interval>` triggers
pub fn periodic_event_type(interval: Duration) -> EventType {
    EventType::new(format!("{PERIODIC_PREFIX}{}", interval.as_millis()))
}

/// A compiled trigger, owned by the script it came from
#[derive(Debug)]
pub struct Trigger {
    /// Header as written, e.g. `on script load`
    pub name: String,
    pub script: String,
    /// Line of the header
    pub line: usize,
    pub event: TriggerEvent,
    pub body: Vec<Statement>,
    pub program: Program,
}

impl Trigger {
    pub fn new(
        name: impl Into<String>,
        script: impl Into<String>,
        line: usize,
        event: TriggerEvent,
        body: Vec<Statement>,
    ) -> Self {
        let program = Program::lower(&body);
        Self {
            name: name.into(),
            script: script.into(),
            line,
            event,
            body,
            program,
        }
    }

    /// Whether `event` starts this trigger
    ///
    /// A script load only starts triggers of the script that was loaded.
    pub fn matches(&self, event: &Event) -> bool {
        match &self.event {
            TriggerEvent::Event(matcher) => {
                matcher.matches(event)
                    && (event.event_type.as_str() != SCRIPT_LOAD
                        || event
                            .field("script")
                            .and_then(|script| script.as_str())
                            .map_or(true, |script| script == self.script))
            }
            TriggerEvent::Periodic(interval) => event.event_type == periodic_event_type(*interval),
            TriggerEvent::Function(_) => false,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match self.event {
            TriggerEvent::Periodic(interval) => Some(interval),
            TriggerEvent::Event(_) | TriggerEvent::Function(_) => None,
        }
    }
}

/// The triggers compiled from one script file
#[derive(Debug)]
pub struct Script {
    pub name: String,
    pub triggers: Vec<Arc<Trigger>>,
    /// Functions the script declares, as written
    pub functions: Vec<String>,
}
