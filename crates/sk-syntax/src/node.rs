//! Statement and structure nodes
//!
//! Each category is a closed enum. Control-flow variants are known to the
//! executor; everything else dispatches through [`Effect`] or [`Condition`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sk_core::{Event, EventType};

use crate::error::RuntimeResult;
use crate::expr::Expr;
use crate::function::Signature;
use crate::runtime::ExecutionContext;

/// Behavior of a vocabulary-defined effect
pub trait Effect: Send + Sync + fmt::Debug {
    fn execute(&self, ctx: &mut ExecutionContext) -> RuntimeResult<()>;

    /// Whether the executor may run this effect off the tick thread
    fn is_async(&self) -> bool {
        false
    }

    fn describe(&self) -> String;
}

/// Behavior of a vocabulary-defined condition
pub trait Condition: Send + Sync + fmt::Debug {
    fn check(&self, ctx: &ExecutionContext) -> RuntimeResult<bool>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub enum EffectNode {
    /// Suspend the invocation for the evaluated timespan
    Delay(Expr),
    /// End the invocation
    Stop,
    /// Leave the innermost loop
    ExitLoop,
    /// Skip to the next iteration of the innermost loop
    Continue,
    /// End a function call with the evaluated values
    Return(Expr),
    Run(Arc<dyn Effect>),
}

impl EffectNode {
    pub fn run(effect: impl Effect + 'static) -> Self {
        EffectNode::Run(Arc::new(effect))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, EffectNode::Run(effect) if effect.is_async())
    }

    pub fn describe(&self) -> String {
        match self {
            EffectNode::Delay(expr) => format!("wait {}", expr.describe()),
            EffectNode::Stop => "stop".to_string(),
            EffectNode::ExitLoop => "exit loop".to_string(),
            EffectNode::Continue => "continue".to_string(),
            EffectNode::Return(expr) => format!("return {}", expr.describe()),
            EffectNode::Run(effect) => effect.describe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConditionNode {
    inner: Arc<dyn Condition>,
    negated: bool,
}

impl ConditionNode {
    pub fn new(condition: impl Condition + 'static) -> Self {
        Self {
            inner: Arc::new(condition),
            negated: false,
        }
    }

    pub fn negate(mut self, negated: bool) -> Self {
        self.negated ^= negated;
        self
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn check(&self, ctx: &ExecutionContext) -> RuntimeResult<bool> {
        Ok(self.inner.check(ctx)? != self.negated)
    }

    pub fn describe(&self) -> String {
        let inner = self.inner.describe();
        if self.negated {
            format!("not ({inner})")
        } else {
            inner
        }
    }
}

/// Statements that own an indented body
#[derive(Debug, Clone)]
pub enum SectionNode {
    If(ConditionNode),
    ElseIf(ConditionNode),
    Else,
    /// Iterate the values of an expression
    Loop(Expr),
    /// Iterate `1..=n`
    Times(Expr),
    While(ConditionNode),
}

impl SectionNode {
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            SectionNode::Loop(_) | SectionNode::Times(_) | SectionNode::While(_)
        )
    }

    pub fn describe(&self) -> String {
        match self {
            SectionNode::If(c) => format!("if {}", c.describe()),
            SectionNode::ElseIf(c) => format!("else if {}", c.describe()),
            SectionNode::Else => "else".to_string(),
            SectionNode::Loop(e) => format!("loop {}", e.describe()),
            SectionNode::Times(e) => format!("loop {} times", e.describe()),
            SectionNode::While(c) => format!("while {}", c.describe()),
        }
    }
}

pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// An event the host can deliver, plus an optional payload filter
#[derive(Clone)]
pub struct EventMatcher {
    pub event_type: EventType,
    pub description: String,
    filter: Option<EventFilter>,
}

impl EventMatcher {
    pub fn new(event_type: impl Into<EventType>, description: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            description: description.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        (self.event_type.is_any() || event.event_type == self.event_type)
            && self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMatcher")
            .field("event_type", &self.event_type)
            .field("description", &self.description)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Top-level script headers
#[derive(Debug, Clone)]
pub enum StructureNode {
    /// `on <event>:`
    Event(EventMatcher),
    /// `every <timespan>:`
    Periodic(Duration),
    /// `function name(param: type) :: type:`
    Function(Signature),
}

/// Whatever a factory built
#[derive(Debug, Clone)]
pub enum Node {
    Expression(Expr),
    Effect(EffectNode),
    Condition(ConditionNode),
    Section(SectionNode),
    Event(EventMatcher),
    Structure(StructureNode),
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Expression(_) => "expression",
            Node::Effect(_) => "effect",
            Node::Condition(_) => "condition",
            Node::Section(_) => "section",
            Node::Event(_) => "event",
            Node::Structure(_) => "structure",
        }
    }
}

impl From<Expr> for Node {
    fn from(expr: Expr) -> Self {
        Node::Expression(expr)
    }
}

impl From<EffectNode> for Node {
    fn from(effect: EffectNode) -> Self {
        Node::Effect(effect)
    }
}

impl From<ConditionNode> for Node {
    fn from(condition: ConditionNode) -> Self {
        Node::Condition(condition)
    }
}

impl From<SectionNode> for Node {
    fn from(section: SectionNode) -> Self {
        Node::Section(section)
    }
}

impl From<EventMatcher> for Node {
    fn from(event: EventMatcher) -> Self {
        Node::Event(event)
    }
}

impl From<StructureNode> for Node {
    fn from(structure: StructureNode) -> Self {
        Node::Structure(structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sk_core::Context;

    #[derive(Debug)]
    struct Always(bool);

    impl Condition for Always {
        fn check(&self, _ctx: &ExecutionContext) -> RuntimeResult<bool> {
            Ok(self.0)
        }

        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_condition_negation() {
        let ctx = ExecutionContext::detached("test");
        let condition = ConditionNode::new(Always(true));
        assert!(condition.check(&ctx).unwrap());

        let negated = condition.negate(true);
        assert!(!negated.check(&ctx).unwrap());
        assert_eq!(negated.describe(), "not (true)");
        assert!(!negated.negate(true).is_negated());
    }

    #[test]
    fn test_event_matcher_filter() {
        let matcher = EventMatcher::new("chat", "chat").with_filter(|event| {
            event.field("message").and_then(|m| m.as_str()) == Some("hi")
        });
        let hi = Event::new("chat", json!({"message": "hi"}), Context::new());
        let bye = Event::new("chat", json!({"message": "bye"}), Context::new());
        let join = Event::new("join", json!({"message": "hi"}), Context::new());

        assert!(matcher.matches(&hi));
        assert!(!matcher.matches(&bye));
        assert!(!matcher.matches(&join));
    }

    #[test]
    fn test_section_kinds() {
        assert!(SectionNode::Times(Expr::literal(3.0)).is_loop());
        assert!(!SectionNode::Else.is_loop());
        assert_eq!(SectionNode::Times(Expr::literal(3.0)).describe(), "loop 3 times");
    }
}
