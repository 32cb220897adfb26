//! Per-invocation execution state

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sk_core::{Context, Event, Origin, Value};
use sk_variables::{GlobalVariables, LocalVariables, SharedGlobals};
use tracing::info;
use ulid::Ulid;

use crate::error::{RuntimeError, RuntimeResult};

/// Where `broadcast` messages go
pub trait OutputSink: Send + Sync + fmt::Debug {
    fn broadcast(&self, message: &str);
}

/// Writes broadcasts to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn broadcast(&self, message: &str) {
        info!(target: "skript::broadcast", "{}", message);
    }
}

/// Keeps broadcasts in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl OutputSink for MemorySink {
    fn broadcast(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Cancellation flag shared between an invocation and its owner
///
/// A child token is cancelled when either it or any ancestor is.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    own: Arc<AtomicBool>,
    parent: Option<Box<CancellationToken>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.own.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.own.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    pub fn child(&self) -> Self {
        Self {
            own: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }
}

/// Progress of one running loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopState {
    /// Values still to iterate with their list index, if any
    pub items: Vec<(Option<String>, Value)>,
    /// Iterations started so far
    pub iteration: usize,
}

impl LoopState {
    pub fn over(items: Vec<(Option<String>, Value)>) -> Self {
        Self { items, iteration: 0 }
    }

    /// Move to the next value; `false` once the values are used up
    pub fn advance(&mut self) -> bool {
        if self.iteration >= self.items.len() {
            return false;
        }
        self.iteration += 1;
        true
    }

    pub fn value(&self) -> Option<&Value> {
        self.iteration
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .map(|(_, value)| value)
    }

    /// The list index of the current value, or the iteration number
    pub fn index(&self) -> String {
        self.iteration
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .and_then(|(key, _)| key.clone())
            .unwrap_or_else(|| self.iteration.to_string())
    }
}

/// State of one trigger invocation
///
/// Owned by exactly one invocation at a time. When the invocation
/// suspends, the context travels inside its continuation.
#[derive(Debug)]
pub struct ExecutionContext {
    pub id: String,
    pub trigger: Arc<str>,
    pub event: Arc<Event>,
    pub locals: LocalVariables,
    pub globals: SharedGlobals,
    /// Running loops by nesting slot
    pub loops: Vec<Option<LoopState>>,
    pub output: Arc<dyn OutputSink>,
    pub cancellation: CancellationToken,
    pub context: Context,
    /// Set by `return` inside a function body
    pub returned: Option<Vec<Value>>,
    /// Function calls enclosing this invocation
    pub call_depth: usize,
}

impl ExecutionContext {
    pub fn new(
        trigger: Arc<str>,
        event: Arc<Event>,
        globals: SharedGlobals,
        output: Arc<dyn OutputSink>,
        cancellation: CancellationToken,
    ) -> Self {
        let context = event
            .context
            .caused_by(Origin::Trigger(trigger.to_string()));
        Self {
            id: Ulid::new().to_string(),
            trigger,
            event,
            locals: LocalVariables::new(),
            globals,
            loops: Vec::new(),
            output,
            cancellation,
            context,
            returned: None,
            call_depth: 0,
        }
    }

    /// Context with an empty event and private globals
    pub fn detached(trigger: &str) -> Self {
        let event = Event::new("*", serde_json::Value::Null, Context::new());
        Self::new(
            Arc::from(trigger),
            Arc::new(event),
            Arc::new(GlobalVariables::new()),
            Arc::new(LogSink),
            CancellationToken::new(),
        )
    }

    pub fn check_cancelled(&self) -> RuntimeResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        Ok(())
    }

    pub fn loop_state(&self, slot: usize) -> Option<&LoopState> {
        self.loops.get(slot).and_then(Option::as_ref)
    }

    pub fn loop_state_mut(&mut self, slot: usize) -> Option<&mut LoopState> {
        self.loops.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn enter_loop(&mut self, slot: usize, state: LoopState) {
        if self.loops.len() <= slot {
            self.loops.resize(slot + 1, None);
        }
        self.loops[slot] = Some(state);
    }

    pub fn exit_loop(&mut self, slot: usize) {
        if let Some(state) = self.loops.get_mut(slot) {
            *state = None;
        }
    }

    /// Payload field of the bound event
    pub fn event_value(&self, key: &str) -> Option<Value> {
        self.event.field(key).and_then(Value::from_json)
    }

    pub fn broadcast(&self, message: &str) {
        self.output.broadcast(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_token_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();
        let sibling = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(!sibling.is_cancelled());

        parent.cancel();
        assert!(sibling.is_cancelled());
    }

    #[test]
    fn test_loop_state() {
        let mut state = LoopState::over(vec![
            (Some("a".into()), Value::from(1.0)),
            (None, Value::from(2.0)),
        ]);
        assert_eq!(state.value(), None);
        assert!(state.advance());
        assert_eq!(state.value(), Some(&Value::from(1.0)));
        assert_eq!(state.index(), "a");
        assert!(state.advance());
        assert_eq!(state.index(), "2");
        assert!(!state.advance());
    }

    #[test]
    fn test_loop_slots() {
        let mut ctx = ExecutionContext::detached("test");
        ctx.enter_loop(1, LoopState::default());
        assert!(ctx.loop_state(0).is_none());
        assert!(ctx.loop_state(1).is_some());
        ctx.exit_loop(1);
        assert!(ctx.loop_state(1).is_none());
    }

    #[test]
    fn test_event_value_and_broadcast() {
        let sink = Arc::new(MemorySink::new());
        let event = Event::new("join", json!({"player": "alex"}), Context::new());
        let ctx = ExecutionContext::new(
            Arc::from("on join"),
            Arc::new(event),
            Arc::new(GlobalVariables::new()),
            sink.clone(),
            CancellationToken::new(),
        );
        assert_eq!(ctx.event_value("player"), Some(Value::text("alex")));
        ctx.broadcast("hello");
        assert_eq!(sink.take(), vec!["hello".to_string()]);
        assert!(ctx.check_cancelled().is_ok());
    }
}
