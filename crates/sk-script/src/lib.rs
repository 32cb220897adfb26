//! Script loading and execution
//!
//! Scripts are compiled by the [`ScriptCompiler`] into [`Trigger`]s, each
//! lowered to a flat [`Program`]. The [`ScriptEngine`] dispatches events
//! to triggers and runs them on the [`Executor`]; invocations that wait
//! are parked in a [`Scheduler`] as [`Continuation`]s.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sk_script::{builtin_syntax, EngineSettings, ScriptEngine, TickScheduler};
//! use sk_variables::GlobalVariables;
//!
//! let engine = ScriptEngine::new(
//!     builtin_syntax().unwrap(),
//!     EngineSettings::default(),
//!     Arc::new(GlobalVariables::new()),
//!     Arc::new(TickScheduler::new()),
//! );
//! engine
//!     .load_script("hello", "on load:\n    set {greeted} to true\n")
//!     .unwrap();
//! assert_eq!(engine.scripts(), vec!["hello".to_string()]);
//! ```

mod builder;
mod engine;
mod error;
mod executor;
mod function;
mod program;
mod scheduler;
mod source;
mod trigger;
mod vocab;

pub use builder::ScriptCompiler;
pub use engine::{EngineSettings, LoadSummary, ScriptEngine};
pub use error::{CompileErrors, EngineError, EngineResult};
pub use executor::{Continuation, Executor, ExecutorConfig, Outcome, Suspension};
pub use function::{ScriptFunction, MAX_CALL_DEPTH};
pub use program::{LoopSource, Op, Program};
pub use scheduler::{Scheduler, TickScheduler, TokioScheduler};
pub use source::{parse_tree, read_lines, strip_comment, SourceLine, SourceNode};
pub use trigger::{periodic_event_type, Script, Statement, StatementKind, Trigger, TriggerEvent};
pub use vocab::{builtin_syntax, register_builtins};
