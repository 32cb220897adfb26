//! Syntax registry, expression type system and parser
//!
//! Vocabulary is registered per [`Category`] as a pattern plus a factory.
//! The [`Parser`] matches a line against every entry of a category,
//! resolving placeholders recursively into typed [`Expr`] trees, and hands
//! each successful match to the entry's factory to build a [`Node`].
//!
//! Nodes are closed enums per category with trait objects
//! ([`Expression`], [`Effect`], [`Condition`]) for vocabulary-defined
//! behavior. They are evaluated against an [`ExecutionContext`].

mod category;
mod error;
mod expr;
mod function;
mod literals;
mod node;
mod parser;
mod registry;
mod runtime;
mod types;

pub use category::Category;
pub use error::{
    CompileError, CompileErrorKind, ParseFailure, RuntimeError, RuntimeResult, SyntaxError,
    SyntaxResult, TypeMismatch,
};
pub use expr::{CastExpr, Expr, ExprList, Expression, LiteralExpr, NamePart, VariableExpr};
pub use function::{Function, FunctionBody, FunctionRegistry, Parameter, ReturnType, Signature};
pub use literals::{parse_boolean, parse_number, parse_text, quote_text};
pub use node::{
    Condition, ConditionNode, Effect, EffectNode, EventFilter, EventMatcher, Node, SectionNode,
    StructureNode,
};
pub use parser::{
    split_list, LoopScope, ParseContext, ParsePolicy, ParseResult, ParseScope, Parser,
    ParserConfig,
};
pub use registry::{Factory, SyntaxEntry, SyntaxRegistry};
pub use runtime::{
    CancellationToken, ExecutionContext, LogSink, LoopState, MemorySink, OutputSink,
};
pub use types::{Converter, TypeInfo, TypeRegistry};
