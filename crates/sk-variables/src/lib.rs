//! Variable storage for script executions
//!
//! Variables are addressed by names such as `score`, `list::1` or
//! `list::*`. The `::` separator builds a tree: `list::*` names every
//! direct child of `list`, in insertion order.
//!
//! Two scopes exist:
//! - [`LocalVariables`], owned by a single execution and never shared
//! - [`GlobalVariables`], shared process-wide; each top-level key sits
//!   behind its own reader/writer lock so unrelated keys never contend

mod change;
mod error;
mod global;
mod local;
mod name;
mod node;

pub use change::Change;
pub use error::{VariableError, VariableResult};
pub use global::{GlobalVariables, SharedGlobals};
pub use local::LocalVariables;
pub use name::{VariableName, LIST_SEPARATOR};
pub use node::VariableNode;
