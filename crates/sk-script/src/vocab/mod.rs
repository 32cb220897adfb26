//! Built-in vocabulary
//!
//! Every word the engine understands out of the box is registered here
//! through the same [`SyntaxRegistry`] a host uses for its own vocabulary.

mod conditions;
mod effects;
mod expressions;
mod functions;
mod sections;

use std::sync::Arc;

use sk_core::{TypeName, Value};
use sk_syntax::{SyntaxRegistry, SyntaxResult, TypeRegistry};
use tracing::debug;

/// Register the built-in converters and syntax on `syntax`
pub fn register_builtins(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    let types = syntax.types();
    for from in [
        TypeName::NUMBER,
        TypeName::BOOLEAN,
        TypeName::TIMESPAN,
        TypeName::JSON,
    ] {
        types.register_converter(from, TypeName::TEXT, |value: &Value| {
            Some(Value::Text(value.to_string()))
        });
    }
    types.set_default_expression(&TypeName::JSON, expressions::event_payload)?;

    expressions::register(syntax)?;
    conditions::register(syntax)?;
    effects::register(syntax)?;
    sections::register(syntax)?;
    functions::register(syntax)?;
    debug!("Registered built-in vocabulary");
    Ok(())
}

/// A registry holding the built-in types and vocabulary
pub fn builtin_syntax() -> SyntaxResult<Arc<SyntaxRegistry>> {
    let syntax = SyntaxRegistry::new(Arc::new(TypeRegistry::with_builtin_types()));
    register_builtins(&syntax)?;
    Ok(Arc::new(syntax))
}
