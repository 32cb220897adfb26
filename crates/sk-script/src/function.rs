//! Bodies of script-defined functions

use std::sync::Arc;

use sk_core::Value;
use sk_syntax::{ExecutionContext, FunctionBody, RuntimeError, RuntimeResult, Signature};
use sk_variables::{Change, VariableName};
use tracing::trace;

use crate::executor::Executor;
use crate::trigger::Trigger;

/// Nested calls allowed before a call fails
pub const MAX_CALL_DEPTH: usize = 64;

/// A compiled function body, run to its end on the caller's thread
#[derive(Debug)]
pub struct ScriptFunction {
    signature: Signature,
    body: Arc<Trigger>,
    executor: Executor,
}

impl ScriptFunction {
    pub fn new(signature: Signature, body: Arc<Trigger>, executor: Executor) -> Self {
        Self {
            signature,
            body,
            executor,
        }
    }
}

impl FunctionBody for ScriptFunction {
    fn call(&self, arguments: Vec<Vec<Value>>, caller: &ExecutionContext) -> RuntimeResult<Vec<Value>> {
        if caller.call_depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::Failed(format!(
                "calls to {} are nested more than {MAX_CALL_DEPTH} deep",
                self.signature.name
            )));
        }

        let mut ctx = ExecutionContext::new(
            Arc::from(self.signature.name.as_str()),
            Arc::clone(&caller.event),
            Arc::clone(&caller.globals),
            Arc::clone(&caller.output),
            caller.cancellation.child(),
        );
        ctx.call_depth = caller.call_depth + 1;
        for (parameter, values) in self.signature.parameters.iter().zip(arguments) {
            if parameter.plural {
                let name = VariableName::parse(&format!("_{}::*", parameter.name))?;
                ctx.locals.change(&name, &Change::Set(values))?;
            } else if let Some(value) = values.into_iter().next() {
                let name = VariableName::parse(&format!("_{}", parameter.name))?;
                ctx.locals.set(&name, value)?;
            }
        }

        trace!(
            function = %self.signature.name,
            caller = %caller.trigger,
            depth = ctx.call_depth,
            "Calling function"
        );
        self.executor.call(Arc::clone(&self.body), ctx)
    }
}
