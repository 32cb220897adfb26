//! Interpreter of lowered trigger programs
//!
//! An invocation runs until it completes, fails or reaches a suspension
//! point. On suspension the executor hands back a [`Continuation`] owning
//! the execution context and the index of the next op; nothing is left on
//! the stack.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sk_core::{TypeName, Value};
use sk_syntax::{ExecutionContext, Expr, LoopState, RuntimeError, RuntimeResult};
use tracing::{debug, trace, warn};

use crate::program::{LoopSource, Op};
use crate::trigger::Trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Bound on iterations of one `while` loop run
    pub max_loop_iterations: usize,
    /// Shorter delays are raised to this
    pub min_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 10_000,
            min_delay: sk_core::TICK,
        }
    }
}

/// Resumable state of a suspended invocation
pub struct Continuation {
    pub trigger: Arc<Trigger>,
    /// Next op to run
    pub pc: usize,
    pub ctx: ExecutionContext,
    /// Resumed on a worker, where async effects may run
    pub worker: bool,
}

impl Continuation {
    pub fn start(trigger: Arc<Trigger>, ctx: ExecutionContext) -> Self {
        Self {
            trigger,
            pc: 0,
            ctx,
            worker: false,
        }
    }

    /// Invocation id
    pub fn id(&self) -> &str {
        &self.ctx.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.cancellation.is_cancelled()
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("trigger", &self.trigger.name)
            .field("script", &self.trigger.script)
            .field("invocation", &self.ctx.id)
            .field("pc", &self.pc)
            .field("worker", &self.worker)
            .finish()
    }
}

/// Why an invocation handed control back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    Delay(Duration),
    /// The next op is an async effect
    Async,
}

#[derive(Debug)]
pub enum Outcome {
    Completed,
    Suspended(Suspension, Continuation),
    Failed(RuntimeError),
}

#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a continuation up to its next suspension point
    ///
    /// Failures are logged here and abort only this invocation.
    pub fn run(&self, mut continuation: Continuation) -> Outcome {
        let trigger = Arc::clone(&continuation.trigger);
        let result = loop {
            match self.step(&trigger, &mut continuation) {
                Ok(Step::Next) => continue,
                Ok(Step::Done) => break Ok(None),
                Ok(Step::Suspend(suspension)) => break Ok(Some(suspension)),
                Err(error) => break Err(error),
            }
        };

        match result {
            Ok(None) => {
                debug!(
                    script = %trigger.script,
                    trigger = %trigger.name,
                    invocation = %continuation.ctx.id,
                    "Trigger completed"
                );
                Outcome::Completed
            }
            Ok(Some(suspension)) => {
                trace!(
                    trigger = %trigger.name,
                    invocation = %continuation.ctx.id,
                    pc = continuation.pc,
                    ?suspension,
                    "Trigger suspended"
                );
                Outcome::Suspended(suspension, continuation)
            }
            Err(RuntimeError::Cancelled) => {
                debug!(
                    trigger = %trigger.name,
                    invocation = %continuation.ctx.id,
                    "Trigger cancelled"
                );
                Outcome::Failed(RuntimeError::Cancelled)
            }
            Err(error) => {
                let line = trigger.program.get(continuation.pc).map(op_line);
                warn!(
                    script = %trigger.script,
                    trigger = %trigger.name,
                    invocation = %continuation.ctx.id,
                    line = ?line.flatten(),
                    error = %error,
                    "Trigger failed"
                );
                Outcome::Failed(error)
            }
        }
    }

    /// Run a function body to its end on the calling thread
    ///
    /// Errors are handed to the caller instead of being logged here.
    pub fn call(&self, trigger: Arc<Trigger>, ctx: ExecutionContext) -> RuntimeResult<Vec<Value>> {
        let mut continuation = Continuation::start(Arc::clone(&trigger), ctx);
        continuation.worker = true;
        loop {
            match self.step(&trigger, &mut continuation)? {
                Step::Next => {}
                Step::Done => return Ok(continuation.ctx.returned.take().unwrap_or_default()),
                Step::Suspend(_) => {
                    return Err(RuntimeError::Failed(format!(
                        "'{}' cannot wait",
                        trigger.name
                    )))
                }
            }
        }
    }

    fn step(&self, trigger: &Trigger, continuation: &mut Continuation) -> RuntimeResult<Step> {
        continuation.ctx.check_cancelled()?;
        let Some(op) = trigger.program.get(continuation.pc) else {
            return Ok(Step::Done);
        };
        let ctx = &mut continuation.ctx;

        match op {
            Op::Run { effect, .. } => {
                if effect.is_async() && !continuation.worker {
                    return Ok(Step::Suspend(Suspension::Async));
                }
                effect.execute(ctx)?;
                continuation.pc += 1;
            }
            Op::Delay { duration, .. } => {
                let value = duration.require(ctx)?;
                let requested = value.as_timespan().ok_or_else(|| RuntimeError::WrongType {
                    expected: TypeName::TIMESPAN.to_string(),
                    found: value.type_name().to_string(),
                })?;
                continuation.pc += 1;
                continuation.worker = false;
                return Ok(Step::Suspend(Suspension::Delay(
                    requested.max(self.config.min_delay),
                )));
            }
            Op::Return { value, .. } => {
                ctx.returned = Some(value.evaluate(ctx)?);
                return Ok(Step::Done);
            }
            Op::Test {
                condition, on_false, ..
            } => {
                continuation.pc = if condition.check(ctx)? {
                    continuation.pc + 1
                } else {
                    *on_false
                };
            }
            Op::Jump(target) => continuation.pc = *target,
            Op::LoopStart { slot, source, .. } => {
                let items = match source {
                    LoopSource::Values(expr) => loop_values(expr, ctx)?,
                    LoopSource::Times(expr) => loop_times(expr, ctx)?,
                    LoopSource::Condition => Vec::new(),
                };
                ctx.enter_loop(*slot, LoopState::over(items));
                continuation.pc += 1;
            }
            Op::LoopNext { slot, exit } => {
                let advanced = ctx.loop_state_mut(*slot).is_some_and(LoopState::advance);
                if advanced {
                    continuation.pc += 1;
                } else {
                    ctx.exit_loop(*slot);
                    continuation.pc = *exit;
                }
            }
            Op::WhileCheck {
                slot,
                condition,
                exit,
                ..
            } => {
                if condition.check(ctx)? {
                    let limit = self.config.max_loop_iterations;
                    let state = ctx.loop_state_mut(*slot).ok_or_else(|| {
                        RuntimeError::Failed(format!("loop {slot} is not running"))
                    })?;
                    if state.iteration >= limit {
                        return Err(RuntimeError::LoopLimit(limit));
                    }
                    state.iteration += 1;
                    continuation.pc += 1;
                } else {
                    ctx.exit_loop(*slot);
                    continuation.pc = *exit;
                }
            }
            Op::ExitLoop { slot, target } => {
                for inner in *slot..ctx.loops.len() {
                    ctx.exit_loop(inner);
                }
                continuation.pc = *target;
            }
            Op::Stop => return Ok(Step::Done),
        }
        Ok(Step::Next)
    }
}

enum Step {
    Next,
    Done,
    Suspend(Suspension),
}

fn op_line(op: &Op) -> Option<usize> {
    match op {
        Op::Run { line, .. }
        | Op::Delay { line, .. }
        | Op::Return { line, .. }
        | Op::Test { line, .. }
        | Op::LoopStart { line, .. }
        | Op::WhileCheck { line, .. } => Some(*line),
        Op::Jump(_) | Op::LoopNext { .. } | Op::ExitLoop { .. } | Op::Stop => None,
    }
}

/// Values of a loop, with list indices when looping a list variable
fn loop_values(expr: &Expr, ctx: &ExecutionContext) -> RuntimeResult<Vec<(Option<String>, Value)>> {
    if let Expr::Variable(variable) = expr {
        if variable.is_list() {
            let name = variable.name(ctx)?;
            let entries = if name.is_local() {
                ctx.locals.entries(&name)
            } else {
                ctx.globals.entries(&name)
            };
            return Ok(entries
                .into_iter()
                .map(|(index, value)| (Some(index), value))
                .collect());
        }
    }
    Ok(expr
        .evaluate(ctx)?
        .into_iter()
        .map(|value| (None, value))
        .collect())
}

fn loop_times(expr: &Expr, ctx: &ExecutionContext) -> RuntimeResult<Vec<(Option<String>, Value)>> {
    let value = expr.require(ctx)?;
    let times = value.as_number().ok_or_else(|| RuntimeError::WrongType {
        expected: TypeName::NUMBER.to_string(),
        found: value.type_name().to_string(),
    })?;
    let count = if times.is_finite() && times > 0.0 {
        times.floor() as usize
    } else {
        0
    };
    Ok((1..=count)
        .map(|i| (None, Value::Number(i as f64)))
        .collect())
}
