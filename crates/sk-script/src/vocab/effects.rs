//! Built-in effects

use std::fs::OpenOptions;
use std::io::Write;

use sk_syntax::{
    Category, Effect, EffectNode, ExecutionContext, Expr, ParseContext, ParseResult,
    RuntimeError, RuntimeResult, SyntaxRegistry, SyntaxResult,
};
use sk_variables::Change;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeMode {
    Set,
    Add,
    Remove,
    Delete,
}

/// `set`, `add`, `remove` and `delete`
#[derive(Debug)]
struct ChangeEffect {
    mode: ChangeMode,
    target: Expr,
    values: Option<Expr>,
}

impl Effect for ChangeEffect {
    fn execute(&self, ctx: &mut ExecutionContext) -> RuntimeResult<()> {
        let values = match &self.values {
            Some(expr) => expr.evaluate(ctx)?,
            None => Vec::new(),
        };
        let change = match self.mode {
            ChangeMode::Set => Change::Set(values),
            ChangeMode::Add => Change::Add(values),
            ChangeMode::Remove => Change::Remove(values),
            ChangeMode::Delete => Change::Delete,
        };
        self.target.change(ctx, &change)
    }

    fn describe(&self) -> String {
        let values = self.values.as_ref().map(Expr::describe).unwrap_or_default();
        match self.mode {
            ChangeMode::Set => format!("set {} to {values}", self.target),
            ChangeMode::Add => format!("add {values} to {}", self.target),
            ChangeMode::Remove => format!("remove {values} from {}", self.target),
            ChangeMode::Delete => format!("delete {}", self.target),
        }
    }
}

#[derive(Debug)]
struct Broadcast(Expr);

impl Effect for Broadcast {
    fn execute(&self, ctx: &mut ExecutionContext) -> RuntimeResult<()> {
        for message in self.0.evaluate(ctx)? {
            ctx.broadcast(&message.to_string());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("broadcast {}", self.0)
    }
}

#[derive(Debug)]
struct Log(Expr);

impl Effect for Log {
    fn execute(&self, ctx: &mut ExecutionContext) -> RuntimeResult<()> {
        for message in self.0.evaluate(ctx)? {
            info!(target: "skript::log", trigger = %ctx.trigger, "{}", message);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("log {}", self.0)
    }
}

/// Appends lines to a file; runs on a worker
#[derive(Debug)]
struct AppendToFile {
    lines: Expr,
    path: Expr,
}

impl Effect for AppendToFile {
    fn execute(&self, ctx: &mut ExecutionContext) -> RuntimeResult<()> {
        let path = self.path.require(ctx)?.to_string();
        let lines = self.lines.evaluate(ctx)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| RuntimeError::Failed(format!("cannot open {path}: {e}")))?;
        for line in lines {
            writeln!(file, "{line}")
                .map_err(|e| RuntimeError::Failed(format!("cannot write {path}: {e}")))?;
        }
        Ok(())
    }

    fn is_async(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("append {} to file {}", self.lines, self.path)
    }
}

fn require_loop(ctx: &ParseContext, what: &str) -> Result<(), String> {
    if ctx.scope.innermost_loop().is_none() {
        return Err(format!("'{what}' can only be used inside a loop"));
    }
    Ok(())
}

pub(super) fn register(syntax: &SyntaxRegistry) -> SyntaxResult<()> {
    syntax.register(
        Category::Effect,
        "set %~objects% to %objects%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let target = result.take(0)?;
            let values = result.take(1)?;
            if target.is_single() && !values.is_single() {
                return Err(format!(
                    "'{}' can only be set to a single value, not {}",
                    target.describe(),
                    values.describe()
                ));
            }
            Ok(EffectNode::run(ChangeEffect {
                mode: ChangeMode::Set,
                target,
                values: Some(values),
            }))
        },
    )?;
    syntax.register(
        Category::Effect,
        "add %objects% to %~objects%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let values = result.take(0)?;
            Ok(EffectNode::run(ChangeEffect {
                mode: ChangeMode::Add,
                target: result.take(1)?,
                values: Some(values),
            }))
        },
    )?;
    syntax.register(
        Category::Effect,
        "remove %objects% from %~objects%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let values = result.take(0)?;
            Ok(EffectNode::run(ChangeEffect {
                mode: ChangeMode::Remove,
                target: result.take(1)?,
                values: Some(values),
            }))
        },
    )?;
    syntax.register(
        Category::Effect,
        "(delete|clear|reset) %~objects%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            Ok(EffectNode::run(ChangeEffect {
                mode: ChangeMode::Delete,
                target: result.take(0)?,
                values: None,
            }))
        },
    )?;

    syntax.register(
        Category::Effect,
        "(wait|halt) [for] %timespan%",
        0,
        |mut result: ParseResult, _: &ParseContext| Ok(EffectNode::Delay(result.take(0)?)),
    )?;
    syntax.register(
        Category::Effect,
        "stop [[the] trigger]",
        0,
        |_: ParseResult, _: &ParseContext| Ok(EffectNode::Stop),
    )?;
    syntax.register(
        Category::Effect,
        "exit [the] [current] loop",
        0,
        |_: ParseResult, ctx: &ParseContext| {
            require_loop(ctx, "exit loop")?;
            Ok(EffectNode::ExitLoop)
        },
    )?;
    syntax.register(
        Category::Effect,
        "continue [[the] loop]",
        0,
        |_: ParseResult, ctx: &ParseContext| {
            require_loop(ctx, "continue")?;
            Ok(EffectNode::Continue)
        },
    )?;

    syntax.register(
        Category::Effect,
        "broadcast %texts%",
        0,
        |mut result: ParseResult, _: &ParseContext| Ok(EffectNode::run(Broadcast(result.take(0)?))),
    )?;
    syntax.register(
        Category::Effect,
        "log %texts%",
        0,
        |mut result: ParseResult, _: &ParseContext| Ok(EffectNode::run(Log(result.take(0)?))),
    )?;
    syntax.register(
        Category::Effect,
        "append %texts% to [the] file %text%",
        0,
        |mut result: ParseResult, _: &ParseContext| {
            let lines = result.take(0)?;
            Ok(EffectNode::run(AppendToFile {
                lines,
                path: result.take(1)?,
            }))
        },
    )?;
    Ok(())
}
