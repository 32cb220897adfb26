//! Flat program of a trigger body
//!
//! The statement tree is lowered once per trigger into a list of ops with
//! resolved jump targets. A continuation then only has to remember the
//! index of the next op, plus the loop states kept in its context.
//!
//! A condition that fails jumps to the continuation of its enclosing
//! section: the next iteration inside a loop body, the end of the if
//! chain inside a conditional body, and the end of the program at the top
//! level.

use std::fmt;
use std::sync::Arc;

use sk_syntax::{ConditionNode, Effect, EffectNode, Expr, SectionNode};

use crate::trigger::{Statement, StatementKind};

/// Where a loop takes its values from
#[derive(Debug, Clone)]
pub enum LoopSource {
    /// Values of an expression; list variables also yield their indices
    Values(Expr),
    /// `1..=n`
    Times(Expr),
    /// Condition-driven, checked by [`Op::WhileCheck`]
    Condition,
}

#[derive(Debug, Clone)]
pub enum Op {
    Run {
        line: usize,
        effect: Arc<dyn Effect>,
    },
    /// Suspend for the evaluated timespan
    Delay { line: usize, duration: Expr },
    /// Hand the evaluated values to the caller of a function and end
    Return { line: usize, value: Expr },
    /// Continue on true, jump to `on_false` otherwise
    Test {
        line: usize,
        condition: ConditionNode,
        on_false: usize,
    },
    Jump(usize),
    /// Put the loop state into its slot
    LoopStart {
        line: usize,
        slot: usize,
        source: LoopSource,
    },
    /// Advance to the next value, or clear the slot and jump to `exit`
    LoopNext { slot: usize, exit: usize },
    WhileCheck {
        line: usize,
        slot: usize,
        condition: ConditionNode,
        exit: usize,
    },
    /// Clear `slot` and every inner loop, then jump to `target`
    ExitLoop { slot: usize, target: usize },
    Stop,
}

impl Op {
    fn set_target(&mut self, pc: usize) {
        match self {
            Op::Test { on_false: target, .. }
            | Op::Jump(target)
            | Op::LoopNext { exit: target, .. }
            | Op::WhileCheck { exit: target, .. }
            | Op::ExitLoop { target, .. } => *target = pc,
            Op::Run { .. }
            | Op::Delay { .. }
            | Op::Return { .. }
            | Op::LoopStart { .. }
            | Op::Stop => {}
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Run { effect, .. } => write!(f, "run {}", effect.describe()),
            Op::Delay { duration, .. } => write!(f, "delay {duration}"),
            Op::Return { value, .. } => write!(f, "return {value}"),
            Op::Test {
                condition, on_false, ..
            } => write!(f, "test {} else {on_false}", condition.describe()),
            Op::Jump(target) => write!(f, "jump {target}"),
            Op::LoopStart { slot, source, .. } => match source {
                LoopSource::Values(expr) => write!(f, "loop#{slot} over {expr}"),
                LoopSource::Times(expr) => write!(f, "loop#{slot} {expr} times"),
                LoopSource::Condition => write!(f, "loop#{slot} while"),
            },
            Op::LoopNext { slot, exit } => write!(f, "next loop#{slot} else {exit}"),
            Op::WhileCheck {
                slot,
                condition,
                exit,
                ..
            } => write!(f, "while#{slot} {} else {exit}", condition.describe()),
            Op::ExitLoop { slot, target } => write!(f, "exit loop#{slot} to {target}"),
            Op::Stop => f.write_str("stop"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    ops: Vec<Op>,
}

impl Program {
    pub fn lower(body: &[Statement]) -> Self {
        let mut lowering = Lowering::default();
        let end = lowering.label();
        lowering.block(body, end, None);
        lowering.place(end);
        lowering.finish()
    }

    pub fn get(&self, pc: usize) -> Option<&Op> {
        self.ops.get(pc)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, op) in self.ops.iter().enumerate() {
            writeln!(f, "{pc:>3}: {op}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct LoopLabels {
    slot: usize,
    next: usize,
    exit: usize,
}

#[derive(Debug, Default)]
struct Lowering {
    ops: Vec<Op>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, usize)>,
    depth: usize,
}

impl Lowering {
    fn label(&mut self) -> usize {
        self.labels.push(None);
        self.labels.len() - 1
    }

    fn place(&mut self, label: usize) {
        self.labels[label] = Some(self.ops.len());
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Emit an op whose target is `label`
    fn emit_to(&mut self, op: Op, label: usize) {
        self.fixups.push((self.ops.len(), label));
        self.ops.push(op);
    }

    fn block(&mut self, body: &[Statement], on_false: usize, current: Option<LoopLabels>) {
        let mut i = 0;
        while i < body.len() {
            let statement = &body[i];
            let line = statement.line;
            match &statement.kind {
                StatementKind::Effect(effect) => self.effect(line, effect, current),
                StatementKind::Condition(condition) => self.emit_to(
                    Op::Test {
                        line,
                        condition: condition.clone(),
                        on_false: 0,
                    },
                    on_false,
                ),
                StatementKind::Section { section, body: inner } => match section {
                    SectionNode::If(condition) => {
                        let chain = chain_len(&body[i + 1..]);
                        self.if_chain(line, condition, inner, &body[i + 1..i + 1 + chain], current);
                        i += chain;
                    }
                    // Rejected by the builder unless they follow an `if`
                    SectionNode::ElseIf(_) | SectionNode::Else => {}
                    SectionNode::Loop(expr) => {
                        self.lower_loop(line, LoopSource::Values(expr.clone()), None, inner)
                    }
                    SectionNode::Times(expr) => {
                        self.lower_loop(line, LoopSource::Times(expr.clone()), None, inner)
                    }
                    SectionNode::While(condition) => {
                        self.lower_loop(line, LoopSource::Condition, Some(condition), inner)
                    }
                },
            }
            i += 1;
        }
    }

    fn effect(&mut self, line: usize, effect: &EffectNode, current: Option<LoopLabels>) {
        match (effect, current) {
            (EffectNode::Run(effect), _) => self.emit(Op::Run {
                line,
                effect: Arc::clone(effect),
            }),
            (EffectNode::Delay(duration), _) => self.emit(Op::Delay {
                line,
                duration: duration.clone(),
            }),
            (EffectNode::Return(value), _) => self.emit(Op::Return {
                line,
                value: value.clone(),
            }),
            (EffectNode::ExitLoop, Some(labels)) => self.emit_to(
                Op::ExitLoop {
                    slot: labels.slot,
                    target: 0,
                },
                labels.exit,
            ),
            (EffectNode::Continue, Some(labels)) => self.emit_to(Op::Jump(0), labels.next),
            // Loop control outside a loop ends the trigger
            (EffectNode::Stop | EffectNode::ExitLoop | EffectNode::Continue, _) => {
                self.emit(Op::Stop)
            }
        }
    }

    fn if_chain(
        &mut self,
        line: usize,
        condition: &ConditionNode,
        body: &[Statement],
        branches: &[Statement],
        current: Option<LoopLabels>,
    ) {
        let end = self.label();
        let mut next = self.label();
        self.emit_to(
            Op::Test {
                line,
                condition: condition.clone(),
                on_false: 0,
            },
            next,
        );
        self.block(body, end, current);

        for branch in branches {
            let StatementKind::Section { section, body } = &branch.kind else {
                continue;
            };
            self.emit_to(Op::Jump(0), end);
            self.place(next);
            next = self.label();
            if let SectionNode::ElseIf(condition) = section {
                self.emit_to(
                    Op::Test {
                        line: branch.line,
                        condition: condition.clone(),
                        on_false: 0,
                    },
                    next,
                );
            }
            self.block(body, end, current);
        }
        self.place(next);
        self.place(end);
    }

    fn lower_loop(
        &mut self,
        line: usize,
        source: LoopSource,
        condition: Option<&ConditionNode>,
        body: &[Statement],
    ) {
        let slot = self.depth;
        let labels = LoopLabels {
            slot,
            next: self.label(),
            exit: self.label(),
        };
        self.emit(Op::LoopStart { line, slot, source });
        self.place(labels.next);
        match condition {
            Some(condition) => self.emit_to(
                Op::WhileCheck {
                    line,
                    slot,
                    condition: condition.clone(),
                    exit: 0,
                },
                labels.exit,
            ),
            None => self.emit_to(Op::LoopNext { slot, exit: 0 }, labels.exit),
        }

        self.depth += 1;
        self.block(body, labels.next, Some(labels));
        self.depth -= 1;

        self.emit_to(Op::Jump(0), labels.next);
        self.place(labels.exit);
    }

    fn finish(mut self) -> Program {
        for (index, label) in std::mem::take(&mut self.fixups) {
            let target = self.labels[label].unwrap_or(self.ops.len());
            self.ops[index].set_target(target);
        }
        Program { ops: self.ops }
    }
}

/// Number of `else if`/`else` sections directly following an `if`
fn chain_len(rest: &[Statement]) -> usize {
    let mut len = 0;
    for statement in rest {
        match &statement.kind {
            StatementKind::Section {
                section: SectionNode::ElseIf(_),
                ..
            } => len += 1,
            StatementKind::Section {
                section: SectionNode::Else,
                ..
            } => return len + 1,
            _ => break,
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use sk_syntax::{Condition, ExecutionContext, RuntimeResult};

    #[derive(Debug)]
    struct Flag;

    impl Condition for Flag {
        fn check(&self, _ctx: &ExecutionContext) -> RuntimeResult<bool> {
            Ok(true)
        }

        fn describe(&self) -> String {
            "flag".to_string()
        }
    }

    fn statement(line: usize, kind: StatementKind) -> Statement {
        Statement {
            line,
            has_delay_before: false,
            kind,
        }
    }

    fn section(line: usize, section: SectionNode, body: Vec<Statement>) -> Statement {
        statement(line, StatementKind::Section { section, body })
    }

    fn stop(line: usize) -> Statement {
        statement(line, StatementKind::Effect(EffectNode::Stop))
    }

    fn condition(line: usize) -> Statement {
        statement(line, StatementKind::Condition(ConditionNode::new(Flag)))
    }

    fn rendered(program: &Program) -> Vec<String> {
        program.ops().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_top_level_condition_ends_program() {
        let program = Program::lower(&[condition(2), stop(3)]);
        assert_eq!(rendered(&program), vec!["test flag else 2", "stop"]);
    }

    #[test]
    fn test_if_else_chain() {
        let body = vec![
            section(2, SectionNode::If(ConditionNode::new(Flag)), vec![stop(3)]),
            section(4, SectionNode::ElseIf(ConditionNode::new(Flag)), vec![stop(5)]),
            section(6, SectionNode::Else, vec![stop(7)]),
            stop(8),
        ];
        let program = Program::lower(&body);
        assert_eq!(
            rendered(&program),
            vec![
                "test flag else 3",
                "stop",
                "jump 7",
                "test flag else 6",
                "stop",
                "jump 7",
                "stop",
                "stop",
            ]
        );
    }

    #[test]
    fn test_condition_in_loop_skips_to_next_iteration() {
        let body = vec![section(
            2,
            SectionNode::Times(Expr::literal(3.0)),
            vec![
                condition(3),
                statement(4, StatementKind::Effect(EffectNode::Continue)),
                statement(5, StatementKind::Effect(EffectNode::ExitLoop)),
            ],
        )];
        let program = Program::lower(&body);
        assert_eq!(
            rendered(&program),
            vec![
                "loop#0 3 times",
                "next loop#0 else 6",
                "test flag else 1",
                "jump 1",
                "exit loop#0 to 6",
                "jump 1",
            ]
        );
    }

    #[test]
    fn test_nested_loops_use_distinct_slots() {
        let inner = section(3, SectionNode::While(ConditionNode::new(Flag)), vec![stop(4)]);
        let body = vec![section(2, SectionNode::Times(Expr::literal(2.0)), vec![inner])];
        let program = Program::lower(&body);
        assert_eq!(
            rendered(&program),
            vec![
                "loop#0 2 times",
                "next loop#0 else 7",
                "loop#1 while",
                "while#1 flag else 6",
                "stop",
                "jump 3",
                "jump 1",
            ]
        );
    }
}
