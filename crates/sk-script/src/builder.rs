//! Compiles script text into triggers
//!
//! Top-level lines are trigger headers parsed as structures; their bodies
//! are parsed line by line in the scope of the enclosing trigger and
//! loops. Every error of a script is collected before the script is
//! rejected as a whole.

use std::sync::Arc;
use std::time::Duration;

use sk_core::{format_timespan, TypeName};
use sk_syntax::{
    Category, CompileError, CompileErrorKind, EffectNode, Expr, Function, LoopScope, Node,
    ParseScope, Parser, SectionNode, Signature, StructureNode,
};
use tracing::{debug, instrument, warn};

use crate::error::CompileErrors;
use crate::executor::{Executor, ExecutorConfig};
use crate::function::ScriptFunction;
use crate::source::{parse_tree, SourceNode};
use crate::trigger::{Script, Statement, StatementKind, Trigger, TriggerEvent};

#[derive(Debug, Clone)]
pub struct ScriptCompiler {
    parser: Arc<Parser>,
    /// Constant delays shorter than this are raised to it
    min_delay: Duration,
    /// Runs the bodies of the functions this compiler defines
    executor: Executor,
}

impl ScriptCompiler {
    pub fn new(parser: Arc<Parser>, min_delay: Duration) -> Self {
        let executor = Executor::new(ExecutorConfig {
            min_delay,
            ..ExecutorConfig::default()
        });
        Self {
            parser,
            min_delay,
            executor,
        }
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn parser(&self) -> &Arc<Parser> {
        &self.parser
    }

    /// Compile a whole script
    ///
    /// Errors are sorted by line. A script with any error yields no
    /// triggers at all and leaves the functions it declared as they were.
    #[instrument(skip(self, source))]
    pub fn compile(&self, name: &str, source: &str) -> Result<Script, CompileErrors> {
        let functions = Arc::clone(self.parser.syntax().functions());
        let (tree, mut errors) = parse_tree(source);
        let mut triggers = Vec::new();
        let mut declared: Vec<(Arc<Function>, Option<Arc<Function>>)> = Vec::new();
        let mut bodies = Vec::new();
        {
            let mut builder = TriggerBuilder {
                compiler: self,
                script: name,
                errors: &mut errors,
            };
            let mut headers: Vec<Option<StructureNode>> =
                tree.iter().map(|node| builder.header(node)).collect();

            // Signatures go first so that calls anywhere in the script resolve
            for (node, header) in tree.iter().zip(headers.iter_mut()) {
                let Some(StructureNode::Function(signature)) = header else {
                    continue;
                };
                signature.script = name.to_string();
                let line = &node.line;
                let twice = declared
                    .iter()
                    .any(|(function, _)| function.name().eq_ignore_ascii_case(&signature.name));
                let result = if twice {
                    Err(format!("function '{}' is declared twice", signature.name))
                } else {
                    functions.declare(signature.clone())
                };
                match result {
                    Ok(entry) => declared.push(entry),
                    Err(message) => {
                        builder.structure_error(line.number, line.header(), message);
                        *header = None;
                    }
                }
            }

            for (node, header) in tree.iter().zip(headers) {
                match header {
                    Some(StructureNode::Function(signature)) => {
                        if let Some(body) = builder.function(node, &signature) {
                            bodies.push((signature, body));
                        }
                    }
                    Some(structure) => {
                        if let Some(trigger) = builder.trigger(node, structure) {
                            triggers.push(Arc::new(trigger));
                        }
                    }
                    None => {}
                }
            }
        }

        if !errors.is_empty() {
            for (function, previous) in declared.into_iter().rev() {
                functions.restore(function.name(), previous);
            }
            errors.sort_by_key(|error| error.line);
            return Err(CompileErrors(errors));
        }

        for (signature, body) in bodies {
            if let Some(function) = declared
                .iter()
                .find(|(function, _)| function.name() == signature.name)
                .map(|(function, _)| function)
            {
                function.define(Arc::new(ScriptFunction::new(
                    signature,
                    Arc::new(body),
                    self.executor.clone(),
                )));
            }
        }
        // Functions an earlier version of the script declared
        let names: Vec<String> = declared
            .iter()
            .map(|(function, _)| function.name().to_string())
            .collect();
        for stale in functions.declared_by(name) {
            if !names.iter().any(|kept| kept.eq_ignore_ascii_case(stale.name())) {
                functions.restore(stale.name(), None);
            }
        }

        debug!(triggers = triggers.len(), functions = names.len(), "Compiled script");
        Ok(Script {
            name: name.to_string(),
            triggers,
            functions: names,
        })
    }
}

struct TriggerBuilder<'a> {
    compiler: &'a ScriptCompiler,
    script: &'a str,
    errors: &'a mut Vec<CompileError>,
}

impl TriggerBuilder<'_> {
    fn structure_error(&mut self, line: usize, span: &str, message: String) {
        self.errors.push(CompileError::new(
            line,
            CompileErrorKind::Structure,
            span,
            message,
        ));
    }

    /// Parse a top-level header; errors are recorded
    fn header(&mut self, node: &SourceNode) -> Option<StructureNode> {
        let line = &node.line;
        if !line.is_section() {
            self.structure_error(
                line.number,
                &line.text,
                format!("'{}' is not a trigger; triggers end with ':'", line.text),
            );
            return None;
        }

        let header = line.header();
        let structure = match self
            .compiler
            .parser
            .parse(header, Category::Structure, ParseScope::default())
        {
            Ok(Node::Structure(structure)) => structure,
            Ok(other) => {
                self.structure_error(
                    line.number,
                    header,
                    format!("'{header}' is a {}, not a trigger", other.kind()),
                );
                return None;
            }
            Err(failure) => {
                self.errors.push(failure.into_compile_error(line.number, "trigger"));
                return None;
            }
        };

        if node.children.is_empty() {
            self.structure_error(line.number, header, format!("'{header}' has no statements"));
            return None;
        }
        Some(structure)
    }

    fn trigger(&mut self, node: &SourceNode, structure: StructureNode) -> Option<Trigger> {
        let line = &node.line;
        let event = match structure {
            StructureNode::Event(matcher) => TriggerEvent::Event(matcher),
            StructureNode::Periodic(interval) => TriggerEvent::Periodic(interval),
            StructureNode::Function(_) => return None,
        };

        let mut scope = ParseScope {
            event: event.event_type(),
            ..ParseScope::default()
        };
        let body = self.body(&node.children, &mut scope);
        Some(Trigger::new(line.header(), self.script, line.number, event, body))
    }

    /// Body of a function; it runs on the caller's thread and cannot wait
    fn function(&mut self, node: &SourceNode, signature: &Signature) -> Option<Trigger> {
        let line = &node.line;
        let mut scope = ParseScope {
            function: Some(signature.clone()),
            ..ParseScope::default()
        };
        let body = self.body(&node.children, &mut scope);
        if contains_delay(&body) {
            self.structure_error(
                line.number,
                line.header(),
                format!("function '{}' cannot wait", signature.name),
            );
            return None;
        }
        Some(Trigger::new(
            line.header(),
            self.script,
            line.number,
            TriggerEvent::Function(signature.name.clone()),
            body,
        ))
    }

    fn body(&mut self, nodes: &[SourceNode], scope: &mut ParseScope) -> Vec<Statement> {
        let mut body = Vec::with_capacity(nodes.len());
        // Whether an `else` may follow; also set after a broken header so
        // its `else` does not report a second error
        let mut chain_open = false;
        // Delay state when the current if-chain started, and whether any of
        // its branches so far may delay
        let mut chain_before = false;
        let mut chain_delayed = false;

        for node in nodes {
            let line = &node.line;
            let mut has_delay_before = scope.after_delay;

            if !line.is_section() {
                chain_open = false;
                if let Some(kind) = self.statement(line.number, &line.text, scope) {
                    body.push(Statement {
                        line: line.number,
                        has_delay_before,
                        kind,
                    });
                }
                continue;
            }

            let header = line.header();
            let section = match self
                .compiler
                .parser
                .parse(header, Category::Section, scope.clone())
            {
                Ok(Node::Section(section)) => section,
                Ok(other) => {
                    self.structure_error(
                        line.number,
                        header,
                        format!("'{header}' is a {}, not a section", other.kind()),
                    );
                    chain_open = true;
                    continue;
                }
                Err(failure) => {
                    self.errors.push(failure.into_compile_error(line.number, "section"));
                    chain_open = true;
                    continue;
                }
            };

            let continues_chain = matches!(section, SectionNode::ElseIf(_) | SectionNode::Else);
            if continues_chain && !chain_open {
                self.structure_error(
                    line.number,
                    header,
                    "'else' has to be placed just after an 'if' or 'else if' section".to_string(),
                );
                continue;
            }
            chain_open = matches!(section, SectionNode::If(_) | SectionNode::ElseIf(_));
            let in_chain = chain_open || continues_chain;
            if continues_chain {
                // Only one branch runs
                scope.after_delay = chain_before;
                has_delay_before = chain_before;
            } else if in_chain {
                chain_before = scope.after_delay;
                chain_delayed = false;
            }

            if node.children.is_empty() {
                self.structure_error(line.number, header, format!("'{header}' has no statements"));
                continue;
            }

            let section_body = if section.is_loop() {
                let value_type = match &section {
                    SectionNode::Loop(expr) => expr.return_type(),
                    SectionNode::Times(_) => TypeName::NUMBER,
                    _ => TypeName::OBJECT,
                };
                scope.loops.push(LoopScope {
                    slot: scope.loops.len(),
                    value_type,
                });
                let mut inner = self.body(&node.children, scope);
                scope.loops.pop();
                // The next iteration runs after the delay of this one
                if contains_delay(&inner) {
                    mark_after_delay(&mut inner);
                }
                inner
            } else {
                self.body(&node.children, scope)
            };
            if in_chain {
                chain_delayed |= contains_delay(&section_body);
                scope.after_delay = chain_before || chain_delayed;
            } else {
                scope.after_delay |= contains_delay(&section_body);
            }

            body.push(Statement {
                line: line.number,
                has_delay_before,
                kind: StatementKind::Section {
                    section,
                    body: section_body,
                },
            });
        }
        body
    }

    /// An effect, or failing that a condition
    fn statement(&mut self, line: usize, text: &str, scope: &mut ParseScope) -> Option<StatementKind> {
        let compiler = self.compiler;
        let parser = &compiler.parser;
        let mut failure = match parser.parse(text, Category::Effect, scope.clone()) {
            Ok(Node::Effect(effect)) => return Some(self.effect(line, effect, scope)),
            Ok(other) => {
                self.structure_error(
                    line,
                    text,
                    format!("'{text}' is a {}, not a statement", other.kind()),
                );
                return None;
            }
            Err(failure) => failure,
        };
        match parser.parse(text, Category::Condition, scope.clone()) {
            Ok(Node::Condition(condition)) => return Some(StatementKind::Condition(condition)),
            Ok(other) => {
                self.structure_error(
                    line,
                    text,
                    format!("'{text}' is a {}, not a statement", other.kind()),
                );
                return None;
            }
            Err(condition_failure) => failure.merge(condition_failure),
        }
        self.errors
            .push(failure.into_compile_error(line, "condition/effect"));
        None
    }

    fn effect(&mut self, line: usize, effect: EffectNode, scope: &mut ParseScope) -> StatementKind {
        let EffectNode::Delay(duration) = effect else {
            return StatementKind::Effect(effect);
        };
        scope.after_delay = true;

        let min_delay = self.compiler.min_delay;
        let constant = duration
            .constant_values()
            .and_then(|values| values.first().and_then(|value| value.as_timespan()));
        match constant {
            Some(delay) if delay < min_delay => {
                warn!(
                    script = self.script,
                    line,
                    delay = %format_timespan(delay),
                    minimum = %format_timespan(min_delay),
                    "Delay is shorter than a tick and will be raised"
                );
                StatementKind::Effect(EffectNode::Delay(Expr::literal(min_delay)))
            }
            _ => StatementKind::Effect(EffectNode::Delay(duration)),
        }
    }
}

fn contains_delay(body: &[Statement]) -> bool {
    body.iter().any(|statement| match &statement.kind {
        StatementKind::Effect(EffectNode::Delay(_)) => true,
        StatementKind::Section { body, .. } => contains_delay(body),
        _ => false,
    })
}

fn mark_after_delay(body: &mut [Statement]) {
    for statement in body {
        statement.has_delay_before = true;
        if let StatementKind::Section { body, .. } = &mut statement.kind {
            mark_after_delay(body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::builtin_syntax;
    use sk_syntax::ParserConfig;

    fn compiler() -> ScriptCompiler {
        let parser = Parser::new(builtin_syntax().unwrap(), ParserConfig::default());
        ScriptCompiler::new(Arc::new(parser), sk_core::TICK)
    }

    #[test]
    fn test_delay_tracking() {
        let script = compiler()
            .compile(
                "delays",
                "on load:\n\tbroadcast \"a\"\n\twait 1 second\n\tbroadcast \"b\"\n",
            )
            .unwrap();
        let flags: Vec<bool> = script.triggers[0]
            .body
            .iter()
            .map(|statement| statement.has_delay_before)
            .collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn test_loop_body_with_delay_runs_after_delay() {
        let script = compiler()
            .compile(
                "loops",
                "on load:\n\tloop 3 times:\n\t\tbroadcast \"tick\"\n\t\twait 1 second\n",
            )
            .unwrap();
        let StatementKind::Section { body, .. } = &script.triggers[0].body[0].kind else {
            panic!("expected a loop section");
        };
        assert!(body.iter().all(|statement| statement.has_delay_before));
        assert!(!script.triggers[0].body[0].has_delay_before);
    }

    #[test]
    fn test_delay_in_one_branch_does_not_reach_its_siblings() {
        let script = compiler()
            .compile(
                "branches",
                "on load:\n\
                 \tif 1 is 2:\n\
                 \t\twait 1 second\n\
                 \telse if 1 is 3:\n\
                 \t\tbroadcast \"a\"\n\
                 \telse:\n\
                 \t\tbroadcast \"b\"\n\
                 \tbroadcast \"after\"\n",
            )
            .unwrap();
        let body = &script.triggers[0].body;
        let flags: Vec<bool> = body.iter().map(|statement| statement.has_delay_before).collect();
        assert_eq!(flags, vec![false, false, false, true]);

        for branch in &body[1..3] {
            let StatementKind::Section { body, .. } = &branch.kind else {
                panic!("expected a section");
            };
            assert!(!body[0].has_delay_before);
        }
    }

    #[test]
    fn test_delay_before_chain_reaches_every_branch() {
        let script = compiler()
            .compile(
                "branches",
                "on load:\n\
                 \twait 1 second\n\
                 \tif 1 is 2:\n\
                 \t\tbroadcast \"a\"\n\
                 \telse:\n\
                 \t\tbroadcast \"b\"\n",
            )
            .unwrap();
        let body = &script.triggers[0].body;
        assert!(body[1..].iter().all(|statement| statement.has_delay_before));
        let StatementKind::Section { body, .. } = &body[2].kind else {
            panic!("expected a section");
        };
        assert!(body[0].has_delay_before);
    }

    #[test]
    fn test_short_constant_delay_is_raised() {
        let script = compiler()
            .compile("short", "on load:\n\twait 1 tick\n\twait 0 seconds\n")
            .unwrap();
        for statement in &script.triggers[0].body {
            let StatementKind::Effect(EffectNode::Delay(expr)) = &statement.kind else {
                panic!("expected a delay");
            };
            let values = expr.constant_values().unwrap();
            assert_eq!(values[0].as_timespan(), Some(sk_core::TICK));
        }
    }
}
