//! Recursive parser
//!
//! A line is matched against every entry of a category. Placeholders are
//! resolved while the pattern matcher runs: each candidate span is tried
//! as a literal of an accepted type, then parsed recursively as an
//! expression and coerced to an accepted type. Spans that fail make the
//! matcher backtrack.
//!
//! Recursion is bounded by [`ParserConfig::max_depth`] and by refusing to
//! re-enter an entry on the exact span it is already matching. Results are
//! memoized per category and span for the whole line, and every entry
//! attempt and span resolution draws from one line-wide step budget.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sk_core::{EventType, TypeName};
use sk_patterns::{normalize_input, CaptureResolver, CompiledPattern, MatchLimits, Placeholder};
use tracing::{debug, trace};

use crate::category::Category;
use crate::error::{ParseFailure, TypeMismatch};
use crate::expr::{CastExpr, Expr, ExprList};
use crate::function::Signature;
use crate::node::{ConditionNode, Node};
use crate::registry::{SyntaxEntry, SyntaxRegistry};
use crate::types::TypeRegistry;

/// How the parser picks between several matching entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsePolicy {
    /// Take the first entry, in registry order, that matches
    FirstMatch,
    /// Try every entry; the one consuming the most literal text wins and
    /// ties go to registry order
    #[default]
    BestMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    pub max_depth: usize,
    /// Step budget for a single pattern attempt
    pub max_steps: usize,
    /// Entry attempts and span resolutions allowed for one line
    pub max_line_steps: usize,
    pub policy: ParsePolicy,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_steps: MatchLimits::default().max_steps,
            max_line_steps: 250_000,
            policy: ParsePolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parser {
    syntax: Arc<SyntaxRegistry>,
    config: ParserConfig,
}

impl Parser {
    pub fn new(syntax: Arc<SyntaxRegistry>, config: ParserConfig) -> Self {
        Self { syntax, config }
    }

    pub fn syntax(&self) -> &Arc<SyntaxRegistry> {
        &self.syntax
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        self.syntax.types()
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Root context for parsing lines in `scope`
    pub fn context(&self, scope: ParseScope) -> ParseContext {
        ParseContext {
            parser: self.clone(),
            scope,
            depth: 0,
            stack: Vec::new(),
            memo: Rc::default(),
            mismatches: Rc::default(),
            budget: Rc::new(Cell::new(self.config.max_line_steps)),
        }
    }

    pub fn parse(&self, line: &str, category: Category, scope: ParseScope) -> Result<Node, ParseFailure> {
        self.context(scope).parse(line, category)
    }
}

/// A loop enclosing the line being parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopScope {
    /// Slot of the loop's state in the execution context
    pub slot: usize,
    pub value_type: TypeName,
}

/// What surrounds the line being parsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseScope {
    /// Event of the enclosing trigger
    pub event: Option<EventType>,
    /// Enclosing loops, outermost first
    pub loops: Vec<LoopScope>,
    /// A delay may have run before this line
    pub after_delay: bool,
    /// Function whose body is being parsed
    pub function: Option<Signature>,
}

impl ParseScope {
    pub fn innermost_loop(&self) -> Option<&LoopScope> {
        self.loops.last()
    }

    /// `loop-value-2` refers to the second loop from the outside
    pub fn loop_at(&self, number: usize) -> Option<&LoopScope> {
        number.checked_sub(1).and_then(|i| self.loops.get(i))
    }
}

/// Results that hold in any context of the line, by category and span
type Memo = HashMap<(Category, String), Result<Node, ParseFailure>>;

/// Shallowest stack entry a result depends on
///
/// A failure caused by refusing to re-enter `stack[i]` only holds while
/// that entry is being matched and is recorded as `i + 1`. Depth and step
/// limits are recorded as `0`, which never clears.
type Guard = Option<usize>;

fn lowest(a: Guard, b: Guard) -> Guard {
    a.into_iter().chain(b).min()
}

/// State of one parse, handed to factories
///
/// Child contexts share the memo of parsed spans, the list of type
/// mismatches and the step budget with their root.
#[derive(Debug, Clone)]
pub struct ParseContext {
    parser: Parser,
    pub scope: ParseScope,
    depth: usize,
    /// Entries being matched, with their input
    stack: Vec<(usize, String)>,
    memo: Rc<RefCell<Memo>>,
    mismatches: Rc<RefCell<Vec<TypeMismatch>>>,
    /// Steps left for the line
    budget: Rc<Cell<usize>>,
}

/// Placeholder resolution cache of one pattern attempt
type Resolved = HashMap<(usize, usize, usize), Option<Expr>>;

enum Outcome {
    Built(Node),
    /// A required placeholder was left empty and its type has no default
    Missing(String),
    Rejected(String),
}

impl ParseContext {
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        self.parser.types()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Parse `input` against every entry of `category`
    pub fn parse(&self, input: &str, category: Category) -> Result<Node, ParseFailure> {
        self.parse_guarded(input, category).0
    }

    /// Parse a condition, e.g. the text of an `if` section
    pub fn parse_condition(&self, input: &str) -> Result<ConditionNode, ParseFailure> {
        match self.parse(input, Category::Condition)? {
            Node::Condition(condition) => Ok(condition),
            other => {
                let mut failure = ParseFailure::new(normalize_input(input), Category::Condition);
                failure
                    .rejections
                    .push(format!("'{input}' is a {}, not a condition", other.kind()));
                Err(failure)
            }
        }
    }

    /// Parse an expression without coercing it
    pub fn parse_expression(&self, input: &str) -> Result<Expr, ParseFailure> {
        let input = normalize_input(input);
        let mut failure: Option<ParseFailure> = None;
        for category in [Category::Expression, Category::Function] {
            match self.parse_guarded(&input, category).0 {
                Ok(Node::Expression(expr)) => return Ok(expr),
                Ok(other) => {
                    let mut rejected = ParseFailure::new(input.clone(), category);
                    rejected
                        .rejections
                        .push(format!("'{input}' is a {}, not an expression", other.kind()));
                    merge(&mut failure, rejected);
                }
                Err(error) => merge(&mut failure, error),
            }
        }
        Err(failure.unwrap_or_else(|| ParseFailure::new(input, Category::Expression)))
    }

    /// Resolve `input` to a single value of one of `accepted`
    pub fn resolve(&self, input: &str, accepted: &[TypeName]) -> Option<Expr> {
        self.resolve_single(&normalize_input(input), accepted, false).0
    }

    fn child(&self, entry: &SyntaxEntry, input: &str) -> ParseContext {
        let mut stack = self.stack.clone();
        stack.push((entry.id, input.to_string()));
        ParseContext {
            parser: self.parser.clone(),
            scope: self.scope.clone(),
            depth: self.depth + 1,
            stack,
            memo: Rc::clone(&self.memo),
            mismatches: Rc::clone(&self.mismatches),
            budget: Rc::clone(&self.budget),
        }
    }

    /// Take one step from the line budget; `false` once it is spent
    fn step(&self) -> bool {
        match self.budget.get().checked_sub(1) {
            Some(left) => {
                self.budget.set(left);
                true
            }
            None => false,
        }
    }

    /// Parse with memoization; also returns the guard the result depends on
    fn parse_guarded(&self, input: &str, category: Category) -> (Result<Node, ParseFailure>, Guard) {
        let input = normalize_input(input);
        let key = (category, input);
        let cached = self.memo.borrow().get(&key).cloned();
        if let Some(cached) = cached {
            if let Err(failure) = &cached {
                for mismatch in &failure.mismatches {
                    self.record_mismatch(mismatch.clone());
                }
            }
            return (cached, None);
        }

        let (result, guard) = self.parse_entries(&key.1, category);
        if guard.is_none() {
            self.memo.borrow_mut().insert(key, result.clone());
        }
        (result, guard)
    }

    fn parse_entries(&self, input: &str, category: Category) -> (Result<Node, ParseFailure>, Guard) {
        let mut failure = ParseFailure::new(input, category);
        if self.depth >= self.parser.config.max_depth {
            failure.too_deep = true;
            return (Err(failure), Some(0));
        }

        let mismatch_mark = self.mismatches.borrow().len();
        let limits = MatchLimits {
            max_steps: self.parser.config.max_steps,
        };
        // Guards on entries this call pushes are released when it returns
        let own = self.stack.len();
        let mut guard: Guard = None;
        let mut best: Option<(usize, Node)> = None;

        for entry in self.parser.syntax.lookup(category) {
            if let Some(at) = self
                .stack
                .iter()
                .position(|(id, span)| *id == entry.id && span == input)
            {
                guard = lowest(guard, Some(at + 1));
                continue;
            }
            if !self.step() {
                debug!(%category, input, "Line exceeded the parse step budget");
                failure.too_complex = true;
                return (Err(failure), Some(0));
            }
            let child = self.child(&entry, input);
            let mut resolver = SpanResolver {
                ctx: &child,
                resolved: HashMap::new(),
                guard: None,
            };
            let matched = entry.pattern.match_input(input, &mut resolver, limits);
            guard = lowest(guard, resolver.guard.filter(|at| *at <= own));
            let resolved = resolver.resolved;
            if self.budget.get() == 0 {
                failure.too_complex = true;
                return (Err(failure), Some(0));
            }

            let matched = match matched {
                Ok(matched) => matched,
                Err(miss) => {
                    if miss.exhausted {
                        guard = Some(0);
                    }
                    failure.attempt(entry.pattern.source(), miss.furthest, &miss.expected);
                    continue;
                }
            };
            let literal_len = matched.literal_len;
            match self.build(&entry, input, matched, resolved, &child) {
                Outcome::Built(node) => {
                    trace!(%category, pattern = entry.pattern.source(), input, "Matched");
                    if self.parser.config.policy == ParsePolicy::FirstMatch {
                        self.mismatches.borrow_mut().truncate(mismatch_mark);
                        return (Ok(node), guard);
                    }
                    if best.as_ref().map_or(true, |(len, _)| literal_len > *len) {
                        best = Some((literal_len, node));
                    }
                }
                Outcome::Missing(placeholder) => {
                    failure.attempt(entry.pattern.source(), input.len(), &[placeholder]);
                }
                Outcome::Rejected(reason) => {
                    failure.attempted.push(entry.pattern.source().to_string());
                    failure.rejections.push(reason);
                }
            }
        }

        if let Some((_, node)) = best {
            self.mismatches.borrow_mut().truncate(mismatch_mark);
            return (Ok(node), guard);
        }
        failure.mismatches = self.mismatches.borrow()[mismatch_mark..].to_vec();
        (Err(failure), guard)
    }

    fn build(
        &self,
        entry: &SyntaxEntry,
        input: &str,
        matched: sk_patterns::MatchResult,
        mut resolved: Resolved,
        child: &ParseContext,
    ) -> Outcome {
        let mut exprs = Vec::with_capacity(entry.pattern.placeholders().len());
        for placeholder in entry.pattern.placeholders() {
            let span = matched.captures.get(placeholder.index).cloned().flatten();
            let expr = match span {
                Some(span) => resolved
                    .remove(&(placeholder.index, span.start, span.end))
                    .flatten(),
                None if placeholder.optional => None,
                None => match self.default_expression(placeholder) {
                    Some(expr) => Some(expr),
                    None => return Outcome::Missing(format!("%{}%", placeholder.types.join("/"))),
                },
            };
            exprs.push(expr);
        }

        let result = ParseResult {
            input: input.to_string(),
            pattern: Arc::clone(&entry.pattern),
            exprs,
            mark: matched.mark,
            regexes: (0..entry.pattern.regexes().len())
                .map(|i| matched.regex(input, i).map(str::to_string))
                .collect(),
            tags: matched.tags,
            literal_len: matched.literal_len,
        };
        match entry.build(result, child) {
            Ok(node) => Outcome::Built(node),
            Err(reason) => Outcome::Rejected(reason),
        }
    }

    fn default_expression(&self, placeholder: &Placeholder) -> Option<Expr> {
        placeholder
            .type_names()
            .filter_map(|name| self.types().lookup(name))
            .find_map(|(info, _)| info.default_expr())
    }

    fn resolve_placeholder(&self, placeholder: &Placeholder, text: &str) -> (Option<Expr>, Guard) {
        let mut accepted = Vec::new();
        let mut plural = false;
        for (info, is_plural) in placeholder
            .type_names()
            .filter_map(|name| self.types().lookup(name))
        {
            plural |= is_plural;
            accepted.push(info.name.clone());
        }

        let (mut expr, mut guard) = self.resolve_single(text, &accepted, placeholder.literal_only);
        if expr.is_none() && plural {
            let (list, list_guard) = self.resolve_list(text, &accepted, placeholder.literal_only);
            expr = list;
            guard = lowest(guard, list_guard);
        }

        let expr = expr.filter(|expr| {
            if !plural && !expr.is_single() {
                self.mismatch(text, "more than one value".to_string(), &accepted);
                return false;
            }
            !placeholder.changeable || expr.is_changeable()
        });
        (expr, guard)
    }

    fn resolve_single(&self, text: &str, accepted: &[TypeName], literal_only: bool) -> (Option<Expr>, Guard) {
        if let Some(value) = self.types().parse_literal(text, accepted) {
            return (Some(Expr::literal(value)), None);
        }
        // A literal of another type, e.g. `5` where text is expected
        if let Some(value) = self.types().parse_literal(text, &[TypeName::OBJECT]) {
            return (self.coerce(Expr::literal(value), text, accepted), None);
        }
        if literal_only {
            return (None, None);
        }
        let (parsed, guard) = self.parse_expression_guarded(text);
        (parsed.and_then(|expr| self.coerce(expr, text, accepted)), guard)
    }

    fn parse_expression_guarded(&self, text: &str) -> (Option<Expr>, Guard) {
        let mut guard = None;
        for category in [Category::Expression, Category::Function] {
            let (parsed, category_guard) = self.parse_guarded(text, category);
            guard = lowest(guard, category_guard);
            if let Ok(Node::Expression(expr)) = parsed {
                return (Some(expr), guard);
            }
        }
        (None, guard)
    }

    fn resolve_list(&self, text: &str, accepted: &[TypeName], literal_only: bool) -> (Option<Expr>, Guard) {
        let Some((items, and)) = split_list(text) else {
            return (None, None);
        };
        let mut guard = None;
        let mut exprs = Vec::with_capacity(items.len());
        for item in &items {
            let (expr, item_guard) = self.resolve_single(item, accepted, literal_only);
            guard = lowest(guard, item_guard);
            match expr {
                Some(expr) => exprs.push(expr),
                None => return (None, guard),
            }
        }
        (Some(Expr::List(ExprList::new(exprs, and))), guard)
    }

    /// Accept `expr` as one of `accepted`, converting in at most one step
    fn coerce(&self, expr: Expr, text: &str, accepted: &[TypeName]) -> Option<Expr> {
        let types = self.types();
        let found = expr.return_type();
        if accepted.iter().any(|to| types.is_assignable(&found, to)) {
            return Some(expr);
        }
        // Checked per value at run time
        if found == TypeName::OBJECT {
            return Some(Expr::Cast(CastExpr::new(expr, accepted.to_vec(), Arc::clone(types))));
        }
        let reachable: Vec<TypeName> = accepted
            .iter()
            .filter(|to| types.converter(&found, to).is_some())
            .cloned()
            .collect();
        if reachable.is_empty() {
            self.mismatch(text, found.to_string(), accepted);
            return None;
        }
        Some(Expr::Cast(CastExpr::new(expr, reachable, Arc::clone(types))))
    }

    fn mismatch(&self, text: &str, found: String, accepted: &[TypeName]) {
        self.record_mismatch(TypeMismatch {
            text: text.to_string(),
            found,
            expected: accepted.iter().map(ToString::to_string).collect(),
        });
    }

    fn record_mismatch(&self, mismatch: TypeMismatch) {
        let mut mismatches = self.mismatches.borrow_mut();
        if !mismatches.contains(&mismatch) {
            mismatches.push(mismatch);
        }
    }
}

fn merge(into: &mut Option<ParseFailure>, failure: ParseFailure) {
    match into {
        Some(existing) => existing.merge(failure),
        None => *into = Some(failure),
    }
}

struct SpanResolver<'a> {
    ctx: &'a ParseContext,
    resolved: Resolved,
    guard: Guard,
}

impl CaptureResolver for SpanResolver<'_> {
    fn resolve(&mut self, placeholder: &Placeholder, text: &str, span: Range<usize>) -> bool {
        let key = (placeholder.index, span.start, span.end);
        if let Some(expr) = self.resolved.get(&key) {
            return expr.is_some();
        }
        if !self.ctx.step() {
            return false;
        }
        let (expr, guard) = self.ctx.resolve_placeholder(placeholder, text);
        self.guard = lowest(self.guard, guard);
        let accepted = expr.is_some();
        self.resolved.insert(key, expr);
        accepted
    }
}

/// A successful match handed to a factory
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Normalized line
    pub input: String,
    pub pattern: Arc<CompiledPattern>,
    /// Resolved expression per placeholder; `None` for an omitted optional
    pub exprs: Vec<Option<Expr>>,
    pub mark: i32,
    pub tags: Vec<String>,
    /// Text captured by each regex group
    pub regexes: Vec<Option<String>>,
    pub literal_len: usize,
}

impl ParseResult {
    pub fn expr(&self, index: usize) -> Option<&Expr> {
        self.exprs.get(index).and_then(Option::as_ref)
    }

    /// Take a required expression
    pub fn take(&mut self, index: usize) -> Result<Expr, String> {
        self.take_optional(index).ok_or_else(|| {
            format!(
                "'{}' has no value for placeholder {} of '{}'",
                self.input,
                index + 1,
                self.pattern.source()
            )
        })
    }

    pub fn take_optional(&mut self, index: usize) -> Option<Expr> {
        self.exprs.get_mut(index).and_then(Option::take)
    }

    pub fn regex(&self, index: usize) -> Option<&str> {
        self.regexes.get(index).and_then(Option::as_deref)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Split a list such as `1, 2 and 3` or `a or b` at its top level
///
/// Separators inside quotes or brackets are ignored. Returns the trimmed
/// items and whether this is an `and` list; any `or` makes it an `or`
/// list. `None` when there is nothing to split.
pub fn split_list(text: &str) -> Option<(Vec<String>, bool)> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut and = true;
    let mut quoted = false;
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => quoted = !quoted,
            _ if quoted => {}
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            _ if depth > 0 => {}
            b',' => {
                pieces.push(&text[start..i]);
                start = i + 1;
            }
            b' ' => {
                let rest = &bytes[i + 1..];
                if let Some(word) = ["and", "or", "nor"].into_iter().find(|w| starts_with_word(rest, w)) {
                    pieces.push(&text[start..i]);
                    and &= word == "and";
                    i += word.len() + 1;
                    start = i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    if pieces.is_empty() || quoted || depth != 0 {
        return None;
    }
    pieces.push(&text[start.min(text.len())..]);

    let last = pieces.len() - 1;
    let mut items = Vec::with_capacity(pieces.len());
    for (index, piece) in pieces.into_iter().enumerate() {
        let piece = piece.trim();
        if piece.is_empty() {
            // `a, b, and c` leaves an empty piece between `,` and `and`
            if index == 0 || index == last {
                return None;
            }
            continue;
        }
        items.push(piece.to_string());
    }
    (items.len() > 1).then_some((items, and))
}

fn starts_with_word(rest: &[u8], word: &str) -> bool {
    rest.len() > word.len()
        && rest[..word.len()].eq_ignore_ascii_case(word.as_bytes())
        && rest[word.len()] == b' '
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("1, 2 and 3"), Some((strings(&["1", "2", "3"]), true)));
        assert_eq!(split_list("1, 2, and 3"), Some((strings(&["1", "2", "3"]), true)));
        assert_eq!(split_list("a or b"), Some((strings(&["a", "b"]), false)));
        assert_eq!(split_list("{a}, {b} nor {c}"), Some((strings(&["{a}", "{b}", "{c}"]), false)));
    }

    #[test]
    fn test_split_list_ignores_nested_separators() {
        assert_eq!(split_list("\"salt and pepper\""), None);
        assert_eq!(split_list("{list::%a and b%}"), None);
        assert_eq!(
            split_list("\"a, b\" and (1 and 2)"),
            Some((strings(&["\"a, b\"", "(1 and 2)"]), true))
        );
        assert_eq!(split_list("5"), None);
        assert_eq!(split_list("and 5"), None);
        assert_eq!(split_list("5,"), None);
    }

    #[test]
    fn test_scope_loops() {
        let scope = ParseScope {
            loops: vec![
                LoopScope { slot: 0, value_type: TypeName::NUMBER },
                LoopScope { slot: 1, value_type: TypeName::TEXT },
            ],
            ..ParseScope::default()
        };
        assert_eq!(scope.innermost_loop().map(|l| l.slot), Some(1));
        assert_eq!(scope.loop_at(1).map(|l| l.slot), Some(0));
        assert!(scope.loop_at(0).is_none());
        assert!(scope.loop_at(3).is_none());
    }
}
