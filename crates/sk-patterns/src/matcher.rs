//! Backtracking matcher over a lowered pattern program
//!
//! The matcher keeps an explicit stack of choice points instead of
//! recursing, so deeply nested patterns cannot exhaust the call stack.
//! Optional groups try their content first, alternations try branches in
//! declared order, and captures try their shortest acceptable span first.
//! Every instruction and every capture attempt counts against
//! [`MatchLimits::max_steps`].

use std::ops::Range;

use tracing::debug;

use crate::compiler::CompiledPattern;
use crate::element::Placeholder;
use crate::program::{Follow, Inst};
use crate::text::Text;

/// Decides whether a span can fill a placeholder
///
/// The matcher may ask about the same span more than once while it
/// backtracks; implementations are expected to memoize.
pub trait CaptureResolver {
    /// `span` is the byte range of `text` within the matched input
    fn resolve(&mut self, placeholder: &Placeholder, text: &str, span: Range<usize>) -> bool;
}

impl<F> CaptureResolver for F
where
    F: FnMut(&Placeholder, &str, Range<usize>) -> bool,
{
    fn resolve(&mut self, placeholder: &Placeholder, text: &str, span: Range<usize>) -> bool {
        self(placeholder, text, span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchLimits {
    pub max_steps: usize,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self { max_steps: 20_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Literal,
    Placeholder(usize),
    Regex(usize),
}

/// A consumed slice of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Byte range into the input
    pub span: Range<usize>,
}

/// A successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Literal and capture segments in input order
    pub segments: Vec<Segment>,
    /// XOR of the parse marks on the taken branches
    pub mark: i32,
    /// Parse tags on the taken branches
    pub tags: Vec<String>,
    /// Byte range per placeholder; `None` when skipped or left empty
    pub captures: Vec<Option<Range<usize>>>,
    /// Byte range per regex group; `None` when skipped
    pub regexes: Vec<Option<Range<usize>>>,
    /// Characters consumed by literal text
    pub literal_len: usize,
}

impl MatchResult {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn capture<'a>(&self, input: &'a str, index: usize) -> Option<&'a str> {
        let span = self.captures.get(index)?.clone()?;
        input.get(span)
    }

    pub fn regex<'a>(&self, input: &'a str, index: usize) -> Option<&'a str> {
        let span = self.regexes.get(index)?.clone()?;
        input.get(span)
    }
}

/// A failed match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFailure {
    /// Furthest byte offset at which an element failed
    pub furthest: usize,
    /// What would have been accepted at `furthest`
    pub expected: Vec<String>,
    /// The step budget ran out
    pub exhausted: bool,
}

impl CompiledPattern {
    /// Match normalized input against this pattern
    ///
    /// See [`normalize_input`](crate::normalize_input).
    pub fn match_input<R>(
        &self,
        input: &str,
        resolver: &mut R,
        limits: MatchLimits,
    ) -> Result<MatchResult, MatchFailure>
    where
        R: CaptureResolver + ?Sized,
    {
        let text = Text::new(input);
        let mut run = Run {
            pattern: self,
            text: &text,
            resolver,
            limits,
            steps: 0,
            exhausted: false,
            failures: Failures::default(),
        };
        let result = run.execute();
        if run.exhausted {
            debug!(
                pattern = self.source(),
                input,
                steps = run.steps,
                "Pattern match exceeded step budget"
            );
        }
        result
    }
}

#[derive(Debug, Default)]
struct State {
    cursor: usize,
    mark: i32,
    segments: Vec<(SegmentKind, usize, usize)>,
    tags: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Saved {
    cursor: usize,
    mark: i32,
    segments: usize,
    tags: usize,
}

impl State {
    fn save(&self) -> Saved {
        Saved {
            cursor: self.cursor,
            mark: self.mark,
            segments: self.segments.len(),
            tags: self.tags.len(),
        }
    }

    fn restore(&mut self, saved: Saved) {
        self.cursor = saved.cursor;
        self.mark = saved.mark;
        self.segments.truncate(saved.segments);
        self.tags.truncate(saved.tags);
    }

    fn consume(&mut self, kind: SegmentKind, end: usize) {
        if end > self.cursor {
            self.segments.push((kind, self.cursor, end));
        }
        self.cursor = end;
    }
}

enum Backtrack {
    Branch {
        pc: usize,
        saved: Saved,
    },
    Capture {
        pc: usize,
        saved: Saved,
        ends: std::vec::IntoIter<usize>,
    },
}

#[derive(Debug, Default)]
struct Failures {
    furthest: usize,
    expected: Vec<String>,
}

impl Failures {
    fn record(&mut self, cursor: usize, describe: impl FnOnce() -> String) {
        if cursor > self.furthest {
            self.furthest = cursor;
            self.expected.clear();
        }
        if cursor == self.furthest {
            let expected = describe();
            if !self.expected.contains(&expected) {
                self.expected.push(expected);
            }
        }
    }
}

struct Run<'a, R: ?Sized> {
    pattern: &'a CompiledPattern,
    text: &'a Text<'a>,
    resolver: &'a mut R,
    limits: MatchLimits,
    steps: usize,
    exhausted: bool,
    failures: Failures,
}

impl<R: CaptureResolver + ?Sized> Run<'_, R> {
    fn tick(&mut self) -> bool {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            self.exhausted = true;
        }
        !self.exhausted
    }

    fn execute(&mut self) -> Result<MatchResult, MatchFailure> {
        let pattern = self.pattern;
        let text = self.text;
        let mut state = State::default();
        let mut stack: Vec<Backtrack> = Vec::new();
        let mut pc = 0;

        loop {
            if !self.tick() {
                return Err(self.failure());
            }

            let advanced = match pattern.program.get(pc) {
                None | Some(Inst::Match) => {
                    if state.cursor == text.len() {
                        return Ok(self.finish(state));
                    }
                    self.failures
                        .record(state.cursor, || "end of line".to_string());
                    false
                }
                Some(Inst::Literal(literal)) => match text.match_literal(state.cursor, literal) {
                    Some(end) => {
                        state.consume(SegmentKind::Literal, end);
                        pc += 1;
                        true
                    }
                    None => {
                        self.failures
                            .record(state.cursor, || format!("'{}'", literal.trim()));
                        false
                    }
                },
                Some(Inst::Split(first, second)) => {
                    stack.push(Backtrack::Branch {
                        pc: *second,
                        saved: state.save(),
                    });
                    pc = *first;
                    true
                }
                Some(Inst::Jump(target)) => {
                    pc = *target;
                    true
                }
                Some(Inst::Mark(mark)) => {
                    state.mark ^= *mark;
                    pc += 1;
                    true
                }
                Some(Inst::Tag(tag)) => {
                    state.tags.push(tag.clone());
                    pc += 1;
                    true
                }
                Some(Inst::Placeholder { .. } | Inst::Regex { .. }) => {
                    let saved = state.save();
                    let mut ends = self.capture_ends(pc, state.cursor).into_iter();
                    if self.advance_capture(pc, &mut ends, &mut state) {
                        stack.push(Backtrack::Capture { pc, saved, ends });
                        pc += 1;
                        true
                    } else {
                        false
                    }
                }
            };

            if advanced {
                continue;
            }
            if self.exhausted {
                return Err(self.failure());
            }

            loop {
                match stack.pop() {
                    None => return Err(self.failure()),
                    Some(Backtrack::Branch { pc: resume, saved }) => {
                        state.restore(saved);
                        pc = resume;
                        break;
                    }
                    Some(Backtrack::Capture {
                        pc: at,
                        saved,
                        mut ends,
                    }) => {
                        state.restore(saved);
                        if self.advance_capture(at, &mut ends, &mut state) {
                            stack.push(Backtrack::Capture { pc: at, saved, ends });
                            pc = at + 1;
                            break;
                        }
                        if self.exhausted {
                            return Err(self.failure());
                        }
                    }
                }
            }
        }
    }

    fn capture_ends(&self, pc: usize, start: usize) -> Vec<usize> {
        let text = self.text;
        match self.pattern.program.get(pc) {
            Some(Inst::Placeholder { index, follow }) => {
                let mut ends = text.capture_ends(start, |end| boundary_ok(text, follow, end));
                if self.pattern.placeholder(*index).is_some_and(|p| p.optional) {
                    ends.push(start);
                }
                ends
            }
            Some(Inst::Regex { follow, .. }) => {
                text.capture_ends(start, |end| boundary_ok(text, follow, end))
            }
            _ => Vec::new(),
        }
    }

    /// Try the remaining candidate ends until one is accepted
    fn advance_capture(
        &mut self,
        pc: usize,
        ends: &mut std::vec::IntoIter<usize>,
        state: &mut State,
    ) -> bool {
        let pattern = self.pattern;
        let text = self.text;
        let start = state.cursor;

        for end in ends.by_ref() {
            if !self.tick() {
                return false;
            }
            let (kind, accepted) = match pattern.program.get(pc) {
                Some(Inst::Placeholder { index, .. }) => {
                    let accepted = end == start
                        || pattern.placeholder(*index).is_some_and(|placeholder| {
                            self.resolver.resolve(
                                placeholder,
                                text.slice(start, end),
                                text.byte_offset(start)..text.byte_offset(end),
                            )
                        });
                    (SegmentKind::Placeholder(*index), accepted)
                }
                Some(Inst::Regex { index, .. }) => {
                    let accepted = pattern
                        .regexes()
                        .get(*index)
                        .is_some_and(|regex| regex.is_match(text.slice(start, end)));
                    (SegmentKind::Regex(*index), accepted)
                }
                _ => return false,
            };
            if accepted {
                state.consume(kind, end);
                return true;
            }
        }

        self.failures.record(start, || describe(pattern, pc));
        false
    }

    fn finish(&self, state: State) -> MatchResult {
        let text = self.text;
        let mut captures = vec![None; self.pattern.placeholders().len()];
        let mut regexes = vec![None; self.pattern.regexes().len()];
        let mut literal_len = 0;

        let segments = state
            .segments
            .into_iter()
            .map(|(kind, start, end)| {
                let span = text.byte_offset(start)..text.byte_offset(end);
                match kind {
                    SegmentKind::Literal => literal_len += end - start,
                    SegmentKind::Placeholder(index) => {
                        if let Some(slot) = captures.get_mut(index) {
                            *slot = Some(span.clone());
                        }
                    }
                    SegmentKind::Regex(index) => {
                        if let Some(slot) = regexes.get_mut(index) {
                            *slot = Some(span.clone());
                        }
                    }
                }
                Segment { kind, span }
            })
            .collect();

        MatchResult {
            segments,
            mark: state.mark,
            tags: state.tags,
            captures,
            regexes,
            literal_len,
        }
    }

    fn failure(&self) -> MatchFailure {
        MatchFailure {
            furthest: self.text.byte_offset(self.failures.furthest.min(self.text.len())),
            expected: self.failures.expected.clone(),
            exhausted: self.exhausted,
        }
    }
}

fn boundary_ok(text: &Text<'_>, follow: &Follow, end: usize) -> bool {
    match follow {
        Follow::End => end == text.len(),
        Follow::Literal(literal) => text.match_literal(end, literal).is_some(),
        Follow::Any => text.is_word_boundary(end),
    }
}

fn describe(pattern: &CompiledPattern, pc: usize) -> String {
    match pattern.program.get(pc) {
        Some(Inst::Placeholder { index, .. }) => pattern
            .placeholder(*index)
            .map(|p| format!("%{}%", p.types.join("/")))
            .unwrap_or_default(),
        Some(Inst::Regex { index, .. }) => pattern
            .regexes()
            .get(*index)
            .map(ToString::to_string)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use pretty_assertions::assert_eq;

    fn numbers(_: &Placeholder, text: &str, _: Range<usize>) -> bool {
        text.parse::<f64>().is_ok()
    }

    fn anything(_: &Placeholder, _: &str, _: Range<usize>) -> bool {
        true
    }

    fn run(pattern: &str, input: &str) -> Result<MatchResult, MatchFailure> {
        compile(pattern)
            .unwrap()
            .match_input(input, &mut anything, MatchLimits::default())
    }

    #[test]
    fn test_match_optional_and_choice() {
        assert!(run("(wait|halt) [for] %timespan%", "wait 5 seconds").is_ok());
        assert!(run("(wait|halt) [for] %timespan%", "halt for 1 tick").is_ok());
        assert!(run("(wait|halt) [for] %timespan%", "pause 5 seconds").is_err());
    }

    #[test]
    fn test_match_is_case_insensitive() {
        assert!(run("broadcast %text%", "BROADCAST hello").is_ok());
    }

    #[test]
    fn test_captures() {
        let input = "set {var} to 5";
        let result = run("set %~objects% to %objects%", input).unwrap();
        assert_eq!(result.capture(input, 0), Some("{var}"));
        assert_eq!(result.capture(input, 1), Some("5"));
        assert_eq!(result.literal_len, "set ".len() + " to ".len());
    }

    #[test]
    fn test_shortest_span_first() {
        let input = "add 1 to 2 to 3";
        let pattern = compile("add %objects% to %objects%").unwrap();
        let result = pattern
            .match_input(input, &mut anything, MatchLimits::default())
            .unwrap();
        assert_eq!(result.capture(input, 0), Some("1"));
        assert_eq!(result.capture(input, 1), Some("2 to 3"));
    }

    #[test]
    fn test_backtracks_into_capture() {
        let input = "add 1 to 2 to 3";
        let pattern = compile("add %objects% to %number%").unwrap();
        let result = pattern
            .match_input(input, &mut numbers, MatchLimits::default())
            .unwrap_err();
        assert!(!result.exhausted);

        let input = "add x to y to 3";
        let result = pattern
            .match_input(
                input,
                &mut |p: &Placeholder, text: &str, _: Range<usize>| {
                    p.index == 0 || text.parse::<f64>().is_ok()
                },
                MatchLimits::default(),
            )
            .unwrap();
        assert_eq!(result.capture(input, 0), Some("x to y"));
        assert_eq!(result.capture(input, 1), Some("3"));
    }

    #[test]
    fn test_marks_xor_and_tags() {
        let pattern = compile("(1¦add|2¦remove) [3¦all] [:silently] %number%").unwrap();
        let result = pattern
            .match_input("remove all silently 5", &mut numbers, MatchLimits::default())
            .unwrap();
        assert_eq!(result.mark, 2 ^ 3);
        assert!(result.has_tag("silently"));

        let result = pattern
            .match_input("add 5", &mut numbers, MatchLimits::default())
            .unwrap();
        assert_eq!(result.mark, 1);
        assert!(result.tags.is_empty());
    }

    #[test]
    fn test_optional_placeholder_may_be_empty() {
        let input = "spawn zombie at";
        let result = run("spawn %text% at[ %-text%]", input);
        assert!(result.is_ok());

        let result = run("give %-number%", "give").unwrap();
        assert_eq!(result.captures, vec![None]);
    }

    #[test]
    fn test_regex_group() {
        let input = "if {x} is 5";
        let result = run("if <.+>", input).unwrap();
        assert_eq!(result.regex(input, 0), Some("{x} is 5"));
    }

    #[test]
    fn test_failure_reports_expected_placeholder() {
        let failure = run("set %~objects% to %objects%", "set to 5").unwrap_err();
        assert_eq!(failure.furthest, 4);
        assert_eq!(failure.expected, vec!["%objects%".to_string()]);
    }

    #[test]
    fn test_failure_reports_expected_literal() {
        let failure = run("stop [the] loop", "stop the script").unwrap_err();
        assert_eq!(failure.expected, vec!["'loop'".to_string()]);
    }

    #[test]
    fn test_step_budget() {
        let pattern = compile("%objects% and %objects% and %number%").unwrap();
        let input = "a and b and c and d and e and f and g and h and i and j";
        let failure = pattern
            .match_input(
                input,
                &mut |p: &Placeholder, text: &str, _: Range<usize>| {
                    p.index < 2 || text.parse::<f64>().is_ok()
                },
                MatchLimits { max_steps: 10 },
            )
            .unwrap_err();
        assert!(failure.exhausted);
    }

    #[test]
    fn test_segments_cover_input() {
        let input = "set {var} to 5";
        let result = run("set %~objects% to %objects%", input).unwrap();
        let rebuilt: String = result
            .segments
            .iter()
            .map(|s| &input[s.span.clone()])
            .collect();
        assert_eq!(rebuilt, input);
    }
}
