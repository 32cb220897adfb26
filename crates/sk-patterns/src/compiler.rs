//! Pattern source to element tree

use sk_core::TypeName;
use tracing::trace;

use crate::element::{Branch, Group, PatternElement, Placeholder, RegexGroup};
use crate::error::{PatternResult, PatternSyntaxError};
use crate::program::Program;

/// Parse mark separator
const MARK_SEPARATOR: char = '¦';

/// A pattern ready for matching
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    elements: Vec<PatternElement>,
    placeholders: Vec<Placeholder>,
    regexes: Vec<RegexGroup>,
    pub(crate) program: Program,
}

impl CompiledPattern {
    /// Pattern source as registered
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Top-level element sequence
    pub fn elements(&self) -> &[PatternElement] {
        &self.elements
    }

    /// Placeholders in left-to-right order
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn placeholder(&self, index: usize) -> Option<&Placeholder> {
        self.placeholders.get(index)
    }

    /// Regex groups in left-to-right order
    pub fn regexes(&self) -> &[RegexGroup] {
        &self.regexes
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.elements == other.elements
    }
}

/// Compile a pattern source string
///
/// Compilation is deterministic: the same source always yields an equal
/// [`CompiledPattern`].
pub fn compile(source: &str) -> PatternResult<CompiledPattern> {
    let mut compiler = Compiler {
        source,
        chars: source.chars().collect(),
        pos: 0,
        placeholders: Vec::new(),
        regexes: Vec::new(),
    };
    let elements = compiler.parse_root()?;
    let program = Program::lower(&elements);
    trace!(
        pattern = source,
        placeholders = compiler.placeholders.len(),
        instructions = program.len(),
        "Compiled pattern"
    );
    Ok(CompiledPattern {
        source: source.to_string(),
        elements,
        placeholders: compiler.placeholders,
        regexes: compiler.regexes,
        program,
    })
}

struct Compiler<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    placeholders: Vec<Placeholder>,
    regexes: Vec<RegexGroup>,
}

/// Open bracket, matching close bracket, position of the open bracket
type GroupBounds = (char, char, usize);

impl Compiler<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse_root(&mut self) -> PatternResult<Vec<PatternElement>> {
        let mut branches = self.parse_branches(None)?;
        if branches.len() == 1 {
            Ok(branches.pop().map(|b| b.elements).unwrap_or_default())
        } else {
            Ok(vec![PatternElement::Group(Group {
                optional: false,
                branches,
            })])
        }
    }

    fn parse_branches(&mut self, group: Option<GroupBounds>) -> PatternResult<Vec<Branch>> {
        let mut branches = Vec::new();
        loop {
            let mut branch = Branch::default();
            if group.is_some() {
                self.parse_branch_header(&mut branch)?;
            }
            branch.elements = self.parse_sequence(group)?;
            if branch.tag.as_deref() == Some("") {
                branch.tag = derived_tag(&branch.elements);
            }
            branches.push(branch);

            match (self.peek(), group) {
                (Some('|'), _) => self.pos += 1,
                (Some(c), Some((_, close, _))) if c == close => {
                    self.pos += 1;
                    return Ok(branches);
                }
                (None, None) => return Ok(branches),
                (None, Some((open, close, position))) => {
                    return Err(PatternSyntaxError::Unclosed {
                        pattern: self.source.to_string(),
                        open,
                        expected: close,
                        position,
                    })
                }
                (Some(found), _) => {
                    return Err(PatternSyntaxError::UnexpectedClose {
                        pattern: self.source.to_string(),
                        found,
                        position: self.pos,
                    })
                }
            }
        }
    }

    /// `n¦` marks and `tag:` tags at the start of a group branch
    fn parse_branch_header(&mut self, branch: &mut Branch) -> PatternResult<()> {
        let start = self.pos;
        let mut end = start;
        while let Some(&c) = self.chars.get(end) {
            if c == MARK_SEPARATOR {
                let mark: String = self.chars[start..end].iter().collect();
                let value = mark
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| PatternSyntaxError::InvalidMark {
                        pattern: self.source.to_string(),
                        mark: mark.clone(),
                        position: start,
                    })?;
                branch.mark = Some(value);
                self.pos = end + 1;
                return Ok(());
            }
            if c == ':' {
                let tag: String = self.chars[start..end].iter().collect();
                if tag
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    branch.tag = Some(tag.to_lowercase());
                    self.pos = end + 1;
                }
                return Ok(());
            }
            if matches!(c, '[' | ']' | '(' | ')' | '|' | '%' | '<' | '\\' | ' ') {
                return Ok(());
            }
            end += 1;
        }
        Ok(())
    }

    fn parse_sequence(&mut self, group: Option<GroupBounds>) -> PatternResult<Vec<PatternElement>> {
        let mut elements = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek() {
            match c {
                '|' => break,
                ']' | ')' => {
                    if group.map(|(_, close, _)| close) == Some(c) {
                        break;
                    }
                    return Err(PatternSyntaxError::UnexpectedClose {
                        pattern: self.source.to_string(),
                        found: c,
                        position: self.pos,
                    });
                }
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some(escaped) => {
                            literal.push(escaped);
                            self.pos += 1;
                        }
                        None => literal.push('\\'),
                    }
                }
                '[' | '(' => {
                    flush_literal(&mut literal, &mut elements);
                    let position = self.pos;
                    let close = if c == '[' { ']' } else { ')' };
                    self.pos += 1;
                    if self.peek() == Some(close) {
                        return Err(PatternSyntaxError::EmptyGroup {
                            pattern: self.source.to_string(),
                            position,
                        });
                    }
                    let branches = self.parse_branches(Some((c, close, position)))?;
                    elements.push(PatternElement::Group(Group {
                        optional: c == '[',
                        branches,
                    }));
                }
                '%' => {
                    flush_literal(&mut literal, &mut elements);
                    let position = self.pos;
                    self.check_adjacent_capture(&elements, position)?;
                    let placeholder = self.parse_placeholder()?;
                    elements.push(PatternElement::Placeholder(placeholder));
                }
                '<' => {
                    flush_literal(&mut literal, &mut elements);
                    let position = self.pos;
                    self.check_adjacent_capture(&elements, position)?;
                    let regex = self.parse_regex()?;
                    elements.push(PatternElement::Regex(regex));
                }
                _ => {
                    literal.push(c);
                    self.pos += 1;
                }
            }
        }

        flush_literal(&mut literal, &mut elements);
        Ok(elements)
    }

    /// Two captures with nothing between them cannot be split
    fn check_adjacent_capture(
        &self,
        elements: &[PatternElement],
        position: usize,
    ) -> PatternResult<()> {
        if matches!(
            elements.last(),
            Some(PatternElement::Placeholder(_) | PatternElement::Regex(_))
        ) {
            return Err(PatternSyntaxError::IllegalNesting {
                pattern: self.source.to_string(),
                position,
                reason: "captures must be separated by literal text".to_string(),
            });
        }
        Ok(())
    }

    fn parse_placeholder(&mut self) -> PatternResult<Placeholder> {
        let start = self.pos;
        self.pos += 1;
        let content_start = self.pos;
        while self.peek().is_some_and(|c| c != '%') {
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Err(PatternSyntaxError::Unclosed {
                pattern: self.source.to_string(),
                open: '%',
                expected: '%',
                position: start,
            });
        }
        let content: String = self.chars[content_start..self.pos].iter().collect();
        self.pos += 1;

        let malformed = |reason: String| PatternSyntaxError::MalformedPlaceholder {
            pattern: self.source.to_string(),
            placeholder: content.clone(),
            position: start,
            reason,
        };

        let mut placeholder = Placeholder {
            index: self.placeholders.len(),
            types: Vec::new(),
            optional: false,
            literal_only: false,
            changeable: false,
        };

        let mut rest = content.as_str();
        loop {
            match rest.chars().next() {
                Some('-') => placeholder.optional = true,
                Some('*') => placeholder.literal_only = true,
                Some('~') => placeholder.changeable = true,
                _ => break,
            }
            rest = &rest[1..];
        }

        if rest.trim().is_empty() {
            return Err(malformed("missing type name".to_string()));
        }
        for name in rest.split('/') {
            let name = name.trim();
            TypeName::validate(name).map_err(|e| malformed(e.to_string()))?;
            placeholder.types.push(name.to_string());
        }

        self.placeholders.push(placeholder.clone());
        Ok(placeholder)
    }

    fn parse_regex(&mut self) -> PatternResult<RegexGroup> {
        let start = self.pos;
        self.pos += 1;
        let mut source = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(PatternSyntaxError::Unclosed {
                        pattern: self.source.to_string(),
                        open: '<',
                        expected: '>',
                        position: start,
                    })
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') if self.chars.get(self.pos + 1) == Some(&'>') => {
                    source.push('>');
                    self.pos += 2;
                }
                Some(c) => {
                    source.push(c);
                    self.pos += 1;
                }
            }
        }

        let regex = regex::Regex::new(&format!("(?i)^(?:{source})$")).map_err(|e| {
            PatternSyntaxError::InvalidRegex {
                pattern: self.source.to_string(),
                regex: source.clone(),
                message: e.to_string(),
            }
        })?;
        let group = RegexGroup {
            index: self.regexes.len(),
            source,
            regex,
        };
        self.regexes.push(group.clone());
        Ok(group)
    }
}

fn flush_literal(literal: &mut String, elements: &mut Vec<PatternElement>) {
    if literal.is_empty() {
        return;
    }
    let text = std::mem::take(literal);
    if let Some(PatternElement::Literal(previous)) = elements.last_mut() {
        previous.push_str(&text);
    } else {
        elements.push(PatternElement::Literal(text));
    }
}

/// `[:typed]` tags a branch with its own literal text
fn derived_tag(elements: &[PatternElement]) -> Option<String> {
    let text: String = elements
        .iter()
        .filter_map(|e| match e {
            PatternElement::Literal(s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    let tag = text.trim().to_lowercase();
    (!tag.is_empty()).then_some(tag)
}
