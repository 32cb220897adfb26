//! Input text helpers shared by the matcher

/// Trim and collapse whitespace runs outside of quoted strings
///
/// The matcher assumes normalized input: no leading or trailing whitespace
/// and single spaces between words.
pub fn normalize_input(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_quote = false;
    let mut pending_space = false;

    for c in input.trim().chars() {
        if in_quote {
            out.push(c);
            if c == '"' {
                in_quote = false;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '"' {
            in_quote = true;
        }
        out.push(c);
    }
    out
}

/// Char-indexed view over an input line
pub(crate) struct Text<'a> {
    source: &'a str,
    chars: Vec<char>,
    offsets: Vec<usize>,
}

impl<'a> Text<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        let mut chars = Vec::with_capacity(source.len());
        let mut offsets = Vec::with_capacity(source.len() + 1);
        for (offset, c) in source.char_indices() {
            chars.push(c);
            offsets.push(offset);
        }
        offsets.push(source.len());
        Self {
            source,
            chars,
            offsets,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.chars.len()
    }

    pub(crate) fn byte_offset(&self, char_index: usize) -> usize {
        self.offsets[char_index]
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.source[self.offsets[start]..self.offsets[end]]
    }

    /// Match a lowercase literal at `cursor`
    ///
    /// A literal space matches one input space, or nothing at the start of
    /// the input, at the end of the input, or right after another space.
    pub(crate) fn match_literal(&self, cursor: usize, literal: &str) -> Option<usize> {
        let mut pos = cursor;
        for expected in literal.chars() {
            if expected == ' ' {
                if self.chars.get(pos) == Some(&' ') {
                    pos += 1;
                } else if pos == 0 || pos == self.len() || self.chars[pos - 1] == ' ' {
                    continue;
                } else {
                    return None;
                }
            } else {
                let actual = *self.chars.get(pos)?;
                if !actual.to_lowercase().eq(expected.to_lowercase()) {
                    return None;
                }
                pos += 1;
            }
        }
        Some(pos)
    }

    /// Candidate end positions for a capture starting at `start`
    ///
    /// Spans never start or end with a space and never split a quoted
    /// string or a bracketed region. `boundary` filters the remaining ends.
    pub(crate) fn capture_ends(&self, start: usize, boundary: impl Fn(usize) -> bool) -> Vec<usize> {
        let mut ends = Vec::new();
        if start >= self.len() || self.chars[start] == ' ' {
            return ends;
        }

        let mut depth = 0i32;
        let mut in_quote = false;
        for end in start + 1..=self.len() {
            let c = self.chars[end - 1];
            if c == '"' {
                in_quote = !in_quote;
            } else if !in_quote {
                match c {
                    '(' | '{' | '[' => depth += 1,
                    ')' | '}' | ']' => depth -= 1,
                    _ => {}
                }
            }
            if depth < 0 {
                break;
            }
            if in_quote || depth > 0 || c == ' ' {
                continue;
            }
            if boundary(end) {
                ends.push(end);
            }
        }
        ends
    }

    /// Whether `pos` does not fall inside a word
    pub(crate) fn is_word_boundary(&self, pos: usize) -> bool {
        if pos == 0 || pos >= self.len() {
            return true;
        }
        !(self.chars[pos - 1].is_alphanumeric() && self.chars[pos].is_alphanumeric())
    }
}
