//! Script text to an indentation tree
//!
//! `#` starts a comment outside quoted text and `##` stands for a literal
//! `#`. Blank and comment-only lines are dropped. A line ending in `:`
//! opens a section whose body is the following block of deeper-indented
//! lines. Tabs count as four columns. A line that leaves a `[`, `{` or
//! `(` open outside quotes continues on the next lines; the joined line
//! keeps the number and indentation of its first line.

use sk_syntax::{CompileError, CompileErrorKind};

const TAB_WIDTH: usize = 4;

/// A non-empty line of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number
    pub number: usize,
    pub indent: usize,
    /// Content without indentation, comment or trailing whitespace
    pub text: String,
}

impl SourceLine {
    pub fn is_section(&self) -> bool {
        self.text.ends_with(':')
    }

    /// Text without the section colon
    pub fn header(&self) -> &str {
        self.text.strip_suffix(':').unwrap_or(&self.text).trim_end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNode {
    pub line: SourceLine,
    pub children: Vec<SourceNode>,
}

/// Remove a trailing comment, unescaping `##`
pub fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                out.push(c);
            }
            '#' if quoted => out.push(c),
            '#' if chars.peek() == Some(&'#') => {
                chars.next();
                out.push('#');
            }
            '#' => break,
            _ => out.push(c),
        }
    }
    out.truncate(out.trim_end().len());
    out
}

/// Brackets opened minus brackets closed, outside quoted text
fn open_brackets(text: &str) -> i32 {
    let mut quoted = false;
    let mut depth = 0;
    for c in text.chars() {
        match c {
            '"' => quoted = !quoted,
            _ if quoted => {}
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth -= 1,
            _ => {}
        }
    }
    depth
}

pub fn read_lines(source: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    // A line still waiting for its closing brackets
    let mut open: Option<(SourceLine, i32)> = None;

    for (i, raw) in source.lines().enumerate() {
        let text = strip_comment(raw);
        let content = text.trim_start();
        if content.is_empty() {
            continue;
        }

        if let Some((mut line, depth)) = open.take() {
            line.text.push(' ');
            line.text.push_str(content);
            let depth = depth + open_brackets(content);
            if depth > 0 {
                open = Some((line, depth));
            } else {
                lines.push(line);
            }
            continue;
        }

        let indent = text[..text.len() - content.len()]
            .chars()
            .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
            .sum();
        let line = SourceLine {
            number: i + 1,
            indent,
            text: content.to_string(),
        };
        match open_brackets(content) {
            depth if depth > 0 => open = Some((line, depth)),
            _ => lines.push(line),
        }
    }
    // Left unclosed at the end of the script; the parser reports it
    lines.extend(open.map(|(line, _)| line));
    lines
}

/// Build the indentation tree of a script
///
/// Lines indented where no section opened are reported and skipped
/// together with their deeper-indented followers.
pub fn parse_tree(source: &str) -> (Vec<SourceNode>, Vec<CompileError>) {
    let lines = read_lines(source);
    let mut errors = Vec::new();
    let mut pos = 0;
    let mut nodes = Vec::new();
    while pos < lines.len() {
        nodes.extend(build_level(&lines, &mut pos, 0, &mut errors));
    }
    (nodes, errors)
}

fn build_level(
    lines: &[SourceLine],
    pos: &mut usize,
    indent: usize,
    errors: &mut Vec<CompileError>,
) -> Vec<SourceNode> {
    let mut nodes = Vec::new();
    while let Some(line) = lines.get(*pos) {
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            errors.push(CompileError::new(
                line.number,
                CompileErrorKind::Indentation,
                line.text.clone(),
                format!(
                    "indentation error: expected {indent} columns of indentation, but found {}",
                    line.indent
                ),
            ));
            *pos += 1;
            while lines.get(*pos).is_some_and(|next| next.indent > indent) {
                *pos += 1;
            }
            continue;
        }

        *pos += 1;
        let mut node = SourceNode {
            line: line.clone(),
            children: Vec::new(),
        };
        if line.is_section() {
            if let Some(next) = lines.get(*pos).filter(|next| next.indent > indent) {
                node.children = build_level(lines, pos, next.indent, errors);
            }
        }
        nodes.push(node);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("set {x} to 5 # five"), "set {x} to 5");
        assert_eq!(strip_comment("# only a comment"), "");
        assert_eq!(strip_comment("broadcast \"#1\""), "broadcast \"#1\"");
        assert_eq!(strip_comment("set {tag} to 1 ## hash"), "set {tag} to 1 # hash");
    }

    #[test]
    fn test_read_lines_measures_indentation() {
        let lines = read_lines("on load:\n\tbroadcast \"hi\"\n\n    # note\n    stop\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].indent, 0);
        assert_eq!(lines[1].indent, 4);
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[2].number, 5);
        assert!(lines[0].is_section());
        assert_eq!(lines[0].header(), "on load");
    }

    #[test]
    fn test_open_brackets_join_lines() {
        let lines = read_lines(
            "on load:\n\
             \tset {_list::*} to (1,\n\
             \t\t\t2, # second\n\
             \n\
             \t\t\t3)\n\
             \tbroadcast \"(not joined\"\n\
             \tstop\n",
        );
        let texts: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["on load:", "set {_list::*} to (1, 2, 3)", "broadcast \"(not joined\"", "stop"]
        );
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[1].indent, 4);
        assert_eq!(lines[2].number, 6);
    }

    #[test]
    fn test_continued_line_keeps_its_place_in_the_tree() {
        let (tree, errors) = parse_tree(
            "on load:\n\
             \tif {_x} is (1 +\n\
             2):\n\
             \t\tstop\n\
             \tbroadcast {a}\n",
        );
        assert!(errors.is_empty());
        assert_eq!(tree[0].children.len(), 2);
        let section = &tree[0].children[0];
        assert_eq!(section.line.text, "if {_x} is (1 + 2):");
        assert_eq!(section.line.number, 2);
        assert_eq!(section.children[0].line.text, "stop");

        let unclosed = read_lines("on load:\n\tbroadcast {a\n");
        assert_eq!(unclosed.len(), 2);
        assert_eq!(unclosed[1].text, "broadcast {a");
    }

    #[test]
    fn test_tree() {
        let (tree, errors) = parse_tree(
            "on load:\n  if {x} is set:\n    stop\n  broadcast \"a\"\nevery 5 seconds:\n  broadcast \"b\"\n",
        );
        assert!(errors.is_empty());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].children[0].line.text, "stop");
        assert_eq!(tree[1].children[0].line.number, 6);
    }

    #[test]
    fn test_unexpected_indentation() {
        let (tree, errors) = parse_tree("on load:\n  broadcast \"a\"\n      stop\n      stop\n  broadcast \"b\"\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 3);
        assert_eq!(errors[0].kind, CompileErrorKind::Indentation);
        assert_eq!(tree[0].children.len(), 2);
    }

    #[test]
    fn test_dedent_between_levels() {
        let (_, errors) = parse_tree("on load:\n    if {x} is set:\n        stop\n  stop\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 4);
    }
}
