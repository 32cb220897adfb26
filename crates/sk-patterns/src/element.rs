//! Pattern element tree

use std::fmt;

/// One node of a compiled pattern
#[derive(Debug, Clone, PartialEq)]
pub enum PatternElement {
    /// Text matched case-insensitively
    Literal(String),
    /// `[...]` or `(...)`
    Group(Group),
    /// `%type%`
    Placeholder(Placeholder),
    /// `<regex>`
    Regex(RegexGroup),
}

/// An optional group or an alternation
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// `[...]` groups may be skipped entirely
    pub optional: bool,
    pub branches: Vec<Branch>,
}

/// One alternative of a group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Branch {
    /// `n¦` parse mark, XOR-combined into the match result when taken
    pub mark: Option<i32>,
    /// `name:` parse tag, recorded in the match result when taken
    pub tag: Option<String>,
    pub elements: Vec<PatternElement>,
}

/// A typed hole in a pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placeholder {
    /// Position among the pattern's placeholders, left to right
    pub index: usize,
    /// Accepted type names as written (`objects`, `number`), tried in order
    pub types: Vec<String>,
    /// `%-type%`: may match nothing
    pub optional: bool,
    /// `%*type%`: only literals are accepted
    pub literal_only: bool,
    /// `%~type%`: the expression must be changeable
    pub changeable: bool,
}

impl Placeholder {
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("%")?;
        if self.optional {
            f.write_str("-")?;
        }
        if self.literal_only {
            f.write_str("*")?;
        }
        if self.changeable {
            f.write_str("~")?;
        }
        write!(f, "{}%", self.types.join("/"))
    }
}

/// `<...>` capture
#[derive(Debug, Clone)]
pub struct RegexGroup {
    /// Position among the pattern's regex groups, left to right
    pub index: usize,
    /// Regex source as written between the angle brackets
    pub source: String,
    pub(crate) regex: regex::Regex,
}

impl RegexGroup {
    /// Whether `text` matches the whole regex
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for RegexGroup {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.source == other.source
    }
}

impl fmt::Display for RegexGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.source)
    }
}
