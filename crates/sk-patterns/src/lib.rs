//! Syntax pattern engine
//!
//! Patterns describe the textual shapes a syntax entry recognizes:
//!
//! ```text
//! (wait|halt) [for] %timespan%
//! set %~objects% to %objects%
//! [1¦all [of the]|2¦the] entities [of %-world%]
//! if <.+>
//! ```
//!
//! - `[...]` optional group, tried with its content first
//! - `(a|b|c)` alternation, tried in declared order
//! - `%type%` typed placeholder; `%a/b%` accepts several types in order,
//!   `%-type%` may be absent, `%*type%` only accepts literals,
//!   `%~type%` must be changeable
//! - `<regex>` raw regex capture
//! - `n¦` parse mark and `tag:` parse tag at the start of a group branch
//! - `\` escapes the next character
//!
//! [`compile`] turns a source string into a [`CompiledPattern`], which is
//! lowered into a small instruction program. [`CompiledPattern::match_input`]
//! runs that program with an explicit backtrack stack; placeholder spans are
//! handed to a [`CaptureResolver`] supplied by the caller.

mod cache;
mod combinations;
mod compiler;
mod element;
mod error;
mod matcher;
mod program;
mod text;

pub use cache::PatternCache;
pub use compiler::{compile, CompiledPattern};
pub use element::{Branch, Group, PatternElement, Placeholder, RegexGroup};
pub use error::{PatternResult, PatternSyntaxError};
pub use matcher::{
    CaptureResolver, MatchFailure, MatchLimits, MatchResult, Segment, SegmentKind,
};
pub use text::normalize_input;
