//! Syntax categories

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of syntax a registry entry produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Condition,
    Effect,
    Expression,
    Event,
    Section,
    Structure,
    Function,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Condition,
        Category::Effect,
        Category::Expression,
        Category::Event,
        Category::Section,
        Category::Structure,
        Category::Function,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Condition => "condition",
            Category::Effect => "effect",
            Category::Expression => "expression",
            Category::Event => "event",
            Category::Section => "section",
            Category::Structure => "structure",
            Category::Function => "function",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
