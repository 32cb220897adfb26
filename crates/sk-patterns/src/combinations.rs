//! Enumeration of the concrete forms a pattern accepts

use indexmap::IndexSet;

use crate::compiler::CompiledPattern;
use crate::element::PatternElement;

impl CompiledPattern {
    /// Every rendering of this pattern with each group resolved
    ///
    /// Placeholders render as `%type%` and regex groups as `<regex>`.
    /// Whitespace is collapsed and duplicates are removed; the order
    /// follows the matcher's own preference.
    pub fn combinations(&self) -> Vec<String> {
        sequence(self.elements())
            .into_iter()
            .map(|rendering| collapse_spaces(&rendering))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}

fn sequence(elements: &[PatternElement]) -> IndexSet<String> {
    let mut renderings = IndexSet::from([String::new()]);
    for element in elements {
        let options = alternatives(element);
        renderings = renderings
            .iter()
            .flat_map(|prefix| options.iter().map(move |option| format!("{prefix}{option}")))
            .collect();
    }
    renderings
}

fn alternatives(element: &PatternElement) -> IndexSet<String> {
    match element {
        PatternElement::Literal(text) => IndexSet::from([text.clone()]),
        PatternElement::Placeholder(placeholder) => {
            IndexSet::from([format!("%{}%", placeholder.types.join("/"))])
        }
        PatternElement::Regex(regex) => IndexSet::from([regex.to_string()]),
        PatternElement::Group(group) => {
            let mut options: IndexSet<String> = group
                .branches
                .iter()
                .flat_map(|branch| sequence(&branch.elements))
                .collect();
            if group.optional {
                options.insert(String::new());
            }
            options
        }
    }
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use crate::compile;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_combinations() {
        let pattern = compile("[all [of the]|the] entities [of %-world%]").unwrap();
        assert_eq!(
            pattern.combinations(),
            vec![
                "all of the entities of %world%",
                "all of the entities",
                "all entities of %world%",
                "all entities",
                "the entities of %world%",
                "the entities",
                "entities of %world%",
                "entities",
            ]
        );
    }

    #[test]
    fn test_combinations_deduplicate() {
        let pattern = compile("(a|a) [b|]").unwrap();
        assert_eq!(pattern.combinations(), vec!["a b", "a"]);
    }
}
