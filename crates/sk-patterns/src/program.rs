//! Lowering of the element tree into a flat instruction program

use crate::element::{Branch, Group, PatternElement};

/// What has to come right after a capture
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Follow {
    /// The capture runs to the end of the input
    End,
    /// A literal must match where the capture ends
    Literal(String),
    /// Unknown; any word boundary will do
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inst {
    /// Lowercased literal text
    Literal(String),
    /// Continue at `.0`; on failure resume at `.1`
    Split(usize, usize),
    Jump(usize),
    Mark(i32),
    Tag(String),
    Placeholder { index: usize, follow: Follow },
    Regex { index: usize, follow: Follow },
    Match,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    insts: Vec<Inst>,
}

impl Program {
    pub(crate) fn lower(elements: &[PatternElement]) -> Self {
        let mut program = Self::default();
        program.lower_sequence(elements);
        program.insts.push(Inst::Match);
        program.resolve_follows();
        program
    }

    pub(crate) fn len(&self) -> usize {
        self.insts.len()
    }

    pub(crate) fn get(&self, pc: usize) -> Option<&Inst> {
        self.insts.get(pc)
    }

    fn emit(&mut self, inst: Inst) -> usize {
        self.insts.push(inst);
        self.insts.len() - 1
    }

    fn lower_sequence(&mut self, elements: &[PatternElement]) {
        for element in elements {
            match element {
                PatternElement::Literal(text) => {
                    self.emit(Inst::Literal(text.to_lowercase()));
                }
                PatternElement::Group(group) => self.lower_group(group),
                PatternElement::Placeholder(placeholder) => {
                    self.emit(Inst::Placeholder {
                        index: placeholder.index,
                        follow: Follow::Any,
                    });
                }
                PatternElement::Regex(regex) => {
                    self.emit(Inst::Regex {
                        index: regex.index,
                        follow: Follow::Any,
                    });
                }
            }
        }
    }

    /// Alternatives in declared order; an optional group's last
    /// alternative skips the group
    fn lower_group(&mut self, group: &Group) {
        let mut alternatives: Vec<Option<&Branch>> = group.branches.iter().map(Some).collect();
        if group.optional {
            alternatives.push(None);
        }

        let mut exits = Vec::new();
        let count = alternatives.len();
        for (i, alternative) in alternatives.into_iter().enumerate() {
            let last = i + 1 == count;
            let split = (!last).then(|| self.emit(Inst::Split(0, 0)));
            let body = self.insts.len();

            if let Some(branch) = alternative {
                if let Some(mark) = branch.mark {
                    self.emit(Inst::Mark(mark));
                }
                if let Some(tag) = &branch.tag {
                    self.emit(Inst::Tag(tag.clone()));
                }
                self.lower_sequence(&branch.elements);
            }

            if !last {
                exits.push(self.emit(Inst::Jump(0)));
            }
            if let Some(split) = split {
                self.insts[split] = Inst::Split(body, self.insts.len());
            }
        }

        let end = self.insts.len();
        for exit in exits {
            self.insts[exit] = Inst::Jump(end);
        }
    }

    fn resolve_follows(&mut self) {
        for pc in 0..self.insts.len() {
            let follow = self.follow_at(pc + 1);
            match &mut self.insts[pc] {
                Inst::Placeholder { follow: f, .. } | Inst::Regex { follow: f, .. } => *f = follow,
                _ => {}
            }
        }
    }

    fn follow_at(&self, mut pc: usize) -> Follow {
        // Lowering only emits forward jumps
        while let Some(inst) = self.insts.get(pc) {
            match inst {
                Inst::Literal(text) => return Follow::Literal(text.clone()),
                Inst::Match => return Follow::End,
                Inst::Jump(target) => pc = *target,
                Inst::Mark(_) | Inst::Tag(_) => pc += 1,
                _ => return Follow::Any,
            }
        }
        Follow::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    #[test]
    fn test_lower_optional_group() {
        let pattern = compile("[the] cat").unwrap();
        assert_eq!(
            pattern.program.insts,
            vec![
                Inst::Split(1, 3),
                Inst::Literal("the".into()),
                Inst::Jump(3),
                Inst::Literal(" cat".into()),
                Inst::Match,
            ]
        );
    }

    #[test]
    fn test_lower_choice_with_marks() {
        let pattern = compile("(1¦a|2¦b)").unwrap();
        assert_eq!(
            pattern.program.insts,
            vec![
                Inst::Split(1, 4),
                Inst::Mark(1),
                Inst::Literal("a".into()),
                Inst::Jump(6),
                Inst::Mark(2),
                Inst::Literal("b".into()),
                Inst::Match,
            ]
        );
    }

    #[test]
    fn test_follow_resolution() {
        let pattern = compile("set %objects% to %objects%").unwrap();
        assert_eq!(
            pattern.program.get(1),
            Some(&Inst::Placeholder {
                index: 0,
                follow: Follow::Literal(" to ".into())
            })
        );
        assert_eq!(
            pattern.program.get(3),
            Some(&Inst::Placeholder {
                index: 1,
                follow: Follow::End
            })
        );
    }
}
