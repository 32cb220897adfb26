//! Inputs rendered from a pattern match it, and the match segments
//! reproduce the input exactly.

use std::ops::Range;

use proptest::prelude::*;
use sk_patterns::{compile, MatchLimits, Placeholder, SegmentKind};

const WORDS: &[&str] = &["set", "to", "the", "all", "of", "loop", "wait"];
const VALUES: &[&str] = &["5", "{x}", "{_list::*}", "\"hi there\"", "1 minute"];

#[derive(Debug, Clone)]
enum Piece {
    Word(usize),
    Optional(usize),
    Choice(usize, usize),
    Capture,
}

/// A piece together with the way it is rendered in the input
#[derive(Debug, Clone)]
struct Rendered {
    piece: Piece,
    include: bool,
    pick_second: bool,
    value: usize,
}

fn piece() -> impl Strategy<Value = Piece> {
    let word = 0..WORDS.len();
    prop_oneof![
        word.clone().prop_map(Piece::Word),
        word.clone().prop_map(Piece::Optional),
        (word.clone(), word).prop_map(|(a, b)| Piece::Choice(a, b)),
        Just(Piece::Capture),
    ]
}

fn rendered() -> impl Strategy<Value = Rendered> {
    (piece(), any::<bool>(), any::<bool>(), 0..VALUES.len()).prop_map(
        |(piece, include, pick_second, value)| Rendered {
            piece,
            include,
            pick_second,
            value,
        },
    )
}

/// Captures are always separated by a required word
fn separate_captures(pieces: Vec<Rendered>) -> Vec<Rendered> {
    let mut out: Vec<Rendered> = Vec::new();
    for piece in pieces {
        let previous_capture = matches!(out.last().map(|r| &r.piece), Some(Piece::Capture));
        if previous_capture && matches!(piece.piece, Piece::Capture) {
            out.push(Rendered {
                piece: Piece::Word(0),
                include: true,
                pick_second: false,
                value: 0,
            });
        }
        out.push(piece);
    }
    out
}

fn pattern_source(pieces: &[Rendered]) -> String {
    pieces
        .iter()
        .map(|r| match r.piece {
            Piece::Word(w) => WORDS[w].to_string(),
            Piece::Optional(w) => format!("[{}]", WORDS[w]),
            Piece::Choice(a, b) => format!("({}|{})", WORDS[a], WORDS[b]),
            Piece::Capture => "%objects%".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn input(pieces: &[Rendered]) -> String {
    pieces
        .iter()
        .filter_map(|r| match r.piece {
            Piece::Word(w) => Some(WORDS[w]),
            Piece::Optional(w) => r.include.then_some(WORDS[w]),
            Piece::Choice(a, b) => Some(if r.pick_second { WORDS[b] } else { WORDS[a] }),
            Piece::Capture => Some(VALUES[r.value]),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn accept_all(_: &Placeholder, _: &str, _: Range<usize>) -> bool {
    true
}

proptest! {
    #[test]
    fn rendered_inputs_round_trip(pieces in prop::collection::vec(rendered(), 1..6)) {
        let pieces = separate_captures(pieces);
        let source = pattern_source(&pieces);
        let input = input(&pieces);
        prop_assume!(!input.is_empty());

        let pattern = compile(&source).unwrap();
        let result = pattern
            .match_input(&input, &mut accept_all, MatchLimits::default())
            .unwrap();

        let rebuilt: String = result
            .segments
            .iter()
            .map(|segment| &input[segment.span.clone()])
            .collect();
        prop_assert_eq!(&rebuilt, &input);

        let captures = result
            .segments
            .iter()
            .filter(|segment| matches!(segment.kind, SegmentKind::Placeholder(_)))
            .count();
        prop_assert_eq!(captures, pattern.placeholders().len());
    }

    #[test]
    fn compile_is_deterministic(pieces in prop::collection::vec(rendered(), 1..6)) {
        let source = pattern_source(&separate_captures(pieces));
        prop_assert_eq!(compile(&source).unwrap(), compile(&source).unwrap());
    }
}
