//! Property tests: incremental reparses agree with fresh parses, and every
//! tree covers its input exactly.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use sitter::{Language, Parser};

use crate::helpers::grammars::{ab, arithmetic, statements};
use crate::helpers::tree_assertions::{
    assert_matches_fresh_parse, assert_total_coverage, edit_and_reparse, leaf_text,
};

/// Well-formed sums and products, e.g. `12 + 3 * 4`
fn arithmetic_text() -> impl Strategy<Value = String> {
    (
        0u32..100,
        prop::collection::vec((prop::bool::ANY, 0u32..100), 0..6),
    )
        .prop_map(|(first, rest)| {
            let mut text = first.to_string();
            for (plus, number) in rest {
                text.push_str(if plus { " + " } else { " * " });
                text.push_str(&number.to_string());
            }
            text
        })
}

/// Well-formed assignment lists
fn statements_text() -> impl Strategy<Value = String> {
    prop::collection::vec(("[a-z]{1,3}", 0u32..1000), 0..6).prop_map(|lines| {
        lines
            .into_iter()
            .map(|(name, value)| format!("{name} = {value};\n"))
            .collect()
    })
}

/// A text plus an edit `(start, old_end, replacement)` inside it
fn with_edit(
    text: impl Strategy<Value = String>,
    replacement: &'static str,
) -> impl Strategy<Value = (String, usize, usize, String)> {
    text.prop_flat_map(move |text| {
        let len = text.len();
        (Just(text), 0..=len, 0..=len, replacement).prop_map(|(text, a, b, replacement)| {
            (text, a.min(b), a.max(b), replacement)
        })
    })
}

fn check_edit(language: Language, old_text: &str, start: usize, old_end: usize, replacement: &str) {
    let mut parser = Parser::with_language(language);
    let tree = parser.parse(old_text, None).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, old_text, &tree, start, old_end, replacement);
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
    assert_total_coverage(&reparsed, text.as_bytes());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ab_reparse_matches_fresh((text, start, old_end, replacement) in with_edit("[ab]{0,8}", "[ab]{0,3}")) {
        check_edit(ab(), &text, start, old_end, &replacement);
    }

    #[test]
    fn prop_arithmetic_reparse_matches_fresh(
        (text, start, old_end, replacement) in with_edit(arithmetic_text(), "([0-9]{1,2}|( [+*] [0-9]))?")
    ) {
        check_edit(arithmetic(), &text, start, old_end, &replacement);
    }

    #[test]
    fn prop_statements_reparse_matches_fresh(
        (text, start, old_end, replacement) in with_edit(statements_text(), "[a-z0-9 =;\n]{0,6}")
    ) {
        check_edit(statements(), &text, start, old_end, &replacement);
    }

    #[test]
    fn prop_leaves_reconstruct_input(text in "[a-z0-9 =;\n?]{0,40}") {
        let mut parser = Parser::with_language(statements());
        let tree = parser.parse(&text, None).unwrap();
        prop_assert_eq!(leaf_text(&tree, text.as_bytes()), text.as_bytes());
        assert_total_coverage(&tree, text.as_bytes());
    }

    #[test]
    fn prop_parse_is_idempotent(text in "[0-9 +*()]{0,24}") {
        let mut parser = Parser::with_language(arithmetic());
        let first = parser.parse(&text, None).unwrap();
        let second = parser.parse(&text, None).unwrap();
        prop_assert_eq!(first.to_sexp(), second.to_sexp());
        prop_assert!(first == second);
    }

    #[test]
    fn prop_valid_programs_have_no_errors(text in statements_text()) {
        let mut parser = Parser::with_language(statements());
        let tree = parser.parse(&text, None).unwrap();
        prop_assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
        prop_assert_eq!(tree.root_node().named_child_count(), text.matches(';').count());
    }
}
