//! GLR forking on grammars with unresolved conflicts

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::Parser;

use crate::helpers::grammars::{ambiguous_sum, arithmetic};
use crate::helpers::tree_assertions::{assert_matches_fresh_parse, assert_total_coverage, edit_and_reparse};

#[test]
fn test_ambiguous_input_picks_one_tree() {
    let mut parser = Parser::with_language(ambiguous_sum());
    let text = "1+2+3";
    let tree = parser.parse(text, None).unwrap();
    let root = tree.root_node();
    assert!(!root.has_error(), "{}", tree.to_sexp());
    assert!(root.is_ambiguous());
    assert_eq!(root.kind(), "sum");
    assert_eq!(root.child_count(), 3);
    assert_total_coverage(&tree, text.as_bytes());
}

#[test]
fn test_ambiguous_choice_is_deterministic() {
    let mut parser = Parser::with_language(ambiguous_sum());
    let first = parser.parse("1+2+3+4", None).unwrap();
    for _ in 0..5 {
        let again = parser.parse("1+2+3+4", None).unwrap();
        assert_eq!(again, first);
    }
}

#[rstest]
#[case("1")]
#[case("1+2")]
fn test_unambiguous_inputs_are_not_marked(#[case] text: &str) {
    let mut parser = Parser::with_language(ambiguous_sum());
    let tree = parser.parse(text, None).unwrap();
    assert!(!tree.root_node().has_error());
    assert!(!tree.root_node().is_ambiguous(), "{}", tree.to_sexp());
}

#[test]
fn test_declared_precedence_avoids_ambiguity() {
    let mut parser = Parser::with_language(arithmetic());
    let tree = parser.parse("1 + 2 + 3 * 4", None).unwrap();
    assert!(!tree.root_node().is_ambiguous());
}

#[test]
fn test_ambiguous_reparse_matches_fresh_parse() {
    let mut parser = Parser::with_language(ambiguous_sum());
    let old_text = "1+2+3";
    let tree = parser.parse(old_text, None).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, old_text, &tree, 3, 3, "+9");
    assert_eq!(text, "1+2+9+3");
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
}
