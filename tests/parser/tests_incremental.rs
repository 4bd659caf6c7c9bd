//! Incremental reparsing: equivalence with fresh parses and subtree reuse

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::{InputEdit, Parser};

use crate::helpers::grammars::{ab, arithmetic, statements};
use crate::helpers::tree_assertions::{
    assert_matches_fresh_parse, assert_total_coverage, edit_and_reparse, find_all,
};

#[test]
fn test_ab_scenario_insert_b() {
    let mut parser = Parser::with_language(ab());
    let tree = parser.parse("abb", None).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, "abb", &tree, 1, 1, "b");
    assert_eq!(text, "abbb");
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
    let ranges: Vec<_> = reparsed.root_node().leaves().iter().map(|leaf| leaf.byte_range()).collect();
    assert_eq!(ranges, vec![0..1, 1..2, 2..3, 3..4]);
}

#[test]
fn test_old_tree_is_not_mutated() {
    let mut parser = Parser::with_language(ab());
    let tree = parser.parse("abb", None).unwrap();
    let before = tree.to_sexp();
    let edited = tree.edit(&InputEdit::from_change(b"abb", 1, 2, b""));
    let _ = parser.parse("ab", Some(&edited)).unwrap();
    assert_eq!(tree.to_sexp(), before);
    assert_eq!(tree.len(), 3);
    assert!(!tree.root_node().has_changes());
}

#[test]
fn test_unchanged_statements_are_reused() {
    let mut parser = Parser::with_language(statements());
    let old_text = "a = 1;\nb = 2;\nc = 3;\n";
    let tree = parser.parse(old_text, None).unwrap();
    let old_ids: Vec<usize> = tree.root_node().named_children().iter().map(|node| node.id()).collect();

    // "2" -> "22"
    let (text, reparsed) = edit_and_reparse(&mut parser, old_text, &tree, 11, 12, "22");
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);

    let new_ids: Vec<usize> = reparsed.root_node().named_children().iter().map(|node| node.id()).collect();
    assert_eq!(new_ids.len(), 3);
    assert_eq!(new_ids[0], old_ids[0], "first statement should be reused");
    assert_ne!(new_ids[1], old_ids[1], "edited statement must be rebuilt");
    assert_eq!(new_ids[2], old_ids[2], "last statement should be reused");
    assert_eq!(
        reparsed.root_node().named_child(2).unwrap().byte_range(),
        15..21
    );
}

#[test]
fn test_statements_after_an_edit_are_reused() {
    let mut parser = Parser::with_language(statements());
    let old_text = "a = 1;\nb = 2;\nc = 3;\nd = 4;\n";
    let tree = parser.parse(old_text, None).unwrap();
    let old_ids: Vec<usize> = tree.root_node().named_children().iter().map(|node| node.id()).collect();

    // "a" -> "ab"
    let (text, reparsed) = edit_and_reparse(&mut parser, old_text, &tree, 0, 1, "ab");
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
    let new_ids: Vec<usize> = reparsed.root_node().named_children().iter().map(|node| node.id()).collect();
    assert_ne!(new_ids[0], old_ids[0]);
    assert_eq!(new_ids[1..], old_ids[1..]);
}

#[test]
fn test_fresh_parse_shares_nothing() {
    let mut parser = Parser::with_language(statements());
    let text = "a = 1;\nb = 2;";
    let first = parser.parse(text, None).unwrap();
    let second = parser.parse(text, None).unwrap();
    assert_ne!(
        first.root_node().named_child(0).unwrap().id(),
        second.root_node().named_child(0).unwrap().id()
    );
}

#[rstest]
#[case::insert_digit(4, 4, "0")]
#[case::delete_operator(2, 3, "")]
#[case::replace_operator(2, 3, "*")]
#[case::wrap_in_parens(0, 0, "(")]
#[case::append_term(9, 9, " + 7")]
#[case::replace_everything(0, 9, "8*8")]
#[case::delete_everything(0, 9, "")]
fn test_single_edit_matches_fresh_parse(#[case] start: usize, #[case] old_end: usize, #[case] replacement: &str) {
    let mut parser = Parser::with_language(arithmetic());
    let old_text = "1 + 2 * 3";
    let tree = parser.parse(old_text, None).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, old_text, &tree, start, old_end, replacement);
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
    assert_total_coverage(&reparsed, text.as_bytes());
}

#[test]
fn test_replaced_operator_keeps_leaf_positions() {
    let mut parser = Parser::with_language(arithmetic());
    let old_text = "1 + 2 * 3";
    let tree = parser.parse(old_text, None).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, old_text, &tree, 2, 3, "*");
    assert_eq!(text, "1 * 2 * 3");
    let leaves: Vec<(String, std::ops::Range<usize>)> = reparsed
        .root_node()
        .leaves()
        .iter()
        .filter(|leaf| !leaf.is_extra())
        .map(|leaf| (leaf.kind().to_string(), leaf.byte_range()))
        .collect();
    let expected = [("number", 0..1), ("*", 2..3), ("number", 4..5), ("*", 6..7), ("number", 8..9)];
    let expected: Vec<(String, std::ops::Range<usize>)> =
        expected.into_iter().map(|(kind, range)| (kind.to_string(), range)).collect();
    assert_eq!(leaves, expected);
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
}

#[test]
fn test_sequential_edits_match_fresh_parse() {
    let mut parser = Parser::with_language(arithmetic());
    let mut text = String::from("1 + 2");
    let mut tree = parser.parse(&text, None).unwrap();

    let edits: [(usize, usize, &str); 6] = [
        (5, 5, " * 3"),
        (0, 0, "("),
        (2, 2, " + 4)"),
        (1, 2, "10"),
        (4, 9, ""),
        (0, 1, ""),
    ];
    for (start, old_end, replacement) in edits {
        let (next_text, next_tree) = edit_and_reparse(&mut parser, &text, &tree, start, old_end, replacement);
        assert_matches_fresh_parse(&mut parser, &next_text, &next_tree);
        text = next_text;
        tree = next_tree;
    }
}

#[test]
fn test_edit_that_introduces_and_removes_an_error() {
    let mut parser = Parser::with_language(statements());
    let old_text = "a = 1;\nb = 2;\n";
    let tree = parser.parse(old_text, None).unwrap();

    let (broken_text, broken) = edit_and_reparse(&mut parser, old_text, &tree, 5, 6, "");
    assert!(broken.root_node().has_error());
    assert_matches_fresh_parse(&mut parser, &broken_text, &broken);

    let (fixed_text, fixed) = edit_and_reparse(&mut parser, &broken_text, &broken, 5, 5, ";");
    assert_eq!(fixed_text, old_text);
    assert!(!fixed.root_node().has_error(), "{}", fixed.to_sexp());
    assert_matches_fresh_parse(&mut parser, &fixed_text, &fixed);
}

#[test]
fn test_edit_marks_changes_only_on_the_edited_path() {
    let mut parser = Parser::with_language(statements());
    let old_text = "a = 1;\nb = 2;\nc = 3;\n";
    let tree = parser.parse(old_text, None).unwrap();
    let edited = tree.edit(&InputEdit::from_change(old_text.as_bytes(), 11, 12, b"22"));
    let changed = find_all(edited.root_node(), &|node| node.has_changes());
    assert!(changed.iter().any(|node| node.kind() == "statement"));
    let statements = edited.root_node().named_children();
    assert!(!statements[0].has_changes());
    assert!(statements[1].has_changes());
    assert!(!statements[2].has_changes());
    assert_eq!(statements[2].byte_range(), 15..21);
}

#[test]
fn test_changed_included_ranges_disable_reuse() {
    let mut parser = Parser::with_language(statements());
    let text = "a = 1;\nb = 2;\n";
    let tree = parser.parse(text, None).unwrap();
    let old_first = tree.root_node().named_child(0).unwrap().id();

    let whole = sitter::Range::whole(text.as_bytes());
    parser.set_included_ranges(&[whole]).unwrap();
    let edited = tree.edit(&InputEdit::from_change(text.as_bytes(), 14, 14, b""));
    let reparsed = parser.parse(text, Some(&edited)).unwrap();
    assert_ne!(reparsed.root_node().named_child(0).unwrap().id(), old_first);
    assert_eq!(reparsed.to_sexp(), tree.to_sexp());
}
