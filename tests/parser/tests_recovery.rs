//! Error recovery shapes: MISSING tokens, skipped input, ERROR roots

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::{ErrorCode, Parser};

use crate::helpers::grammars::{ab, arithmetic, statements};
use crate::helpers::tree_assertions::{assert_total_coverage, find_all};

#[test]
fn test_missing_semicolon_is_inserted() {
    let mut parser = Parser::with_language(statements());
    let text = "a = 1\nb = 2;";
    let tree = parser.parse(text, None).unwrap();
    let root = tree.root_node();
    assert!(root.has_error());

    let missing = find_all(root, &|node| node.is_missing());
    assert_eq!(missing.len(), 1, "{}", tree.to_sexp());
    assert_eq!(missing[0].kind(), ";");
    assert!(missing[0].byte_range().is_empty());
    assert!((5..=6).contains(&missing[0].start_byte()));

    let statements = find_all(root, &|node| node.kind() == "statement");
    assert_eq!(statements.len(), 2, "{}", tree.to_sexp());
    assert!(tree.to_sexp().contains("(MISSING \";\")"));
    assert_total_coverage(&tree, text.as_bytes());
}

#[test]
fn test_unknown_characters_are_skipped() {
    let mut parser = Parser::with_language(statements());
    let text = "a = 1; ? b = 2;";
    let tree = parser.parse(text, None).unwrap();
    let root = tree.root_node();
    assert!(root.has_error());

    let errors = find_all(root, &|node| node.is_error());
    assert_eq!(errors.len(), 1, "{}", tree.to_sexp());
    assert_eq!(errors[0].byte_range(), 7..8);
    let statements = find_all(root, &|node| node.kind() == "statement");
    assert_eq!(statements.len(), 2, "{}", tree.to_sexp());
    assert_total_coverage(&tree, text.as_bytes());
}

#[test]
fn test_out_of_place_token_is_recovered() {
    let mut parser = Parser::with_language(ab());
    let text = "abab";
    let tree = parser.parse(text, None).unwrap();
    assert!(tree.root_node().has_error());
    let errors = find_all(tree.root_node(), &|node| node.is_error() || node.is_missing());
    assert!(!errors.is_empty(), "{}", tree.to_sexp());
    assert_total_coverage(&tree, text.as_bytes());
}

#[test]
fn test_missing_leading_token_is_inserted() {
    let mut parser = Parser::with_language(ab());
    let text = "bbb";
    let tree = parser.parse(text, None).unwrap();
    let root = tree.root_node();
    assert!(root.has_error());
    let missing = find_all(root, &|node| node.is_missing());
    assert_eq!(missing.len(), 1, "{}", tree.to_sexp());
    assert_eq!(missing[0].kind(), "a");
    assert_eq!(missing[0].byte_range(), 0..0);
    assert_eq!(root.byte_range(), 0..3);
    assert_total_coverage(&tree, text.as_bytes());
}

#[test]
fn test_input_without_any_reading_becomes_error_root() {
    let mut parser = Parser::with_language(ab());
    let tree = parser.parse("", None).unwrap();
    let root = tree.root_node();
    assert!(root.is_error(), "{}", tree.to_sexp());
    assert_eq!(root.byte_range(), 0..0);
    assert_eq!(root.child_count(), 0);
}

#[rstest]
#[case("1 +")]
#[case("+ 1")]
#[case("1 + * 2")]
#[case("((1)")]
#[case("1 2 3")]
#[case(")")]
#[case("1 + (2 * ) + 3")]
fn test_malformed_arithmetic_is_covered(#[case] text: &str) {
    let mut parser = Parser::with_language(arithmetic());
    let tree = parser.parse(text, None).unwrap();
    assert!(tree.root_node().has_error(), "{}", tree.to_sexp());
    assert_total_coverage(&tree, text.as_bytes());
    assert!(!tree.errors().is_empty());
}

#[test]
fn test_diagnostics_describe_missing_and_unexpected() {
    let mut parser = Parser::with_language(statements());
    let tree = parser.parse("a = 1\nb = 2; ?", None).unwrap();
    let errors = tree.errors();
    assert!(errors.len() >= 2, "{errors:?}");
    assert!(errors.windows(2).all(|pair| pair[0].range.start() <= pair[1].range.start()));
    assert!(errors.iter().any(|error| error.code == ErrorCode::E0101));
    assert!(errors.iter().all(|error| !error.format().is_empty()));
}
