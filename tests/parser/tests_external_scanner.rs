//! Grammars with an external scanner

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::Parser;

use crate::helpers::grammars::{fenced, fenced_handle};
use crate::helpers::tree_assertions::{assert_matches_fresh_parse, assert_total_coverage, edit_and_reparse};

fn named_kinds(tree: &sitter::Tree) -> Vec<String> {
    tree.root_node()
        .named_children()
        .iter()
        .map(|node| node.kind().to_string())
        .collect()
}

#[test]
fn test_closing_fence_must_match_opening_run() {
    let mut parser = Parser::with_language(fenced());
    let text = "hi ```` x ``` y ```` bye";
    let tree = parser.parse(text, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
    assert_eq!(named_kinds(&tree), ["word", "code_block", "word"]);

    let block = tree.root_node().named_child(1).unwrap();
    assert_eq!(block.byte_range(), 3..20);
    let content = block.named_children()[1];
    assert_eq!(content.kind(), "fence_content");
    assert_eq!(content.utf8_text(text.as_bytes()).unwrap(), " x ``` y ");
    assert_total_coverage(&tree, text.as_bytes());
}

#[rstest]
#[case("```a```", 1)]
#[case("``` one ``` ``` two ```", 2)]
#[case("```` ``` ````", 1)]
fn test_fence_counts(#[case] text: &str, #[case] blocks: usize) {
    let mut parser = Parser::with_language(fenced());
    let tree = parser.parse(text, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
    assert_eq!(tree.root_node().named_child_count(), blocks);
}

#[test]
fn test_scanner_attached_to_loaded_artifact() {
    let mut parser = Parser::new(fenced_handle()).unwrap();
    let text = "a ``` b ``` c";
    let tree = parser.parse(text, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
    assert_eq!(named_kinds(&tree), ["word", "code_block", "word"]);

    let mut direct = Parser::with_language(fenced());
    assert_eq!(direct.parse(text, None).unwrap().to_sexp(), tree.to_sexp());
}

#[test]
fn test_unterminated_fence_is_an_error() {
    let mut parser = Parser::with_language(fenced());
    let text = "hi ```` never closed";
    let tree = parser.parse(text, None).unwrap();
    assert!(tree.root_node().has_error());
    assert_total_coverage(&tree, text.as_bytes());
}

#[rstest]
#[case::inside_content(8, 9, "xyz")]
#[case::shorten_closing_fence(16, 17, "")]
#[case::lengthen_opening_fence(3, 3, "`")]
#[case::after_block(21, 24, "end")]
fn test_edits_match_fresh_parse(#[case] start: usize, #[case] old_end: usize, #[case] replacement: &str) {
    let mut parser = Parser::with_language(fenced());
    let old_text = "hi ```` x ``` y ```` bye";
    let tree = parser.parse(old_text, None).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, old_text, &tree, start, old_end, replacement);
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
    assert_total_coverage(&reparsed, text.as_bytes());
}
