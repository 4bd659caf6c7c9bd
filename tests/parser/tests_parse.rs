//! From-scratch parses of well-formed input

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::{Parser, Point, Range};

use crate::helpers::grammars::{ab, arithmetic, statements};
use crate::helpers::tree_assertions::{assert_total_coverage, leaf_text};

#[test]
fn test_ab_scenario() {
    let mut parser = Parser::with_language(ab());
    let tree = parser.parse("abb", None).unwrap();
    let root = tree.root_node();
    assert_eq!(root.kind(), "s");
    let leaves: Vec<(std::ops::Range<usize>, &str)> = root
        .leaves()
        .iter()
        .map(|leaf| (leaf.byte_range(), leaf.kind()))
        .collect();
    assert_eq!(leaves, vec![(0..1, "a"), (1..2, "b"), (2..3, "b")]);
}

#[test]
fn test_sibling_navigation() {
    let mut parser = Parser::with_language(ab());
    let tree = parser.parse("abb", None).unwrap();
    let root = tree.root_node();
    let first = root.child(0).unwrap();
    let second = first.next_sibling().unwrap();
    assert_eq!((second.kind(), second.byte_range()), ("b", 1..2));
    assert_eq!(second.prev_sibling(), Some(first));
    assert_eq!(root.child(2).unwrap().next_sibling(), None);
    assert_eq!(second.prev_named_sibling(), None);
    assert_eq!(second.parent(), Some(root));
    assert_eq!(
        tree.language().symbol_for_name("s", true),
        Some(sitter::Symbol(root.kind_id()))
    );

    let mut parser = Parser::with_language(statements());
    let tree = parser.parse("a = 1;
b = 2;", None).unwrap();
    let statements = tree.root_node().named_children();
    assert_eq!(statements[0].next_named_sibling(), Some(statements[1]));
    assert_eq!(statements[1].prev_named_sibling(), Some(statements[0]));
}

#[rstest]
#[case("1", "(expression (number))")]
#[case(
    "1 + 2 * 3",
    "(expression (sum (expression (number)) (expression (product (expression (number)) (expression (number))))))"
)]
#[case(
    "1 * 2 + 3",
    "(expression (sum (expression (product (expression (number)) (expression (number)))) (expression (number))))"
)]
#[case(
    "1 + 2 + 3",
    "(expression (sum (expression (sum (expression (number)) (expression (number)))) (expression (number))))"
)]
#[case(
    "(1 + 2) * 3",
    "(expression (product (expression (parenthesized (expression (sum (expression (number)) (expression (number)))))) (expression (number))))"
)]
fn test_precedence_and_associativity(#[case] text: &str, #[case] expected: &str) {
    let mut parser = Parser::with_language(arithmetic());
    let tree = parser.parse(text, None).unwrap();
    assert_eq!(tree.to_sexp(), expected);
    assert!(!tree.root_node().has_error());
}

#[test]
fn test_empty_input_yields_empty_root() {
    let mut parser = Parser::with_language(statements());
    let tree = parser.parse("", None).unwrap();
    let root = tree.root_node();
    assert_eq!(root.byte_range(), 0..0);
    assert_eq!(root.child_count(), 0);
    assert!(tree.is_empty());
}

#[test]
fn test_whitespace_only_input_is_covered() {
    let mut parser = Parser::with_language(statements());
    let text = "  \n\t ";
    let tree = parser.parse(text, None).unwrap();
    assert_total_coverage(&tree, text.as_bytes());
    assert_eq!(tree.root_node().named_child_count(), 0);
}

#[test]
fn test_positions_track_rows_and_columns() {
    let mut parser = Parser::with_language(statements());
    let text = "a = 1;\n  bc = 22;\n";
    let tree = parser.parse(text, None).unwrap();
    let second = tree.root_node().named_child(1).unwrap();
    assert_eq!(second.kind(), "statement");
    assert_eq!(second.start_position(), Point::new(1, 2));
    assert_eq!(second.end_position(), Point::new(1, 10));
    assert_eq!(second.utf8_text(text.as_bytes()), Ok("bc = 22;"));
    assert_eq!(tree.root_node().end_position(), Point::new(2, 0));
}

#[test]
fn test_leaves_reconstruct_the_input() {
    let mut parser = Parser::with_language(arithmetic());
    let text = " 12 +\n(3*4) ";
    let tree = parser.parse(text, None).unwrap();
    assert_eq!(leaf_text(&tree, text.as_bytes()), text.as_bytes());
    assert_total_coverage(&tree, text.as_bytes());
}

#[test]
fn test_included_ranges_skip_foreign_text() {
    let mut parser = Parser::with_language(statements());
    let text = "a = 1; <<ignored>> b = 2;";
    let first = Range::new(0, 6, Point::new(0, 0), Point::new(0, 6));
    let second = Range::new(18, 25, Point::new(0, 18), Point::new(0, 25));
    parser.set_included_ranges(&[first, second]).unwrap();

    let tree = parser.parse(text, None).unwrap();
    let root = tree.root_node();
    assert!(!root.has_error(), "{}", tree.to_sexp());
    let statements: Vec<&str> = root
        .named_children()
        .iter()
        .map(|node| node.utf8_text(text.as_bytes()).unwrap())
        .collect();
    assert_eq!(statements, vec!["a = 1;", "b = 2;"]);
    assert_eq!(tree.included_ranges(), &[first, second]);
}

#[test]
fn test_parses_are_idempotent() {
    let mut parser = Parser::with_language(arithmetic());
    let text = "1 + 2 * (3 + 4) * 5";
    let first = parser.parse(text, None).unwrap();
    let second = parser.parse(text, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_sexp(), second.to_sexp());
}

#[test]
fn test_parsers_share_a_language_across_threads() {
    let language = arithmetic();
    let handles: Vec<_> = (0..4)
        .map(|index| {
            let language = language.clone();
            std::thread::spawn(move || {
                let text = format!("{index} + {index} * 2");
                let tree = Parser::with_language(language).parse(&text, None).unwrap();
                tree.to_sexp()
            })
        })
        .collect();
    let results: Vec<String> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}
