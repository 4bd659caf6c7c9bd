//! Bundled PlantUML activity diagram grammar

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::Parser;
use sitter::languages::activity_diagram;

use crate::helpers::tree_assertions::{
    assert_matches_fresh_parse, assert_total_coverage, edit_and_reparse, find_all,
};

const DIAGRAM: &str = "@startuml
start
title Order flow;
:receive order;
if (in stock?) then (yes)
  :ship;
elseif (backorder?) then (yes)
  :wait;
else (no)
  :cancel;
endif
while (more items?)
  :pack item;
endwhile
repeat
  :retry payment;
repeatwhile (declined)
stop
@enduml
";

fn parser() -> Parser {
    Parser::new(activity_diagram::language_handle()).unwrap()
}

#[test]
fn test_full_diagram_parses_cleanly() {
    let mut parser = parser();
    let tree = parser.parse(DIAGRAM, None).unwrap();
    let root = tree.root_node();
    assert_eq!(root.kind(), "document");
    assert!(!root.has_error(), "{}", tree.to_sexp());
    assert_total_coverage(&tree, DIAGRAM.as_bytes());

    for kind in ["if_statement", "elseif_condition", "else_condition", "while_statement", "repeat_statement"] {
        assert_eq!(find_all(root, &|node| node.kind() == kind).len(), 1, "{kind}");
    }
    let actions = find_all(root, &|node| node.kind() == "action_statement");
    assert_eq!(actions.len(), 6);
    let first = actions[0].child_by_field_name("action").unwrap();
    assert_eq!(first.utf8_text(DIAGRAM.as_bytes()), Ok("receive order"));
}

#[rstest]
#[case::switch("switch (kind)\ncase (a)\n  :one;\ncase (b)\n  :two;\nendswitch\n", "switch_statement")]
#[case::partition("partition {\n  :init;\n}\n", "group_statement")]
#[case::note("note right\nremember this\nend note\n", "note_statement")]
#[case::arrow("-> :next;\n", "arrow")]
#[case::goto("goto retry;\n", "goto_statement")]
#[case::pragma("!pragma layout = smetana\n", "pragma")]
#[case::common_words(":read input;\n", "action_statement")]
fn test_statement_forms(#[case] text: &str, #[case] kind: &str) {
    let mut parser = parser();
    let tree = parser.parse(text, None).unwrap();
    let root = tree.root_node();
    assert!(!root.has_error(), "{}", tree.to_sexp());
    assert_eq!(find_all(root, &|node| node.kind() == kind).len(), 1, "{}", tree.to_sexp());
}

#[test]
fn test_action_words_lex_as_text() {
    let mut parser = parser();
    let text = "start\n:read input;\n:draw red line;\nstop\n";
    let tree = parser.parse(text, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
    let words: Vec<&str> = find_all(tree.root_node(), &|node| node.kind() == "text_word")
        .iter()
        .map(|word| word.utf8_text(text.as_bytes()).unwrap())
        .collect();
    assert_eq!(words, ["read", "input", "draw", "red", "line"]);
}

#[test]
fn test_leaf_kinds_name_their_rule() {
    let mut parser = parser();
    let tree = parser.parse(DIAGRAM, None).unwrap();
    for leaf in tree.root_node().leaves() {
        assert!(!leaf.kind().contains("_token"), "{}", leaf.kind());
    }
}

#[test]
fn test_switch_has_one_clause_per_case() {
    let mut parser = parser();
    let text = "switch (kind)\ncase (a)\n  :one;\ncase (b)\n  :two;\nendswitch\n";
    let tree = parser.parse(text, None).unwrap();
    let clauses = find_all(tree.root_node(), &|node| node.kind() == "case_clause");
    assert_eq!(clauses.len(), 2);
    let condition = clauses[1].child_by_field_name("expression").unwrap();
    assert_eq!(condition.utf8_text(text.as_bytes()), Ok("b"));
}

#[test]
fn test_missing_endif_is_reported() {
    let mut parser = parser();
    let text = "if (x) then\n  :a;\n";
    let tree = parser.parse(text, None).unwrap();
    assert!(tree.root_node().has_error(), "{}", tree.to_sexp());
    assert!(!tree.errors().is_empty());
    assert_total_coverage(&tree, text.as_bytes());
}

#[rstest]
#[case::rename_action(35, 42, "accept")]
#[case::add_action(85, 85, "  :log;\n")]
#[case::drop_endwhile(186, 195, "")]
fn test_edits_match_fresh_parse(#[case] start: usize, #[case] old_end: usize, #[case] replacement: &str) {
    let mut parser = parser();
    let tree = parser.parse(DIAGRAM, None).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, DIAGRAM, &tree, start, old_end, replacement);
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
    assert_total_coverage(&reparsed, text.as_bytes());
}
