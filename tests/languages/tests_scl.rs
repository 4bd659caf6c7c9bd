//! Bundled SCL grammar

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::Parser;
use sitter::languages::scl;

use crate::helpers::tree_assertions::{
    assert_matches_fresh_parse, assert_total_coverage, edit_and_reparse, find_all,
};

const PROGRAM: &str = r#"type Account {
  id: int;
  owner: string;
  balance: int;
}

context Bank { limit: int; history: List[int]; }

/* opening an account */
state Open uses Bank, Audit {
  use context Bank;
  use type Account;
  use state "ledger.scl"::Ledger { total: int; }
  precondition { balance >= 0 /\ ~(balance > limit); }
  let fee: int = 2 * limit;
  select acct: Account from Account where id = 1 limit 1;
  foreach a: Account in accounts {
    update Account set balance = balance - fee where id = a.id;
  }
  insert into Account (id, balance) values (2, 0);
  delete from Account where balance < 0;
  assert fee != 0; // never free
  commit;
  next {
    when balance > limit => Frozen { export reason: string; }
    otherwise => Open
  }
}
"#;

fn parser() -> Parser {
    Parser::new(scl::language_handle()).unwrap()
}

fn count(tree: &sitter::Tree, kind: &str) -> usize {
    find_all(tree.root_node(), &|node| node.kind() == kind).len()
}

#[test]
fn test_full_program_parses_cleanly() {
    let mut parser = parser();
    let tree = parser.parse(PROGRAM, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
    assert_total_coverage(&tree, PROGRAM.as_bytes());

    for (kind, expected) in [
        ("type_field", 3),
        ("context_field", 2),
        ("use_stmt", 3),
        ("let_stmt", 1),
        ("select_stmt", 1),
        ("foreach_stmt", 1),
        ("update_stmt", 1),
        ("insert_stmt", 1),
        ("delete_stmt", 1),
        ("assert_stmt", 1),
        ("commit_stmt", 1),
        ("next_case", 2),
        ("edge_export_block", 1),
        ("tla_binary_expr", 1),
        ("tla_unary_expr", 1),
        ("generic_type", 1),
        ("comment", 2),
    ] {
        assert_eq!(count(&tree, kind), expected, "{kind}");
    }
}

#[test]
fn test_fields_name_the_parts() {
    let mut parser = parser();
    let tree = parser.parse(PROGRAM, None).unwrap();
    let source = PROGRAM.as_bytes();

    let state = find_all(tree.root_node(), &|node| node.kind() == "state_decl")[0];
    assert_eq!(state.child_by_field_name("name").unwrap().utf8_text(source), Ok("Open"));

    let targets: Vec<&str> = find_all(tree.root_node(), &|node| node.kind() == "next_case")
        .iter()
        .map(|case| case.child_by_field_name("target").unwrap().utf8_text(source).unwrap())
        .collect();
    assert_eq!(targets, ["Frozen", "Open"]);

    let foreach = find_all(tree.root_node(), &|node| node.kind() == "foreach_stmt")[0];
    assert_eq!(foreach.child_by_field_name("collection").unwrap().utf8_text(source), Ok("accounts"));
    assert_eq!(foreach.child_by_field_name("item_type").unwrap().kind(), "type");
}

#[rstest]
#[case::sub_is_left_associative(
    "a - b - c",
    "(binary_expr (expr (binary_expr (expr (identifier)) (expr (identifier)))) (expr (identifier)))"
)]
#[case::comparison_below_addition(
    "a < b + 1",
    "(binary_expr (expr (identifier)) (expr (binary_expr (expr (identifier)) (expr (literal (number))))))"
)]
fn test_expression_shapes(#[case] expression: &str, #[case] expected: &str) {
    let mut parser = parser();
    let text = format!("state S uses C {{ assert {expression}; next {{ otherwise => S }} }}");
    let tree = parser.parse(&text, None).unwrap();
    assert!(!tree.root_node().has_error(), "{}", tree.to_sexp());
    let assert_stmt = find_all(tree.root_node(), &|node| node.kind() == "assert_stmt")[0];
    assert_eq!(assert_stmt.named_child(0).unwrap().named_child(0).unwrap().to_sexp(), expected);
}

#[test]
fn test_state_without_next_block_is_an_error() {
    let mut parser = parser();
    let text = "state S uses C { commit; }";
    let tree = parser.parse(text, None).unwrap();
    assert!(tree.root_node().has_error());
    assert!(!tree.errors().is_empty());
    assert_total_coverage(&tree, text.as_bytes());
}

#[rstest]
#[case::change_literal("2 * limit", "3 * limit")]
#[case::rename_target("=> Frozen", "=> Closed")]
#[case::drop_statement("  commit;\n", "")]
#[case::break_statement("delete from", "delete frm")]
fn test_edits_match_fresh_parse(#[case] before: &str, #[case] after: &str) {
    let mut parser = parser();
    let tree = parser.parse(PROGRAM, None).unwrap();
    let start = PROGRAM.find(before).unwrap();
    let (text, reparsed) = edit_and_reparse(&mut parser, PROGRAM, &tree, start, start + before.len(), after);
    assert_matches_fresh_parse(&mut parser, &text, &reparsed);
    assert_total_coverage(&reparsed, text.as_bytes());
}
