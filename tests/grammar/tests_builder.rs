//! Grammar compilation through the public builder

#![allow(clippy::unwrap_used)]

use rstest::rstest;
use sitter::generate::{
    GrammarBuilder, alias, choice, field, optional, pattern, prec, repeat, seq, string, sym, token,
};
use sitter::{GrammarError, Parser, TokenConflictPolicy};

#[rstest]
#[case::longest_match(TokenConflictPolicy::LongestMatch, vec!["word"])]
#[case::precedence_first(TokenConflictPolicy::PrecedenceFirst, vec!["letter", "letter"])]
fn test_token_conflict_policy(#[case] policy: TokenConflictPolicy, #[case] expected: Vec<&str>) {
    let language = GrammarBuilder::new("letters")
        .token_conflict_policy(policy)
        .rule("document", repeat(sym("_item")))
        .rule("_item", choice([sym("letter"), sym("word")]))
        .rule("letter", token(prec(1, pattern("[a-z]"))))
        .rule("word", pattern("[a-z]+"))
        .build()
        .unwrap();
    assert_eq!(language.token_conflict_policy(), policy);

    let tree = Parser::with_language(language).parse("ab", None).unwrap();
    let kinds: Vec<&str> = tree.root_node().named_children().iter().map(|node| node.kind()).collect();
    assert_eq!(kinds, expected);
}

#[test]
fn test_redefining_a_rule_replaces_it() {
    let language = GrammarBuilder::new("letters")
        .rule("document", repeat(sym("_item")))
        .rule("_item", sym("letter"))
        .rule("_item", seq([sym("letter"), sym("letter")]))
        .rule("letter", pattern("[a-z]"))
        .build()
        .unwrap();
    let mut parser = Parser::with_language(language);
    assert!(!parser.parse("xy", None).unwrap().root_node().has_error());
    assert!(parser.parse("xyz", None).unwrap().root_node().has_error());
}

#[test]
fn test_keywords_are_lexed_through_the_word_token() {
    let language = GrammarBuilder::new("keywords")
        .extra(pattern(r"\s"))
        .word("identifier")
        .rule("program", repeat(sym("_statement")))
        .rule("_statement", choice([sym("let_statement"), sym("call")]))
        .rule(
            "let_statement",
            seq([string("let"), field("name", sym("identifier")), string(";")]),
        )
        .rule("call", seq([field("callee", sym("identifier")), string(";")]))
        .rule("identifier", pattern("[a-z]+"))
        .build()
        .unwrap();
    let text = "let lettuce; letter; let let;";
    let tree = Parser::with_language(language).parse(text, None).unwrap();
    let root = tree.root_node();
    let kinds: Vec<&str> = root.named_children().iter().map(|node| node.kind()).collect();
    assert_eq!(kinds, vec!["let_statement", "call", "let_statement"]);
    let first = root.named_child(0).unwrap();
    let name = first.child_by_field_name("name").unwrap();
    assert_eq!(name.utf8_text(text.as_bytes()), Ok("lettuce"));
    assert!(!root.has_error(), "{}", tree.to_sexp());
}

#[test]
fn test_aliases_and_optional_children() {
    let language = GrammarBuilder::new("aliases")
        .rule(
            "pair",
            seq([
                alias(sym("word"), "key", true),
                optional(seq([string(":"), alias(sym("word"), "value", true)])),
            ]),
        )
        .rule("word", pattern("[a-z]+"))
        .build()
        .unwrap();
    let mut parser = Parser::with_language(language);
    assert_eq!(parser.parse("a:b", None).unwrap().to_sexp(), "(pair (key) (value))");
    assert_eq!(parser.parse("a", None).unwrap().to_sexp(), "(pair (key))");
}

#[test]
fn test_language_lookups() {
    let language = GrammarBuilder::new("lookups")
        .rule("pair", seq([field("key", sym("word")), string("="), sym("word")]))
        .rule("word", pattern("[a-z]+"))
        .build()
        .unwrap();
    let word = language.symbol_for_name("word", true).unwrap();
    assert_eq!(language.symbol_name(word), Some("word"));
    assert!(language.is_named(word));
    let equals = language.symbol_for_name("=", false).unwrap();
    assert!(!language.is_named(equals));
    let key = language.field_id_for_name("key").unwrap();
    assert_eq!(language.field_name_for_id(key), Some("key"));
    assert_eq!(language.field_id_for_name("value"), None);
}

#[test]
fn test_empty_grammar_is_rejected() {
    assert!(matches!(GrammarBuilder::new("empty").build(), Err(GrammarError::Empty)));
}

#[test]
fn test_undefined_symbol_is_rejected() {
    let result = GrammarBuilder::new("broken")
        .rule("start", seq([sym("missing"), string(";")]))
        .build();
    match result {
        Err(GrammarError::UndefinedSymbol { name, rule }) => {
            assert_eq!(name, "missing");
            assert_eq!(rule, "start");
        }
        other => panic!("expected UndefinedSymbol, got {other:?}"),
    }
}

#[test]
fn test_empty_token_is_rejected() {
    let result = GrammarBuilder::new("broken")
        .rule("start", repeat(sym("blank")))
        .rule("blank", pattern("a*"))
        .build();
    assert!(matches!(result, Err(GrammarError::EmptyToken(_))), "{result:?}");
}
