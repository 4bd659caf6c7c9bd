//! Cancellation and timeouts

#![allow(clippy::unwrap_used)]

use sitter::{ParseError, Parser};

use crate::helpers::grammars::{arithmetic, statements};

fn long_program(statements: usize) -> String {
    (0..statements).map(|index| format!("x = {index};\n")).collect()
}

#[test]
fn test_cancelled_parse_fails_before_consuming_input() {
    let mut parser = Parser::with_language(statements());
    let handle = parser.cancellation_handle();
    handle.cancel();
    assert_eq!(parser.parse("a = 1;", None).unwrap_err(), ParseError::Cancelled);
    assert_eq!(parser.parse("a = 1;", None).unwrap_err(), ParseError::Cancelled);

    handle.reset();
    let tree = parser.parse("a = 1;", None).unwrap();
    assert!(!tree.root_node().has_error());
}

#[test]
fn test_cancellation_from_another_thread() {
    let mut parser = Parser::with_language(statements());
    let handle = parser.cancellation_handle();
    std::thread::spawn(move || handle.cancel()).join().unwrap();
    assert_eq!(parser.parse(long_program(10), None).unwrap_err(), ParseError::Cancelled);
    parser.reset_cancellation();
    assert!(parser.parse(long_program(10), None).is_ok());
}

#[test]
fn test_timeout_aborts_long_parse() {
    let mut parser = Parser::with_language(statements());
    parser.set_timeout(1);
    assert_eq!(parser.timeout_micros(), 1);
    let text = long_program(5_000);
    assert_eq!(parser.parse(&text, None).unwrap_err(), ParseError::TimedOut);

    parser.set_timeout(0);
    let tree = parser.parse(&text, None).unwrap();
    assert_eq!(tree.root_node().named_child_count(), 5_000);
}

#[test]
fn test_parser_is_reusable_after_abort() {
    let mut parser = Parser::with_language(arithmetic());
    parser.cancel();
    assert!(parser.parse("1 + 2", None).is_err());
    parser.reset_cancellation();
    parser.reset();
    let tree = parser.parse("1 + 2", None).unwrap();
    assert_eq!(
        tree.to_sexp(),
        "(expression (sum (expression (number)) (expression (number))))"
    );
}
