//! Small grammars exercising one engine feature each.

use once_cell::sync::Lazy;
use sitter::generate::{
    GrammarBuilder, choice, optional, pattern, prec_left, repeat, seq, string, sym,
};
use sitter::{ExternalScanner, Language, LanguageHandle, ScanCursor};

/// `s: "a" "b"*`
pub fn ab() -> Language {
    GrammarBuilder::new("ab")
        .rule("s", seq([string("a"), repeat(string("b"))]))
        .build()
        .unwrap()
}

/// Sums and products of numbers with the usual precedence
pub fn arithmetic() -> Language {
    GrammarBuilder::new("arithmetic")
        .extra(pattern(r"\s"))
        .rule(
            "expression",
            choice([
                sym("sum"),
                sym("product"),
                sym("number"),
                sym("parenthesized"),
            ]),
        )
        .rule(
            "sum",
            prec_left(1, seq([sym("expression"), string("+"), sym("expression")])),
        )
        .rule(
            "product",
            prec_left(2, seq([sym("expression"), string("*"), sym("expression")])),
        )
        .rule(
            "parenthesized",
            seq([string("("), sym("expression"), string(")")]),
        )
        .rule("number", pattern(r"\d+"))
        .build()
        .unwrap()
}

/// `sum: sum "+" sum | number` with no precedence declared
pub fn ambiguous_sum() -> Language {
    GrammarBuilder::new("ambiguous_sum")
        .rule(
            "sum",
            choice([seq([sym("sum"), string("+"), sym("sum")]), sym("number")]),
        )
        .rule("number", pattern("[0-9]+"))
        .build()
        .unwrap()
}

/// `name = 1;` assignments separated by whitespace
pub fn statements() -> Language {
    GrammarBuilder::new("statements")
        .extra(pattern(r"\s"))
        .rule("program", repeat(sym("statement")))
        .rule(
            "statement",
            seq([
                sym("identifier"),
                string("="),
                sym("number"),
                string(";"),
            ]),
        )
        .rule("identifier", pattern("[a-z]+"))
        .rule("number", pattern("[0-9]+"))
        .build()
        .unwrap()
}

// ===== Fenced blocks =====

const OPEN_FENCE: usize = 0;
const FENCE_CONTENT: usize = 1;
const CLOSE_FENCE: usize = 2;

/// Recognizes backtick fences whose closing run must match the opening run.
/// The open fence length is the scanner state.
#[derive(Debug, Default)]
pub struct FenceScanner {
    open: u8,
}

impl FenceScanner {
    fn backtick_run(cursor: &mut ScanCursor<'_>) -> u8 {
        let mut run = 0u8;
        while cursor.lookahead() == Some('`') {
            cursor.advance();
            run = run.saturating_add(1);
        }
        run
    }
}

impl ExternalScanner for FenceScanner {
    fn scan(&mut self, cursor: &mut ScanCursor<'_>, valid: &[bool]) -> Option<usize> {
        if self.open == 0 {
            if !valid[OPEN_FENCE] {
                return None;
            }
            let run = Self::backtick_run(cursor);
            if run < 3 {
                return None;
            }
            cursor.mark_end();
            self.open = run;
            return Some(OPEN_FENCE);
        }

        let mut consumed = false;
        let mut at_close = false;
        loop {
            match cursor.lookahead() {
                None => break,
                Some('`') => {
                    if Self::backtick_run(cursor) == self.open {
                        at_close = true;
                        break;
                    }
                    cursor.mark_end();
                    consumed = true;
                }
                Some(_) => {
                    cursor.advance();
                    cursor.mark_end();
                    consumed = true;
                }
            }
        }
        if consumed && valid[FENCE_CONTENT] {
            return Some(FENCE_CONTENT);
        }
        if !consumed && at_close && valid[CLOSE_FENCE] {
            cursor.mark_end();
            self.open = 0;
            return Some(CLOSE_FENCE);
        }
        None
    }

    fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.push(self.open);
    }

    fn deserialize(&mut self, state: &[u8]) {
        self.open = state.first().copied().unwrap_or(0);
    }
}

fn fenced_grammar() -> GrammarBuilder {
    GrammarBuilder::new("fenced")
        .external("open_fence")
        .external("fence_content")
        .external("close_fence")
        .extra(pattern(r"\s"))
        .rule("document", repeat(choice([sym("word"), sym("code_block")])))
        .rule(
            "code_block",
            seq([
                sym("open_fence"),
                optional(sym("fence_content")),
                sym("close_fence"),
            ]),
        )
        .rule("word", pattern("[a-z]+"))
}

pub fn fenced() -> Language {
    fenced_grammar()
        .external_scanner(|| Box::new(FenceScanner::default()) as Box<dyn ExternalScanner>)
        .build()
        .unwrap()
}

static FENCED_ARTIFACT: Lazy<Vec<u8>> = Lazy::new(|| fenced_grammar().compile().unwrap());

/// The fenced grammar loaded through an artifact handle
pub fn fenced_handle() -> LanguageHandle {
    LanguageHandle::from_static(FENCED_ARTIFACT.as_slice())
        .with_scanner(|| Box::new(FenceScanner::default()) as Box<dyn ExternalScanner>)
}
