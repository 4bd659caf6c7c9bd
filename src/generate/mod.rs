//! Grammar compiler
//!
//! ```text
//! GrammarBuilder ──prepare──▶ tokens + flat productions
//!                ──lr───────▶ LR(1) table (precedence-resolved, lexically
//!                              conflicting states kept apart)
//!                ──assemble─▶ Language / artifact bytes
//! ```
//!
//! The compiler runs in-process: bundled grammars are compiled the first time
//! their handle is requested.

mod assemble;
mod conflicts;
mod lr;
mod pattern;
mod prepare;
pub mod rules;

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;
use tracing::debug;

pub use rules::{
    Precedence, Rule, alias, blank, choice, field, optional, pattern, prec, prec_dynamic,
    prec_left, prec_right, repeat, repeat1, sep1, seq, string, sym, token,
};

use crate::error::GrammarError;
use crate::grammar::{Language, ScannerFactory, TokenConflictPolicy};
use crate::lexer::ExternalScanner;
use prepare::InputGrammar;

/// Collects a grammar definition and compiles it.
///
/// The first rule is the start rule. Rules whose names begin with `_` are
/// hidden: their children appear in place of their node.
#[derive(Clone, Default)]
pub struct GrammarBuilder {
    input: InputGrammar,
    scanner: Option<ScannerFactory>,
}

impl GrammarBuilder {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            input: InputGrammar {
                name: name.into(),
                ..InputGrammar::default()
            },
            scanner: None,
        }
    }

    /// Define a rule. Redefining a name replaces its body in place.
    pub fn rule(mut self, name: impl Into<SmolStr>, rule: Rule) -> Self {
        self.input.rules.insert(name.into(), rule);
        self
    }

    /// Add a token that may appear anywhere between other tokens.
    pub fn extra(mut self, rule: Rule) -> Self {
        self.input.extras.push(rule);
        self
    }

    /// Declare a token produced by the external scanner.
    pub fn external(mut self, name: impl Into<SmolStr>) -> Self {
        self.input.externals.push(name.into());
        self
    }

    /// Name the identifier-like token that keywords are lexed through.
    pub fn word(mut self, name: impl Into<SmolStr>) -> Self {
        self.input.word = Some(name.into());
        self
    }

    pub fn token_conflict_policy(mut self, policy: TokenConflictPolicy) -> Self {
        self.input.policy = policy;
        self
    }

    pub fn external_scanner<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ExternalScanner> + Send + Sync + 'static,
    {
        self.scanner = Some(Arc::new(factory));
        self
    }

    /// Compile into a ready-to-use [`Language`].
    pub fn build(&self) -> Result<Language, GrammarError> {
        debug!(grammar = %self.input.name, rules = self.input.rules.len(), "compiling grammar");
        let prepared = prepare::prepare(&self.input)?;
        let parts = assemble::assemble(prepared)?;
        let language = Language::from_parts(parts)?;
        Ok(language.with_scanner_factory(self.scanner.clone()))
    }

    /// Compile into artifact bytes for [`Language::from_bytes`].
    pub fn compile(&self) -> Result<Vec<u8>, GrammarError> {
        Ok(self.build()?.to_bytes())
    }
}

impl fmt::Debug for GrammarBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarBuilder")
            .field("name", &self.input.name)
            .field("rules", &self.input.rules.len())
            .field("externals", &self.input.externals)
            .field("external_scanner", &self.scanner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{ParseAction, Symbol};

    fn ab_grammar() -> GrammarBuilder {
        GrammarBuilder::new("ab").rule("s", seq([string("a"), repeat(string("b"))]))
    }

    #[test]
    fn test_build_assigns_symbols_in_order() {
        let language = ab_grammar().build().unwrap();
        assert_eq!(language.symbol_name(Symbol::END), Some("end"));
        assert_eq!(language.symbol_name(Symbol(1)), Some("a"));
        assert_eq!(language.symbol_name(Symbol(2)), Some("b"));
        assert_eq!(language.symbol_name(Symbol(3)), Some("s"));
        assert!(!language.is_visible(Symbol(4)));
        assert_eq!(language.symbol_for_name("s", true), Some(Symbol(3)));
        assert_eq!(language.symbol_for_name("a", false), Some(Symbol(1)));
    }

    #[test]
    fn test_start_state_shifts_first_token() {
        let language = ab_grammar().build().unwrap();
        let actions = language.table().actions(0, Symbol(1));
        assert!(matches!(actions, [ParseAction::Shift { .. }]));
    }

    #[test]
    fn test_compile_round_trips_through_artifact() {
        let bytes = ab_grammar().compile().unwrap();
        let language = Language::from_bytes(&bytes).unwrap();
        assert_eq!(language.name(), "ab");
        assert_eq!(language.to_bytes(), bytes);
    }

    #[test]
    fn test_keywords_follow_word_token() {
        let language = GrammarBuilder::new("kw")
            .rule(
                "program",
                repeat(choice([seq([string("if"), sym("identifier")]), sym("identifier")])),
            )
            .rule("identifier", pattern("[a-z]+"))
            .word("identifier")
            .build()
            .unwrap();
        let lexical = language.lexical();
        let keyword = lexical.keyword(b"if");
        assert_eq!(keyword, language.symbol_for_name("if", false));
        assert!(lexical.has_keywords());
    }

    #[test]
    fn test_fields_are_sorted() {
        let language = GrammarBuilder::new("fields")
            .rule(
                "pair",
                seq([field("value", sym("atom")), string("="), field("key", sym("atom"))]),
            )
            .rule("atom", pattern("[a-z]+"))
            .build()
            .unwrap();
        assert_eq!(language.field_name_for_id(crate::grammar::FieldId(1)), Some("key"));
        assert_eq!(language.field_id_for_name("value").map(|f| f.0), Some(2));
    }

    #[test]
    fn test_aliases_reuse_existing_symbols() {
        let language = GrammarBuilder::new("alias")
            .rule(
                "document",
                repeat1(choice([sym("name"), alias(sym("other"), "name", true)])),
            )
            .rule("name", pattern("[a-z]+"))
            .rule("other", pattern("[0-9]+"))
            .build()
            .unwrap();
        let name = language.symbol_for_name("name", true).unwrap();
        let alias = language
            .inner()
            .productions
            .iter()
            .flat_map(|production| production.aliases.iter())
            .map(|(_, symbol)| *symbol)
            .next();
        assert_eq!(alias, Some(name));
    }

    #[test]
    fn test_word_must_be_a_token() {
        let result = GrammarBuilder::new("bad")
            .rule("program", sym("list"))
            .rule("list", repeat1(string("x")))
            .word("list")
            .build();
        assert!(matches!(result, Err(GrammarError::InvalidRule { .. })));
    }
}
