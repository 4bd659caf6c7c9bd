//! Compiled grammars
//!
//! ```text
//! Language ── symbols / fields / productions
//!    ├── ParseTable      (actions, gotos, lex modes)
//!    └── LexicalGrammar  (token rules, shared NFA, keywords)
//! ```
//!
//! A [`Language`] is produced by [`crate::generate::GrammarBuilder`] or read
//! from an artifact with [`Language::from_bytes`]. Both paths run the same
//! validation.

pub mod artifact;
pub mod language;
pub mod lexical;
pub mod symbol;
pub mod table;

pub use language::{Language, LanguageHandle, ScannerFactory};
pub use lexical::TokenConflictPolicy;
pub use symbol::{FieldId, StateId, Symbol, SymbolKind, SymbolMetadata};
pub use table::{LexMode, ParseAction, ParseTable, ProductionInfo};

use crate::error::LoadError;

/// Validate and expose a compiled grammar.
pub fn load(handle: LanguageHandle) -> Result<Language, LoadError> {
    handle.load()
}
