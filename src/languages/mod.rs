//! Bundled grammars
//!
//! Each grammar is compiled on first use into a process-wide artifact and
//! exposed two ways:
//! - `language_handle()`: a [`crate::grammar::LanguageHandle`] for
//!   [`crate::parser::Parser::new`]; every call returns the same handle
//! - `language()`: the loaded [`crate::grammar::Language`]

pub mod activity_diagram;
pub mod scl;
