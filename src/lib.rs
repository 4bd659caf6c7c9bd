//! # sitter
//!
//! Incremental GLR parsing engine with table-driven lexing and lossless,
//! immutable syntax trees.
//!
//! ## Module Structure (dependency order)
//!
//! ```text
//! languages → bundled grammars (activity diagrams, SCL)
//!   ↓
//! parser    → GLR stack machine, error recovery, subtree reuse
//!   ↓
//! tree      → Tree / Node, edits, syntax diagnostics
//!   ↓
//! lexer     → table-driven lexer, external scanner hook
//!   ↓
//! generate  → GrammarBuilder: rules → LR(1) table → artifact
//!   ↓
//! grammar   → Language, parse table, artifact loading
//!   ↓
//! base      → Length, Point, Range
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use sitter::{InputEdit, Parser};
//! use sitter::languages::scl;
//!
//! let mut parser = Parser::new(scl::language_handle())?;
//! let old_text = "type T { id: int; }";
//! let tree = parser.parse(old_text, None)?;
//!
//! let new_text = "type T { id: int; name: string; }";
//! let edit = InputEdit::from_change(old_text.as_bytes(), 17, 17, b" name: string;");
//! let tree = parser.parse(new_text, Some(&tree.edit(&edit)))?;
//! assert!(!tree.root_node().has_error());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// ============================================================================
// MODULES (dependency order: base → grammar → generate → lexer → tree → parser)
// ============================================================================

/// Foundation types: Length, Point, Range
pub mod base;

/// Load, compile and parse errors
pub mod error;

/// Loaded grammars: symbols, parse table, lexical grammar, artifacts
pub mod grammar;

/// Grammar compiler: rule DSL to parse table
pub mod generate;

/// Lexer and the external scanner interface
pub mod lexer;

/// Syntax trees, nodes, edits and diagnostics
pub mod tree;

/// Incremental GLR parser
pub mod parser;

/// Bundled grammars
pub mod languages;

// Re-export the public surface
pub use base::{Length, Point, Range, TextRange, TextSize};
pub use error::{GrammarError, IncludedRangesError, LoadError, ParseError};
pub use generate::GrammarBuilder;
pub use grammar::{Language, LanguageHandle, Symbol, TokenConflictPolicy};
pub use lexer::{ExternalScanner, ScanCursor};
pub use parser::{CancellationHandle, Parser};
pub use tree::{ErrorCode, InputEdit, Node, Severity, SyntaxError, Tree};
