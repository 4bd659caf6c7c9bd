//! Incremental GLR parser
//!
//! ```text
//! Parser::parse(text, old_tree)
//!     ↓
//! Session ── lex / reuse ──▶ lookahead
//!     │          ↑
//!     │     ReusableNode (walks the edited old tree)
//!     ↓
//! Stack (graph-structured; versions fork on conflicts, merge when equal)
//!     ↓
//! recovery (missing token, pop, skip) when every version is stuck
//!     ↓
//! Tree
//! ```
//!
//! ## Incremental Reparsing
//!
//! When text changes, the caller:
//! 1. Applies the edit to the old tree ([`crate::tree::Tree::edit`])
//! 2. Passes the edited tree to the next parse
//!
//! The parse then shifts unchanged old subtrees whole wherever the automaton
//! is in the state they were built in, and lexes only around the edit.

#[allow(clippy::module_inception)]
mod parser;
mod recovery;
mod reusable;
mod session;
mod stack;

pub use parser::{CancellationHandle, Parser};
