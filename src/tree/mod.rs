//! Concrete syntax trees
//!
//! ```text
//! Tree ── root: Subtree ──▶ Arc<SubtreeData> ── children: [Subtree]
//!   │                        (relative padding + size)
//!   └── root_node() ──▶ Node<'tree>  (absolute positions, visible children)
//! ```
//!
//! Trees are immutable. [`Tree::edit`] returns a new tree that shares every
//! subtree the edit did not touch; pass it to the next parse to reuse them.

pub mod diagnostics;
mod edit;
mod node;
pub(crate) mod subtree;

use std::fmt;

pub use diagnostics::{ErrorCode, RelatedInfo, Severity, SyntaxError};
pub use edit::InputEdit;
pub use node::Node;

use crate::base::{Length, Range};
use crate::grammar::Language;
use edit::{RelativeEdit, edit_subtree};
use subtree::Subtree;

/// The result of a parse
#[derive(Clone)]
pub struct Tree {
    root: Subtree,
    language: Language,
    /// Length of the parsed text
    length: Length,
    included_ranges: Vec<Range>,
}

impl Tree {
    pub(crate) fn new(root: Subtree, language: Language, length: Length, included_ranges: Vec<Range>) -> Self {
        Self {
            root,
            language,
            length,
            included_ranges,
        }
    }

    pub fn root_node(&self) -> Node<'_> {
        Node::new(self, &self.root, Length::ZERO, None)
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Byte length of the text this tree describes
    pub fn len(&self) -> usize {
        self.length.byte_len()
    }

    pub fn is_empty(&self) -> bool {
        self.length.is_zero()
    }

    /// The ranges the tree was parsed with
    pub fn included_ranges(&self) -> &[Range] {
        &self.included_ranges
    }

    /// Apply a text edit, marking affected subtrees as changed.
    ///
    /// The returned tree describes the *new* text's positions. Its node kinds
    /// are stale until it is passed back to [`crate::parser::Parser::parse`].
    pub fn edit(&self, edit: &InputEdit) -> Tree {
        let root = edit_subtree(&self.root, RelativeEdit::from(edit));
        let length = if edit.old_end().bytes <= self.length.bytes {
            edit.new_end() + (self.length - edit.old_end())
        } else {
            edit.new_end()
        };
        let included_ranges = self
            .included_ranges
            .iter()
            .map(|range| edit.map_range(range))
            .collect();
        Tree {
            root,
            language: self.language.clone(),
            length,
            included_ranges,
        }
    }

    /// Lexical and syntax errors, in document order
    pub fn errors(&self) -> Vec<SyntaxError> {
        diagnostics::collect(self.root_node())
    }

    pub fn to_sexp(&self) -> String {
        self.root_node().to_sexp()
    }

    pub(crate) fn root(&self) -> &Subtree {
        &self.root
    }

    pub(crate) fn length(&self) -> Length {
        self.length
    }
}

/// Structural equality: same grammar, same text length, same node shapes
impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.language == other.language
            && self.length == other.length
            && self.root.structurally_equal(&other.root)
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("language", &self.language.name())
            .field("len", &self.len())
            .field("root", &self.to_sexp())
            .finish()
    }
}
