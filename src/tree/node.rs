//! Borrowed views of tree nodes
//!
//! A [`Node`] pairs a subtree with its absolute position, which is only known
//! while walking down from the root. Hidden subtrees never surface as nodes;
//! their visible descendants are spliced into the parent's child list.

use std::fmt;
use std::ops;
use std::str::Utf8Error;

use text_size::TextRange;

use crate::base::{Length, Point, Range, to_text_size};
use crate::grammar::{FieldId, Language, Symbol};
use crate::tree::Tree;
use crate::tree::subtree::Subtree;

/// A node in a [`Tree`]
#[derive(Clone, Copy)]
pub struct Node<'tree> {
    tree: &'tree Tree,
    subtree: &'tree Subtree,
    /// Absolute start of the subtree's padding
    offset: Length,
    /// Name the parent's production gives this child, if any
    alias: Option<Symbol>,
}

/// A visible child together with the field it fills
#[derive(Clone, Copy)]
struct Entry<'tree> {
    node: Node<'tree>,
    field: Option<FieldId>,
}

impl<'tree> Node<'tree> {
    pub(crate) fn new(tree: &'tree Tree, subtree: &'tree Subtree, offset: Length, alias: Option<Symbol>) -> Self {
        Self {
            tree,
            subtree,
            offset,
            alias,
        }
    }

    fn is_root(&self) -> bool {
        std::ptr::eq(self.subtree, self.tree.root())
    }

    // ===== Kind =====

    pub fn symbol(&self) -> Symbol {
        self.alias.unwrap_or_else(|| self.subtree.symbol())
    }

    pub fn kind_id(&self) -> u16 {
        self.symbol().0
    }

    /// The grammar name of this node's symbol (or its alias)
    pub fn kind(&self) -> &'tree str {
        self.tree.language().symbol_name(self.symbol()).unwrap_or("")
    }

    pub fn language(&self) -> &'tree Language {
        self.tree.language()
    }

    pub fn is_named(&self) -> bool {
        match self.alias {
            Some(alias) => self.tree.language().is_named(alias),
            None => self.subtree.is_named(),
        }
    }

    fn is_visible(&self) -> bool {
        match self.alias {
            Some(alias) => self.tree.language().is_visible(alias),
            None => self.subtree.is_visible(),
        }
    }

    pub fn is_extra(&self) -> bool {
        self.subtree.is_extra()
    }

    /// Zero-width token inserted by error recovery
    pub fn is_missing(&self) -> bool {
        self.subtree.is_missing()
    }

    pub fn is_error(&self) -> bool {
        self.symbol() == Symbol::ERROR
    }

    /// Whether this node or any descendant is an error or missing token
    pub fn has_error(&self) -> bool {
        self.subtree.has_error()
    }

    /// Whether an edit touched this node since it was parsed
    pub fn has_changes(&self) -> bool {
        self.subtree.has_changes()
    }

    /// Several equally good parses existed and one was picked
    pub fn is_ambiguous(&self) -> bool {
        self.subtree.is_ambiguous()
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.subtree.is_leaf()
    }

    /// Identity of the underlying shared subtree. Stays the same when an
    /// incremental parse reuses the subtree.
    pub fn id(&self) -> usize {
        self.subtree.id()
    }

    // ===== Position =====

    fn start(&self) -> Length {
        if self.is_root() {
            Length::ZERO
        } else {
            self.offset + self.subtree.padding()
        }
    }

    fn end(&self) -> Length {
        if self.is_root() {
            self.tree.length()
        } else {
            self.offset + self.subtree.total_size()
        }
    }

    pub fn start_byte(&self) -> usize {
        self.start().byte_len()
    }

    pub fn end_byte(&self) -> usize {
        self.end().byte_len()
    }

    pub fn byte_range(&self) -> ops::Range<usize> {
        self.start_byte()..self.end_byte()
    }

    pub fn text_range(&self) -> TextRange {
        TextRange::new(to_text_size(self.start_byte()), to_text_size(self.end_byte()))
    }

    pub fn start_position(&self) -> Point {
        self.start().extent
    }

    pub fn end_position(&self) -> Point {
        self.end().extent
    }

    pub fn range(&self) -> Range {
        Range::new(
            self.start_byte(),
            self.end_byte(),
            self.start_position(),
            self.end_position(),
        )
    }

    /// The node's text, or an error if it does not fall on UTF-8 boundaries
    pub fn utf8_text<'a>(&self, source: &'a [u8]) -> Result<&'a str, Utf8Error> {
        std::str::from_utf8(source.get(self.byte_range()).unwrap_or_default())
    }

    // ===== Children =====

    fn entries(&self) -> Vec<Entry<'tree>> {
        let mut entries = Vec::new();
        if !self.subtree.is_leaf() {
            collect_visible(self.tree, self.subtree, self.offset, None, &mut entries);
        }
        entries
    }

    pub fn child_count(&self) -> usize {
        self.subtree.visible_child_count() as usize
    }

    pub fn named_child_count(&self) -> usize {
        self.subtree.named_child_count() as usize
    }

    pub fn child(&self, index: usize) -> Option<Node<'tree>> {
        self.entries().get(index).map(|entry| entry.node)
    }

    pub fn children(&self) -> Vec<Node<'tree>> {
        self.entries().into_iter().map(|entry| entry.node).collect()
    }

    pub fn named_child(&self, index: usize) -> Option<Node<'tree>> {
        self.named_children().into_iter().nth(index)
    }

    pub fn named_children(&self) -> Vec<Node<'tree>> {
        self.entries()
            .into_iter()
            .map(|entry| entry.node)
            .filter(Node::is_named)
            .collect()
    }

    /// First child filling the field `name`
    pub fn child_by_field_name(&self, name: &str) -> Option<Node<'tree>> {
        let field = self.tree.language().field_id_for_name(name)?;
        self.child_by_field_id(field)
    }

    pub fn child_by_field_id(&self, field: FieldId) -> Option<Node<'tree>> {
        self.entries()
            .into_iter()
            .find(|entry| entry.field == Some(field))
            .map(|entry| entry.node)
    }

    pub fn children_by_field_name(&self, name: &str) -> Vec<Node<'tree>> {
        let Some(field) = self.tree.language().field_id_for_name(name) else {
            return Vec::new();
        };
        self.entries()
            .into_iter()
            .filter(|entry| entry.field == Some(field))
            .map(|entry| entry.node)
            .collect()
    }

    /// Name of the field the child at `index` fills
    pub fn field_name_for_child(&self, index: usize) -> Option<&'tree str> {
        let field = self.entries().get(index)?.field?;
        self.tree.language().field_name_for_id(field)
    }

    /// All leaves under this node in document order, hidden ones included.
    ///
    /// Concatenating their text reproduces the node's text (outside gaps
    /// between included ranges).
    pub fn leaves(&self) -> Vec<Node<'tree>> {
        let mut leaves = Vec::new();
        collect_leaves(*self, &mut leaves);
        leaves
    }

    // ===== Navigation =====

    pub fn parent(&self) -> Option<Node<'tree>> {
        if self.is_root() {
            return None;
        }
        find_parent(self.tree.root_node(), self)
    }

    fn siblings(&self) -> Option<(Vec<Node<'tree>>, usize)> {
        let siblings = self.parent()?.children();
        let index = siblings.iter().position(|sibling| sibling == self)?;
        Some((siblings, index))
    }

    pub fn next_sibling(&self) -> Option<Node<'tree>> {
        let (siblings, index) = self.siblings()?;
        siblings.get(index + 1).copied()
    }

    pub fn prev_sibling(&self) -> Option<Node<'tree>> {
        let (siblings, index) = self.siblings()?;
        siblings.get(index.checked_sub(1)?).copied()
    }

    pub fn next_named_sibling(&self) -> Option<Node<'tree>> {
        let (siblings, index) = self.siblings()?;
        siblings[index + 1..].iter().find(|node| node.is_named()).copied()
    }

    pub fn prev_named_sibling(&self) -> Option<Node<'tree>> {
        let (siblings, index) = self.siblings()?;
        siblings[..index].iter().rev().find(|node| node.is_named()).copied()
    }

    /// Smallest node under this one that spans `[start, end)`
    pub fn descendant_for_byte_range(&self, start: usize, end: usize) -> Option<Node<'tree>> {
        if start > end || start < self.start_byte() || end > self.end_byte() {
            return None;
        }
        let mut node = *self;
        loop {
            let next = node.children().into_iter().find(|child| {
                child.start_byte() <= start && end <= child.end_byte() && child.end_byte() > start
            });
            match next {
                Some(child) => node = child,
                None => return Some(node),
            }
        }
    }

    // ===== Rendering =====

    /// S-expression of the named structure, e.g. `(s (item) value: (item))`
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out, None);
        out
    }

    fn write_sexp(&self, out: &mut String, field: Option<&str>) {
        let printed = self.is_named() || self.is_missing();
        if printed {
            if !out.is_empty() {
                out.push(' ');
            }
            if let Some(field) = field {
                out.push_str(field);
                out.push_str(": ");
            }
            out.push('(');
            if self.is_missing() {
                out.push_str("MISSING ");
                if self.is_named() {
                    out.push_str(self.kind());
                } else {
                    out.push('"');
                    out.push_str(self.kind());
                    out.push('"');
                }
            } else {
                out.push_str(self.kind());
            }
        }
        let language = self.tree.language();
        for entry in self.entries() {
            let field = entry.field.and_then(|field| language.field_name_for_id(field));
            entry.node.write_sexp(out, field);
        }
        if printed {
            out.push(')');
        }
    }
}

/// Push the visible descendants of `parent`, descending through hidden
/// subtrees. A field on a hidden child carries over to its children unless
/// they fill a field of their own.
fn collect_visible<'tree>(
    tree: &'tree Tree,
    parent: &'tree Subtree,
    offset: Length,
    inherited: Option<FieldId>,
    out: &mut Vec<Entry<'tree>>,
) {
    let production = if parent.is_error() {
        None
    } else {
        tree.language().production(parent.production_id())
    };
    let mut offset = offset;
    let mut structural_index = 0;
    for child in parent.children() {
        let (alias, field) = if child.is_extra() {
            (None, None)
        } else {
            let slot = structural_index;
            structural_index += 1;
            let alias = production.and_then(|p| p.alias_at(slot));
            let field = production.and_then(|p| p.field_at(slot)).or(inherited);
            (alias, field)
        };
        let node = Node::new(tree, child, offset, alias);
        if node.is_visible() {
            out.push(Entry { node, field });
        } else if !child.is_leaf() {
            collect_visible(tree, child, offset, field, out);
        }
        offset += child.total_size();
    }
}

fn collect_leaves<'tree>(node: Node<'tree>, out: &mut Vec<Node<'tree>>) {
    if node.subtree.is_leaf() {
        out.push(node);
        return;
    }
    let production = if node.subtree.is_error() {
        None
    } else {
        node.tree.language().production(node.subtree.production_id())
    };
    let mut offset = node.offset;
    let mut structural_index = 0;
    for child in node.subtree.children() {
        let alias = if child.is_extra() {
            None
        } else {
            structural_index += 1;
            production.and_then(|p| p.alias_at(structural_index - 1))
        };
        collect_leaves(Node::new(node.tree, child, offset, alias), out);
        offset += child.total_size();
    }
}

fn find_parent<'tree>(candidate: Node<'tree>, target: &Node<'tree>) -> Option<Node<'tree>> {
    for child in candidate.children() {
        if child == *target {
            return Some(candidate);
        }
        let contains = child.start_byte() <= target.start_byte() && target.end_byte() <= child.end_byte();
        if contains && !child.is_leaf() {
            if let Some(parent) = find_parent(child, target) {
                return Some(parent);
            }
        }
    }
    None
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree)
            && self.subtree.ptr_eq(other.subtree)
            && self.offset == other.offset
            && self.alias == other.alias
    }
}

impl Eq for Node<'_> {}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Node {} {} - {}}}",
            self.kind(),
            self.start_position(),
            self.end_position()
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::generate::{GrammarBuilder, alias, field, optional, pattern, repeat, seq, string, sym};
    use crate::parser::Parser;

    fn pairs() -> crate::grammar::Language {
        GrammarBuilder::new("pairs")
            .rule("document", repeat(sym("_entry")))
            .rule(
                "_entry",
                seq([
                    field("key", sym("name")),
                    string("="),
                    field("value", sym("_value")),
                    optional(string(";")),
                ]),
            )
            .rule("_value", seq([sym("name"), optional(alias(sym("number"), "unit", true))]))
            .rule("name", pattern("[a-z]+"))
            .rule("number", pattern("[0-9]+"))
            .extra(pattern("\\s+"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_hidden_rules_are_transparent() {
        let mut parser = Parser::with_language(pairs());
        let tree = parser.parse(b"a = b 1; c = d", None).unwrap();
        let root = tree.root_node();
        assert_eq!(root.kind(), "document");
        let kinds: Vec<&str> = root.children().iter().map(|node| node.kind()).collect();
        assert_eq!(kinds, ["name", "=", "name", "unit", ";", "name", "=", "name"]);
        assert_eq!(root.child_count(), 8);
        assert_eq!(root.named_child_count(), 5);
    }

    #[test]
    fn test_fields_reach_through_hidden_children() {
        let mut parser = Parser::with_language(pairs());
        let source = b"a = b 1";
        let tree = parser.parse(source, None).unwrap();
        let root = tree.root_node();
        let key = root.child_by_field_name("key").unwrap();
        assert_eq!(key.utf8_text(source).unwrap(), "a");
        let values: Vec<&str> = root
            .children_by_field_name("value")
            .iter()
            .map(|node| node.utf8_text(source).unwrap())
            .collect();
        assert_eq!(values, ["b", "1"]);
        assert_eq!(root.field_name_for_child(0), Some("key"));
        assert_eq!(root.field_name_for_child(1), None);
        assert_eq!(
            tree.to_sexp(),
            "(document key: (name) value: (name) value: (unit))"
        );
    }

    #[test]
    fn test_navigation() {
        let mut parser = Parser::with_language(pairs());
        let source = b"a = b";
        let tree = parser.parse(source, None).unwrap();
        let root = tree.root_node();
        let equals = root.child(1).unwrap();
        assert_eq!(equals.kind(), "=");
        assert!(!equals.is_named());
        assert_eq!(equals.parent(), Some(root));
        assert_eq!(equals.prev_sibling().map(|node| node.byte_range()), Some(0..1));
        assert_eq!(equals.next_named_sibling().map(|node| node.byte_range()), Some(4..5));
        assert_eq!(root.parent(), None);
        let found = root.descendant_for_byte_range(4, 5).unwrap();
        assert_eq!(found.kind(), "name");
        assert_eq!(root.descendant_for_byte_range(1, 4), Some(root));
    }

    #[test]
    fn test_leaves_cover_the_input() {
        let mut parser = Parser::with_language(pairs());
        let source = b"  a = b 1;\n";
        let tree = parser.parse(source, None).unwrap();
        let text: Vec<u8> = tree
            .root_node()
            .leaves()
            .iter()
            .flat_map(|leaf| source[leaf.byte_range()].to_vec())
            .collect();
        assert_eq!(text, source);
        assert_eq!(tree.root_node().byte_range(), 0..source.len());
        assert_eq!(tree.root_node().end_position().row, 1);
    }
}
