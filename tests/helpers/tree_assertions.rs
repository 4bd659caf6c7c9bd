//! Assertions and edit helpers shared by the parser tests.

use sitter::{InputEdit, Node, Parser, Tree};

/// Every node under `node` (itself included) matching `predicate`, in
/// document order.
pub fn find_all<'tree>(node: Node<'tree>, predicate: &dyn Fn(&Node<'tree>) -> bool) -> Vec<Node<'tree>> {
    let mut found = Vec::new();
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
        if predicate(&current) {
            found.push(current);
        }
        let mut children = current.children();
        children.reverse();
        pending.extend(children);
    }
    found
}

/// Concatenated text of all leaves
pub fn leaf_text(tree: &Tree, text: &[u8]) -> Vec<u8> {
    tree.root_node()
        .leaves()
        .iter()
        .flat_map(|leaf| text[leaf.byte_range()].to_vec())
        .collect()
}

/// The root spans the whole text and the leaves tile it without gaps.
pub fn assert_total_coverage(tree: &Tree, text: &[u8]) {
    let root = tree.root_node();
    assert_eq!(root.byte_range(), 0..text.len(), "{}", tree.to_sexp());
    let mut end = 0;
    for leaf in root.leaves() {
        assert_eq!(leaf.start_byte(), end, "gap before leaf {leaf:?}");
        end = leaf.end_byte();
    }
    assert_eq!(end, text.len(), "leaves stop short: {}", tree.to_sexp());
}

/// Replace `old_text[start..old_end]` with `replacement`, then reparse
/// incrementally. Returns the new text and tree.
pub fn edit_and_reparse(
    parser: &mut Parser,
    old_text: &str,
    tree: &Tree,
    start: usize,
    old_end: usize,
    replacement: &str,
) -> (String, Tree) {
    let edit = InputEdit::from_change(old_text.as_bytes(), start, old_end, replacement.as_bytes());
    let mut new_text = String::with_capacity(old_text.len() + replacement.len());
    new_text.push_str(&old_text[..start]);
    new_text.push_str(replacement);
    new_text.push_str(&old_text[old_end..]);
    let edited = tree.edit(&edit);
    let reparsed = parser.parse(&new_text, Some(&edited)).unwrap();
    (new_text, reparsed)
}

/// Incremental reparse equals a parse from scratch.
pub fn assert_matches_fresh_parse(parser: &mut Parser, text: &str, incremental: &Tree) {
    let fresh = parser.parse(text, None).unwrap();
    assert_eq!(
        incremental.to_sexp(),
        fresh.to_sexp(),
        "incremental and fresh parses of {text:?} differ"
    );
    assert_eq!(*incremental, fresh, "structure differs for {text:?}");
}
