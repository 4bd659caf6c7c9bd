//! Cursor over the previous tree, offering subtrees for reuse
//!
//! The cursor walks the old tree in document order. `descend` moves to the
//! first child of the current subtree; `advance` moves past it to the next
//! subtree that starts at or after its end.

use crate::tree::subtree::Subtree;

struct Entry {
    tree: Subtree,
    child_index: usize,
    /// Absolute offset of the start of the subtree's padding
    byte_offset: usize,
}

pub(crate) struct ReusableNode {
    stack: Vec<Entry>,
    last_external_token: Option<Subtree>,
}

impl ReusableNode {
    pub fn new(root: Subtree) -> Self {
        Self {
            stack: vec![Entry {
                tree: root,
                child_index: 0,
                byte_offset: 0,
            }],
            last_external_token: None,
        }
    }

    /// The subtree under the cursor, or `None` once the tree is exhausted
    pub fn tree(&self) -> Option<&Subtree> {
        self.stack.last().map(|entry| &entry.tree)
    }

    pub fn byte_offset(&self) -> usize {
        self.stack.last().map_or(usize::MAX, |entry| entry.byte_offset)
    }

    /// Last external token before the cursor
    pub fn last_external_token(&self) -> Option<&Subtree> {
        self.last_external_token.as_ref()
    }

    pub fn advance(&mut self) {
        let Some(last) = self.stack.last() else { return };
        let byte_offset = last.byte_offset + last.tree.total_size().byte_len();
        if let Some(external) = last.tree.last_external_token() {
            self.last_external_token = Some(external.clone());
        }

        loop {
            let Some(popped) = self.stack.pop() else { return };
            let next_index = popped.child_index + 1;
            let Some(parent) = self.stack.last() else { return };
            if let Some(next) = parent.tree.children().get(next_index) {
                let next = next.clone();
                self.stack.push(Entry {
                    tree: next,
                    child_index: next_index,
                    byte_offset,
                });
                return;
            }
        }
    }

    /// Move to the first child. Returns false for childless subtrees.
    pub fn descend(&mut self) -> bool {
        let Some(last) = self.stack.last() else { return false };
        let Some(first) = last.tree.children().first() else { return false };
        let entry = Entry {
            tree: first.clone(),
            child_index: 0,
            byte_offset: last.byte_offset,
        };
        self.stack.push(entry);
        true
    }
}
