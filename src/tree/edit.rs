//! Text edits and their effect on an existing tree
//!
//! Editing never re-lexes. It maps positions through the edit and marks every
//! subtree whose text, or whose examined lookahead, overlaps the replaced
//! range. Untouched subtrees are shared with the original tree as-is; their
//! relative sizes mean they move for free.

use crate::base::{Length, Point, Range};
use crate::tree::subtree::{Flags, Subtree};

/// A replacement of `[start_byte, old_end_byte)` by text ending at `new_end_byte`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_position: Point,
    pub old_end_position: Point,
    pub new_end_position: Point,
}

impl InputEdit {
    /// Describe replacing `old_text[start..old_end]` with `replacement`.
    pub fn from_change(old_text: &[u8], start: usize, old_end: usize, replacement: &[u8]) -> Self {
        let old_end = old_end.min(old_text.len());
        let start = start.min(old_end);
        let start_position = Length::of(&old_text[..start]).extent;
        let old_end_position = Length::of(&old_text[..old_end]).extent;
        let new_end = Length::of(&old_text[..start]) + Length::of(replacement);
        Self {
            start_byte: start,
            old_end_byte: old_end,
            new_end_byte: new_end.byte_len(),
            start_position,
            old_end_position,
            new_end_position: new_end.extent,
        }
    }

    pub(crate) fn start(&self) -> Length {
        Length::new(self.start_byte, self.start_position)
    }

    pub(crate) fn old_end(&self) -> Length {
        Length::new(self.old_end_byte, self.old_end_position)
    }

    pub(crate) fn new_end(&self) -> Length {
        Length::new(self.new_end_byte, self.new_end_position)
    }

    /// Where an old position lands after the edit
    pub fn map(&self, position: Length) -> Length {
        if position.bytes <= self.start().bytes {
            position
        } else if position.bytes <= self.old_end().bytes {
            self.new_end()
        } else {
            self.new_end() + (position - self.old_end())
        }
    }

    pub fn map_range(&self, range: &Range) -> Range {
        let start = self.map(Length::new(range.start_byte, range.start_point));
        let end = self.map(Length::new(range.end_byte, range.end_point));
        Range::new(start.byte_len(), end.byte_len(), start.extent, end.extent)
    }
}

/// An edit in the coordinate space of one subtree (0 = start of its padding)
#[derive(Debug, Clone, Copy)]
pub(crate) struct RelativeEdit {
    pub start: Length,
    pub old_end: Length,
    pub new_end: Length,
}

impl From<&InputEdit> for RelativeEdit {
    fn from(edit: &InputEdit) -> Self {
        Self {
            start: edit.start(),
            old_end: edit.old_end(),
            new_end: edit.new_end(),
        }
    }
}

/// Apply `edit` to `tree`, copying only the spine of affected subtrees.
pub(crate) fn edit_subtree(tree: &Subtree, edit: RelativeEdit) -> Subtree {
    let mut result = tree.clone();
    let data = result.make_mut();

    let padding = data.padding;
    let total = data.padding + data.size;
    let pure_insertion = edit.old_end.bytes == edit.start.bytes;
    if edit.old_end.bytes <= padding.bytes {
        data.padding = edit.new_end + (padding - edit.old_end);
    } else if edit.start.bytes < padding.bytes {
        data.size = data.size - (edit.old_end - padding);
        data.padding = edit.new_end;
    } else if edit.start.bytes < total.bytes || (edit.start.bytes == total.bytes && pure_insertion) {
        data.size = (edit.new_end - padding) + (total - edit.old_end);
    }
    data.flags.set(Flags::HAS_CHANGES, true);

    let mut remaining = edit;
    let mut child_right = Length::ZERO;
    for (index, child) in data.children.iter_mut().enumerate() {
        let child_size = child.total_size();
        let child_left = child_right;
        child_right = child_left + child_size;

        if ends_before(child_right, child.lookahead_bytes(), remaining.start) {
            continue;
        }
        // Children past the replaced range keep their shape. A non-empty
        // child starting exactly at its end is the first of those.
        if child_left.bytes > remaining.old_end.bytes
            || (child_left.bytes == remaining.old_end.bytes && !child_size.is_zero() && index > 0)
        {
            break;
        }

        let mut child_edit = RelativeEdit {
            start: remaining.start - child_left,
            old_end: remaining.old_end - child_left,
            new_end: remaining.new_end - child_left,
        };
        if child_right.bytes > remaining.start.bytes
            || (child_right.bytes == remaining.start.bytes && pure_insertion)
        {
            // Inserted text belongs to the first child that holds the edit;
            // later children only shrink.
            remaining.new_end = remaining.start;
        } else {
            // Only the lookahead reaches the edit: invalidate, don't resize.
            child_edit.old_end = child_edit.start;
            child_edit.new_end = child_edit.start;
        }
        *child = edit_subtree(child, child_edit);
    }
    result
}

/// Whether a child ending at `right`, having examined `lookahead` bytes past
/// its end, is unaffected by an edit at `start`.
fn ends_before(right: Length, lookahead: u32, start: Length) -> bool {
    u64::from(u32::from(right.bytes)) + u64::from(lookahead) < u64::from(u32::from(start.bytes))
}
