//! Relative text extents.
//!
//! Subtrees never store absolute offsets. They store a [`Length`]: a byte count
//! plus the row/column extent of those bytes. Absolute positions are the sum of
//! the lengths of everything to the left, which lets an edit shift every
//! following subtree without touching it.

use std::ops::{Add, AddAssign, Sub};

use text_size::TextSize;

use super::Point;

/// Byte count and point extent of a run of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Length {
    pub bytes: TextSize,
    pub extent: Point,
}

impl Length {
    pub const ZERO: Length = Length {
        bytes: TextSize::new(0),
        extent: Point::ZERO,
    };

    pub fn new(bytes: usize, extent: Point) -> Self {
        Self {
            bytes: to_text_size(bytes),
            extent,
        }
    }

    /// Measure a run of text
    pub fn of(text: &[u8]) -> Self {
        let mut extent = Point::ZERO;
        for &byte in text {
            if byte == b'\n' {
                extent.row += 1;
                extent.column = 0;
            } else {
                extent.column += 1;
            }
        }
        Self::new(text.len(), extent)
    }

    pub fn byte_len(self) -> usize {
        usize::from(self.bytes)
    }

    pub fn is_zero(self) -> bool {
        self.bytes == TextSize::new(0)
    }
}

/// Offsets beyond `u32::MAX` saturate; inputs that large are not supported.
pub(crate) fn to_text_size(bytes: usize) -> TextSize {
    TextSize::new(u32::try_from(bytes).unwrap_or(u32::MAX))
}

impl Add for Length {
    type Output = Length;

    fn add(self, rhs: Length) -> Length {
        let extent = if rhs.extent.row > 0 {
            Point::new(self.extent.row + rhs.extent.row, rhs.extent.column)
        } else {
            Point::new(self.extent.row, self.extent.column + rhs.extent.column)
        };
        Length {
            bytes: self.bytes + rhs.bytes,
            extent,
        }
    }
}

impl AddAssign for Length {
    fn add_assign(&mut self, rhs: Length) {
        *self = *self + rhs;
    }
}

/// `a - b` is the length that, added to `b`, yields `a`. Saturates at zero.
impl Sub for Length {
    type Output = Length;

    fn sub(self, rhs: Length) -> Length {
        let bytes = self.bytes.checked_sub(rhs.bytes).unwrap_or_default();
        let extent = if self.extent.row > rhs.extent.row {
            Point::new(self.extent.row - rhs.extent.row, self.extent.column)
        } else {
            Point::new(0, self.extent.column.saturating_sub(rhs.extent.column))
        };
        Length { bytes, extent }
    }
}
