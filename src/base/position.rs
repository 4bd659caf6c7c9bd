/// Position tracking for tokens and tree nodes
///
/// Rows and columns are zero-based. Columns count bytes, not characters, so a
/// point can always be recomputed from a byte offset without decoding.

/// A position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

/// A region of source text, in both byte offsets and points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_point: Point,
    pub end_point: Point,
}

impl Point {
    pub const ZERO: Point = Point { row: 0, column: 0 };

    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

impl Range {
    pub fn new(start_byte: usize, end_byte: usize, start_point: Point, end_point: Point) -> Self {
        Self {
            start_byte,
            end_byte,
            start_point,
            end_point,
        }
    }

    /// The range covering the whole of `text`
    pub fn whole(text: &[u8]) -> Self {
        let end = super::Length::of(text);
        Self::new(0, text.len(), Point::ZERO, end.extent)
    }

    /// Check if a point falls within this range (end inclusive)
    pub fn contains(&self, point: Point) -> bool {
        if point.row < self.start_point.row || point.row > self.end_point.row {
            return false;
        }
        if point.row == self.start_point.row && point.column < self.start_point.column {
            return false;
        }
        if point.row == self.end_point.row && point.column > self.end_point.column {
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
