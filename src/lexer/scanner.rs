//! External scanner interface
//!
//! Grammars can declare tokens that the table-driven lexer cannot express
//! (nested fences, indentation, heredocs). Those are produced by a
//! hand-written [`ExternalScanner`]. The scanner keeps its own state; the
//! runtime stores the serialized state on every external token so that an
//! incremental parse can restore it at any reuse point.

use crate::base::Point;
use crate::grammar::lexical::decode_char;

/// Serialized scanner state is truncated to this many bytes.
pub const MAX_SCANNER_STATE: usize = 1024;

/// A grammar-specific scanner for context-sensitive tokens
pub trait ExternalScanner: Send {
    /// Try to recognize one of the external tokens marked valid.
    ///
    /// `valid` is indexed like the grammar's external token list. Returns the
    /// index of the recognized token, or `None` to fall back to the internal
    /// lexer. The token spans from the start position to the last
    /// [`ScanCursor::mark_end`] (or the current position if never marked).
    fn scan(&mut self, cursor: &mut ScanCursor<'_>, valid: &[bool]) -> Option<usize>;

    /// Write the scanner state
    fn serialize(&self, buffer: &mut Vec<u8>);

    /// Restore the scanner state; an empty slice means the initial state
    fn deserialize(&mut self, state: &[u8]);
}

/// Byte cursor handed to an external scanner
#[derive(Debug)]
pub struct ScanCursor<'a> {
    input: &'a [u8],
    position: usize,
    marked_end: Option<usize>,
    examined: usize,
    start_point: Point,
}

impl<'a> ScanCursor<'a> {
    /// `input` is the text from the token start to the end of the current
    /// included range.
    pub(crate) fn new(input: &'a [u8], start_point: Point) -> Self {
        Self {
            input,
            position: 0,
            marked_end: None,
            examined: 0,
            start_point,
        }
    }

    /// The character under the cursor, or `None` at the end of input
    pub fn lookahead(&mut self) -> Option<char> {
        match decode_char(&self.input[self.position..]) {
            Some((ch, width)) => {
                self.examined = self.examined.max(self.position + width);
                Some(ch)
            }
            None => {
                self.examined = self.examined.max(self.position + 1);
                None
            }
        }
    }

    /// Move past the current character
    pub fn advance(&mut self) {
        if let Some((_, width)) = decode_char(&self.input[self.position..]) {
            self.position += width;
            self.examined = self.examined.max(self.position);
        }
    }

    /// Mark the current position as the end of the token
    pub fn mark_end(&mut self) {
        self.marked_end = Some(self.position);
    }

    pub fn is_at_end(&mut self) -> bool {
        self.lookahead().is_none()
    }

    /// Byte column of the cursor
    pub fn column(&self) -> usize {
        let consumed = &self.input[..self.position];
        match consumed.iter().rposition(|&b| b == b'\n') {
            Some(newline) => self.position - newline - 1,
            None => self.start_point.column + self.position,
        }
    }

    pub(crate) fn token_len(&self) -> usize {
        self.marked_end.unwrap_or(self.position)
    }

    /// Bytes examined, counting one past the end when the end was probed
    pub(crate) fn examined(&self) -> usize {
        self.examined
    }
}
