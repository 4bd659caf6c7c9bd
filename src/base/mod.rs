//! Foundation types for the parsing engine.
//!
//! This module provides the text primitives used throughout the crate:
//! - [`Point`], [`Range`] - Row/column positions and byte+point regions
//! - [`Length`] - Relative extents stored inside subtrees
//! - [`TextRange`], [`TextSize`] - Byte offsets (re-exported from `text-size`)
//!
//! This module has NO dependencies on other sitter modules.

mod length;
mod position;

pub use length::Length;
pub(crate) use length::to_text_size;
pub use position::{Point, Range};

// Re-export text-size types for convenience
pub use text_size;
pub use text_size::{TextRange, TextSize};
