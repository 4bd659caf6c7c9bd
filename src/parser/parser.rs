//! The public parser object

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use super::session::Session;
use super::stack::Stack;
use crate::base::{Length, Range};
use crate::error::{IncludedRangesError, LoadError, ParseError};
use crate::grammar::{Language, LanguageHandle};
use crate::lexer::{LexInput, Lexer};
use crate::tree::Tree;

/// Shared flag that stops a running parse at its next token step
///
/// The flag stays set until [`Parser::reset_cancellation`] (or
/// [`CancellationHandle::reset`]) clears it.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Incremental GLR parser for one [`Language`] at a time
///
/// ```text
/// text ──▶ Lexer ──▶ Session (GLR stack, recovery) ──▶ Tree
///                       ▲
///        old Tree ──────┘ (reused subtrees)
/// ```
#[derive(Default)]
pub struct Parser {
    language: Option<Language>,
    lexer: Option<Lexer>,
    stack: Stack,
    timeout_micros: u64,
    included_ranges: Vec<Range>,
    cancellation: CancellationHandle,
}

impl Parser {
    /// Load the grammar behind `handle` and create a parser for it.
    pub fn new(handle: LanguageHandle) -> Result<Self, LoadError> {
        Ok(Self::with_language(handle.load()?))
    }

    pub fn with_language(language: Language) -> Self {
        let mut parser = Self::default();
        parser.set_language(language);
        parser
    }

    /// Switch grammars. Included ranges and the timeout are kept.
    pub fn set_language(&mut self, language: Language) {
        self.lexer = Some(Lexer::new(&language));
        self.language = Some(language);
    }

    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    // ===== Configuration =====

    /// Abort parses that run longer than `micros` microseconds; `0` disables
    /// the limit.
    pub fn set_timeout(&mut self, micros: u64) {
        self.timeout_micros = micros;
    }

    pub fn timeout_micros(&self) -> u64 {
        self.timeout_micros
    }

    /// Restrict parsing to the given byte ranges. Text between them becomes
    /// padding. An empty list means the whole input.
    pub fn set_included_ranges(&mut self, ranges: &[Range]) -> Result<(), IncludedRangesError> {
        let mut previous_end = 0;
        for (index, range) in ranges.iter().enumerate() {
            if range.start_byte > range.end_byte || range.start_byte < previous_end {
                return Err(IncludedRangesError { index });
            }
            previous_end = range.end_byte;
        }
        self.included_ranges = ranges.to_vec();
        Ok(())
    }

    pub fn included_ranges(&self) -> &[Range] {
        &self.included_ranges
    }

    // ===== Cancellation =====

    /// Request that the current or next parse stop.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// A handle other threads can use to cancel this parser's parses
    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn reset_cancellation(&self) {
        self.cancellation.reset();
    }

    /// Drop per-parse scratch state. Configuration is kept.
    pub fn reset(&mut self) {
        self.stack.clear();
        if let Some(language) = &self.language {
            self.lexer = Some(Lexer::new(language));
        }
    }

    // ===== Parsing =====

    /// Parse `text`, reusing unchanged subtrees of `old_tree`.
    ///
    /// `old_tree` must have been edited (see [`Tree::edit`]) to describe
    /// `text`. Malformed input never fails: it produces `ERROR` and MISSING
    /// nodes. The call fails only when it cannot start, or when it is
    /// cancelled or times out.
    pub fn parse(&mut self, text: impl AsRef<[u8]>, old_tree: Option<&Tree>) -> Result<Tree, ParseError> {
        let text = text.as_ref();
        let language = self.language.clone().ok_or(ParseError::NoLanguage)?;
        if let Some(old) = old_tree {
            if !old.language().same_grammar(&language) {
                return Err(ParseError::LanguageMismatch);
            }
        }
        if self.cancellation.is_cancelled() {
            return Err(ParseError::Cancelled);
        }
        let deadline = match self.timeout_micros {
            0 => None,
            micros => Instant::now().checked_add(Duration::from_micros(micros)),
        };

        let ranges: Vec<Range> = if self.included_ranges.is_empty() {
            vec![Range::whole(text)]
        } else {
            self.included_ranges.iter().filter(|range| !range.is_empty()).copied().collect()
        };
        let old_root = old_tree
            .filter(|old| old.included_ranges() == self.included_ranges.as_slice())
            .map(|old| old.root().clone());
        let reusing = old_root.is_some();
        debug!(
            language = language.name(),
            len = text.len(),
            reusing,
            "parse started"
        );

        let lexer = self.lexer.get_or_insert_with(|| Lexer::new(&language));
        let input = LexInput { text, ranges: &ranges };
        let session = Session::new(
            &language,
            input,
            lexer,
            &mut self.stack,
            old_root,
            &self.cancellation.0,
            deadline,
        );
        let result = session.run();
        self.stack.clear();
        let root = result.inspect_err(|error| debug!(%error, "parse aborted"))?;

        debug!(
            nodes = root.node_count(),
            errors = root.has_error(),
            "parse finished"
        );
        Ok(Tree::new(root, language, Length::of(text), self.included_ranges.clone()))
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("language", &self.language.as_ref().map(Language::name))
            .field("timeout_micros", &self.timeout_micros)
            .field("included_ranges", &self.included_ranges)
            .finish()
    }
}
