//! Table-driven lexer
//!
//! The parser asks for one token at a time, passing the state whose lex mode
//! decides which tokens are acceptable. The lexer tries the external scanner
//! first (when the mode lists external tokens), then every valid token rule,
//! and keeps the best candidate under the grammar's conflict policy.
//!
//! When nothing valid matches it retries with every rule; when even that
//! fails it produces an `ERROR` leaf covering the unrecognized characters.
//! Each leaf remembers how far past its end the lexer looked, which is what
//! edit invalidation relies on.

mod scanner;

use std::sync::Arc;

use tracing::trace;

pub use scanner::{ExternalScanner, MAX_SCANNER_STATE, ScanCursor};

use crate::base::{Length, Range};
use crate::grammar::lexical::{Candidate, NfaScratch, TokenMatcher, decode_char};
use crate::grammar::{Language, LexMode, StateId, Symbol};
use crate::tree::subtree::{Flags, LeafSpec, Subtree};

/// Text and the byte ranges of it that are parsed
#[derive(Debug, Clone, Copy)]
pub(crate) struct LexInput<'a> {
    pub text: &'a [u8],
    /// Sorted, non-overlapping and non-empty ranges
    pub ranges: &'a [Range],
}

/// One token request from the parser
#[derive(Debug, Clone, Copy)]
pub(crate) struct LexRequest<'a> {
    /// Absolute end of the previous token
    pub position: Length,
    pub lex_state: StateId,
    /// Scanner state after the last external token on this parse version
    pub external_state: Option<&'a [u8]>,
    /// Ignore the lex mode and try every rule
    pub error_mode: bool,
}

/// Where the next token may start
struct Window<'a> {
    padding: Length,
    /// Absolute byte offset of the token start
    start: usize,
    /// Text from the token start to the end of its included range
    slice: &'a [u8],
    at_end: bool,
}

fn window<'a>(input: &LexInput<'a>, position: Length) -> Window<'a> {
    let text = input.text;
    let offset = position.byte_len().min(text.len());
    let next = input
        .ranges
        .iter()
        .find(|range| range.end_byte.min(text.len()) > offset);
    match next {
        Some(range) => {
            let end = range.end_byte.min(text.len());
            let start = range.start_byte.max(offset).min(end);
            Window {
                padding: Length::of(&text[offset..start]),
                start,
                slice: &text[start..end],
                at_end: false,
            }
        }
        None => Window {
            padding: Length::of(&text[offset..]),
            start: text.len(),
            slice: &[],
            at_end: true,
        },
    }
}

pub(crate) struct Lexer {
    scratch: NfaScratch,
    scanner: Option<Box<dyn ExternalScanner>>,
    state_buffer: Vec<u8>,
}

impl Lexer {
    pub fn new(language: &Language) -> Self {
        Self {
            scratch: NfaScratch::default(),
            scanner: language.new_scanner(),
            state_buffer: Vec::new(),
        }
    }

    /// Produce the next token. Never fails: unrecognized input becomes an
    /// `ERROR` leaf and the end of input an `END` leaf.
    ///
    /// Tokens lexed in error mode ignored the lex mode, so they are marked
    /// fragile and never reused by a later parse.
    pub fn lex(&mut self, language: &Language, input: &LexInput<'_>, request: LexRequest<'_>) -> Subtree {
        let mut token = self.next_token(language, input, &request);
        if request.error_mode {
            token.make_mut().flags.set(Flags::FRAGILE, true);
        }
        token
    }

    fn next_token(&mut self, language: &Language, input: &LexInput<'_>, request: &LexRequest<'_>) -> Subtree {
        let window = window(input, request.position);
        let mode = language.table().lex_mode(request.lex_state);
        let mut examined = 0usize;

        if !mode.externals.is_empty() {
            if let Some(leaf) = self.scan_external(language, &window, mode, request, &mut examined) {
                return leaf;
            }
        }

        if window.at_end || window.slice.is_empty() {
            return self.leaf(language, &window, Symbol::END, 0, examined.max(1), request.lex_state, None);
        }

        let best = if request.error_mode {
            None
        } else {
            self.best_candidate(language, window.slice, Some(mode), &mut examined)
        };
        let best = best.or_else(|| self.best_candidate(language, window.slice, None, &mut examined));
        if let Some(candidate) = best {
            return self.leaf(
                language,
                &window,
                candidate.symbol,
                candidate.len,
                examined,
                request.lex_state,
                None,
            );
        }

        // Nothing matches: skip characters until some rule does.
        let mut skipped = 0;
        while let Some((_, width)) = decode_char(&window.slice[skipped..]) {
            skipped += width;
            let mut probe = 0;
            let rest = &window.slice[skipped..];
            if rest.is_empty() || self.best_candidate(language, rest, None, &mut probe).is_some() {
                examined = examined.max(skipped + probe);
                break;
            }
            examined = examined.max(skipped + probe);
        }
        let size = Length::of(&window.slice[..skipped]);
        let lookahead = lookahead_bytes(examined, skipped, skipped == window.slice.len());
        trace!(start = window.start, len = skipped, "unrecognized characters");
        Subtree::error_leaf(window.padding, size, lookahead, request.lex_state)
    }

    fn scan_external(
        &mut self,
        language: &Language,
        window: &Window<'_>,
        mode: &LexMode,
        request: &LexRequest<'_>,
        examined: &mut usize,
    ) -> Option<Subtree> {
        let scanner = self.scanner.as_mut()?;
        let externals = language.external_tokens();
        let mut valid = vec![false; externals.len()];
        for &index in &mode.externals {
            if let Some(slot) = valid.get_mut(usize::from(index)) {
                *slot = true;
            }
        }
        scanner.deserialize(request.external_state.unwrap_or(&[]));
        let start_point = (request.position + window.padding).extent;
        let mut cursor = ScanCursor::new(window.slice, start_point);
        let found = scanner.scan(&mut cursor, &valid);
        *examined = (*examined).max(cursor.examined());

        let index = found.filter(|&index| valid.get(index).copied().unwrap_or(false))?;
        let len = cursor.token_len().min(window.slice.len());
        if len == 0 && request.error_mode {
            return None;
        }
        self.state_buffer.clear();
        scanner.serialize(&mut self.state_buffer);
        self.state_buffer.truncate(MAX_SCANNER_STATE);
        let state: Arc<[u8]> = Arc::from(self.state_buffer.as_slice());
        let symbol = externals[index];
        let examined = *examined;
        Some(self.leaf(language, window, symbol, len, examined, request.lex_state, Some(state)))
    }

    /// Best matching rule, restricted to `mode` when given. Updates
    /// `examined` with the bytes every attempted rule looked at.
    fn best_candidate(
        &mut self,
        language: &Language,
        slice: &[u8],
        mode: Option<&LexMode>,
        examined: &mut usize,
    ) -> Option<Candidate> {
        let lexical = language.lexical();
        let policy = lexical.policy();
        let mut best: Option<Candidate> = None;
        let mut offer = |candidate: Candidate| {
            if best.is_none_or(|current| policy.prefers(&candidate, &current)) {
                best = Some(candidate);
            }
        };

        for (order, rule) in lexical.rules.iter().enumerate() {
            if let Some(mode) = mode {
                if rule.is_keyword || !mode.accepts(rule.symbol) {
                    continue;
                }
            }
            let outcome = lexical.run(rule, slice, &mut self.scratch);
            *examined = (*examined).max(outcome.examined + usize::from(outcome.hit_end));
            if outcome.len > 0 {
                offer(Candidate {
                    symbol: rule.symbol,
                    len: outcome.len,
                    precedence: rule.precedence,
                    literal: matches!(rule.matcher, TokenMatcher::Literal(_)),
                    order,
                });
            }
        }

        let Some(mode) = mode else {
            return best;
        };
        let word = lexical.word_token().filter(|_| lexical.has_keywords());
        let Some(word_rule) = word.and_then(|word| lexical.rule(word)) else {
            return best;
        };
        let outcome = lexical.run(word_rule, slice, &mut self.scratch);
        *examined = (*examined).max(outcome.examined + usize::from(outcome.hit_end));
        if outcome.len == 0 {
            return best;
        }
        let keyword = lexical
            .keyword(&slice[..outcome.len])
            .filter(|&keyword| mode.accepts(keyword));
        if let Some(keyword) = keyword {
            if let Some(index) = lexical.rule_index(keyword) {
                let rule = &lexical.rules[index];
                let promoted = Candidate {
                    symbol: keyword,
                    len: outcome.len,
                    precedence: rule.precedence,
                    literal: true,
                    order: index,
                };
                // The keyword replaces the identifier reading of the same text.
                best = match best {
                    Some(current) if current.symbol == word_rule.symbol => Some(promoted),
                    Some(current) if !policy.prefers(&promoted, &current) => Some(current),
                    _ => Some(promoted),
                };
            }
        }
        best
    }

    #[allow(clippy::too_many_arguments)]
    fn leaf(
        &self,
        language: &Language,
        window: &Window<'_>,
        symbol: Symbol,
        len: usize,
        examined: usize,
        lex_state: StateId,
        external_state: Option<Arc<[u8]>>,
    ) -> Subtree {
        let lookahead = lookahead_bytes(examined, len, len == window.slice.len());
        trace!(
            symbol = language.symbol_name(symbol).unwrap_or("?"),
            start = window.start,
            len,
            lookahead,
            "lexed token"
        );
        Subtree::leaf(LeafSpec {
            symbol,
            padding: window.padding,
            size: Length::of(&window.slice[..len]),
            lookahead_bytes: lookahead,
            lex_state,
            visible: language.is_visible(symbol),
            named: language.is_named(symbol),
            external_state,
        })
    }
}

/// Bytes examined past a token of `len` bytes. A token that reaches the end
/// of its range always depends on what follows.
fn lookahead_bytes(examined: usize, len: usize, reached_end: bool) -> u32 {
    let beyond = examined.saturating_sub(len);
    let beyond = if reached_end { beyond.max(1) } else { beyond };
    u32::try_from(beyond).unwrap_or(u32::MAX)
}
