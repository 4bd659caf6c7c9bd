//! Binary artifact format for compiled grammars
//!
//! Layout (little-endian): the magic `SITR`, a `u16` format version, then the
//! sections in fixed order: name, conflict policy, symbols, fields, terminal
//! count, external tokens, extras, word token, NFA, token rules, productions,
//! lex modes, table dimensions, per-state lex modes, the action pool, action
//! windows and the goto matrix. Nothing may follow the last section.
//!
//! Decoding never trusts a count or an index: every read is length-checked and
//! the decoded parts go through the same validation as freshly compiled
//! grammars, so a damaged artifact is reported as
//! [`LoadError::CorruptArtifact`] instead of panicking later.

use bytes::{Buf, BufMut};
use smol_str::SmolStr;

use super::language::{Language, LanguageParts};
use super::lexical::{NfaState, TokenConflictPolicy, TokenMatcher, TokenRule};
use super::symbol::{FieldId, Symbol, SymbolKind, SymbolMetadata};
use super::table::{ActionEntry, FieldEntry, LexMode, ParseAction, ParseTable, ProductionInfo};
use crate::error::LoadError;

pub const MAGIC: &[u8; 4] = b"SITR";
/// Version written by this runtime
pub const FORMAT_VERSION: u16 = 1;
/// Oldest version this runtime reads
pub const MIN_SUPPORTED_VERSION: u16 = 1;

const NO_WORD: u16 = u16::MAX;

const ACTION_SHIFT: u8 = 0;
const ACTION_REDUCE: u8 = 1;
const ACTION_ACCEPT: u8 = 2;

const NFA_CLASS: u8 = 0;
const NFA_SPLIT: u8 = 1;
const NFA_ACCEPT: u8 = 2;

const MATCHER_LITERAL: u8 = 0;
const MATCHER_PATTERN: u8 = 1;

// ============================================================================
// Encoding
// ============================================================================

pub(crate) fn encode(language: &Language) -> Vec<u8> {
    let inner = language.inner();
    let lexical = &inner.lexical;
    let table = &inner.table;
    let mut out = Vec::new();

    out.put_slice(MAGIC);
    out.put_u16_le(FORMAT_VERSION);
    put_str(&mut out, &inner.name);
    out.put_u8(lexical.policy.to_u8());

    out.put_u16_le(inner.symbols.len() as u16);
    for meta in &inner.symbols {
        put_str(&mut out, &meta.name);
        out.put_u8(meta.flags());
        out.put_u8(meta.kind as u8);
    }

    out.put_u16_le(inner.field_names.len() as u16);
    for name in &inner.field_names {
        put_str(&mut out, name);
    }

    out.put_u16_le(inner.terminal_count as u16);
    put_symbols(&mut out, &inner.external_tokens);
    put_symbols(&mut out, &inner.extras);
    out.put_u16_le(lexical.word_token.map_or(NO_WORD, |word| word.0));

    out.put_u32_le(lexical.nfa.states.len() as u32);
    for state in &lexical.nfa.states {
        match state {
            NfaState::Class { ranges, next } => {
                out.put_u8(NFA_CLASS);
                out.put_u16_le(ranges.len() as u16);
                for &(lo, hi) in ranges {
                    out.put_u32_le(lo);
                    out.put_u32_le(hi);
                }
                out.put_u32_le(*next);
            }
            NfaState::Split { first, second } => {
                out.put_u8(NFA_SPLIT);
                out.put_u32_le(*first);
                out.put_u32_le(*second);
            }
            NfaState::Accept => out.put_u8(NFA_ACCEPT),
        }
    }

    out.put_u16_le(lexical.rules.len() as u16);
    for rule in &lexical.rules {
        out.put_u16_le(rule.symbol.0);
        match &rule.matcher {
            TokenMatcher::Literal(text) => {
                out.put_u8(MATCHER_LITERAL);
                out.put_u32_le(text.len() as u32);
                out.put_slice(text);
            }
            TokenMatcher::Pattern(start) => {
                out.put_u8(MATCHER_PATTERN);
                out.put_u32_le(*start);
            }
        }
        out.put_i16_le(rule.precedence);
        out.put_u8(u8::from(rule.is_keyword));
    }

    out.put_u16_le(inner.productions.len() as u16);
    for production in &inner.productions {
        out.put_u16_le(production.symbol.0);
        out.put_u16_le(production.child_count);
        out.put_i16_le(production.dynamic_precedence);
        out.put_u16_le(production.fields.len() as u16);
        for entry in &production.fields {
            out.put_u16_le(entry.field.0);
            out.put_u16_le(entry.child_index);
        }
        out.put_u16_le(production.aliases.len() as u16);
        for (index, symbol) in &production.aliases {
            out.put_u16_le(*index);
            out.put_u16_le(symbol.0);
        }
    }

    out.put_u16_le(table.lex_modes.len() as u16);
    for mode in &table.lex_modes {
        put_symbols(&mut out, &mode.tokens);
        out.put_u16_le(mode.externals.len() as u16);
        for &index in &mode.externals {
            out.put_u16_le(index);
        }
    }

    out.put_u16_le(table.state_count as u16);
    out.put_u16_le(table.nonterminal_count as u16);
    for &mode in &table.state_lex_modes {
        out.put_u16_le(mode);
    }

    out.put_u32_le(table.actions.len() as u32);
    for action in &table.actions {
        match *action {
            ParseAction::Shift { state } => {
                out.put_u8(ACTION_SHIFT);
                out.put_u16_le(state);
            }
            ParseAction::Reduce {
                symbol,
                child_count,
                production_id,
                dynamic_precedence,
            } => {
                out.put_u8(ACTION_REDUCE);
                out.put_u16_le(symbol.0);
                out.put_u16_le(child_count);
                out.put_u16_le(production_id);
                out.put_i16_le(dynamic_precedence);
            }
            ParseAction::Accept => out.put_u8(ACTION_ACCEPT),
        }
    }
    for entry in &table.entries {
        out.put_u32_le(entry.start);
        out.put_u16_le(entry.len);
    }
    for &state in &table.gotos {
        out.put_u16_le(state);
    }
    out
}

fn put_str(out: &mut Vec<u8>, text: &str) {
    out.put_u32_le(text.len() as u32);
    out.put_slice(text.as_bytes());
}

fn put_symbols(out: &mut Vec<u8>, symbols: &[Symbol]) {
    out.put_u16_le(symbols.len() as u16);
    for symbol in symbols {
        out.put_u16_le(symbol.0);
    }
}

// ============================================================================
// Decoding
// ============================================================================

pub(crate) fn decode(bytes: &[u8]) -> Result<Language, LoadError> {
    let mut reader = Reader { buf: bytes };

    let magic = reader.take(MAGIC.len(), "magic")?;
    if magic != MAGIC {
        return Err(LoadError::corrupt("bad magic"));
    }
    let version = reader.u16("version")?;
    if !(MIN_SUPPORTED_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(LoadError::IncompatibleVersion {
            found: version,
            min: MIN_SUPPORTED_VERSION,
            max: FORMAT_VERSION,
        });
    }

    let name = reader.string("name")?;
    let policy = TokenConflictPolicy::from_u8(reader.u8("policy")?)
        .ok_or_else(|| LoadError::corrupt("unknown conflict policy"))?;

    let symbol_count = reader.u16("symbol count")?;
    let mut symbols = reader.vec(usize::from(symbol_count), 6);
    for _ in 0..symbol_count {
        let name = reader.string("symbol name")?;
        let flags = reader.u8("symbol flags")?;
        let kind = SymbolKind::from_u8(reader.u8("symbol kind")?)
            .ok_or_else(|| LoadError::corrupt("unknown symbol kind"))?;
        symbols.push(SymbolMetadata {
            name,
            visible: flags & SymbolMetadata::FLAG_VISIBLE != 0,
            named: flags & SymbolMetadata::FLAG_NAMED != 0,
            kind,
        });
    }

    let field_count = reader.u16("field count")?;
    let mut field_names = reader.vec(usize::from(field_count), 4);
    for _ in 0..field_count {
        field_names.push(reader.string("field name")?);
    }

    let terminal_count = reader.u16("terminal count")?;
    let external_tokens = reader.symbols("external tokens")?;
    let extras = reader.symbols("extras")?;
    let word_token = match reader.u16("word token")? {
        NO_WORD => None,
        raw => Some(Symbol(raw)),
    };

    let nfa_len = reader.u32("nfa length")?;
    let mut nfa = super::lexical::Nfa::default();
    for _ in 0..nfa_len {
        let state = match reader.u8("nfa tag")? {
            NFA_CLASS => {
                let count = reader.u16("class size")?;
                let mut ranges = reader.vec(usize::from(count), 8);
                for _ in 0..count {
                    ranges.push((reader.u32("range")?, reader.u32("range")?));
                }
                NfaState::Class {
                    ranges,
                    next: reader.u32("class target")?,
                }
            }
            NFA_SPLIT => NfaState::Split {
                first: reader.u32("split target")?,
                second: reader.u32("split target")?,
            },
            NFA_ACCEPT => NfaState::Accept,
            tag => return Err(LoadError::corrupt(format!("unknown NFA tag {tag}"))),
        };
        nfa.push(state);
    }

    let rule_count = reader.u16("token rule count")?;
    let mut token_rules = reader.vec(usize::from(rule_count), 10);
    for _ in 0..rule_count {
        let symbol = Symbol(reader.u16("token symbol")?);
        let matcher = match reader.u8("matcher tag")? {
            MATCHER_LITERAL => {
                let len = reader.u32("literal length")? as usize;
                TokenMatcher::Literal(reader.take(len, "literal")?.into())
            }
            MATCHER_PATTERN => TokenMatcher::Pattern(reader.u32("pattern start")?),
            tag => return Err(LoadError::corrupt(format!("unknown matcher tag {tag}"))),
        };
        token_rules.push(TokenRule {
            symbol,
            matcher,
            precedence: reader.i16("token precedence")?,
            is_keyword: reader.u8("keyword flag")? != 0,
        });
    }

    let production_count = reader.u16("production count")?;
    let mut productions = reader.vec(usize::from(production_count), 10);
    for _ in 0..production_count {
        let symbol = Symbol(reader.u16("production symbol")?);
        let child_count = reader.u16("child count")?;
        let dynamic_precedence = reader.i16("dynamic precedence")?;
        let field_len = reader.u16("field map length")?;
        let mut fields = reader.vec(usize::from(field_len), 4);
        for _ in 0..field_len {
            fields.push(FieldEntry {
                field: FieldId(reader.u16("field id")?),
                child_index: reader.u16("field child")?,
            });
        }
        let alias_len = reader.u16("alias length")?;
        let mut aliases = reader.vec(usize::from(alias_len), 4);
        for _ in 0..alias_len {
            aliases.push((reader.u16("alias child")?, Symbol(reader.u16("alias symbol")?)));
        }
        productions.push(ProductionInfo {
            symbol,
            child_count,
            dynamic_precedence,
            fields,
            aliases,
        });
    }

    let mode_count = reader.u16("lex mode count")?;
    let mut lex_modes = reader.vec(usize::from(mode_count), 4);
    for _ in 0..mode_count {
        let tokens = reader.symbols("lex mode tokens")?;
        let external_len = reader.u16("lex mode externals")?;
        let mut externals = reader.vec(usize::from(external_len), 2);
        for _ in 0..external_len {
            externals.push(reader.u16("lex mode external")?);
        }
        lex_modes.push(LexMode { tokens, externals });
    }

    let state_count = usize::from(reader.u16("state count")?);
    let nonterminal_count = usize::from(reader.u16("nonterminal count")?);
    let mut state_lex_modes = reader.vec(state_count, 2);
    for _ in 0..state_count {
        state_lex_modes.push(reader.u16("state lex mode")?);
    }

    let action_count = reader.u32("action count")?;
    let mut actions = reader.vec(action_count as usize, 3);
    for _ in 0..action_count {
        let action = match reader.u8("action tag")? {
            ACTION_SHIFT => ParseAction::Shift {
                state: reader.u16("shift state")?,
            },
            ACTION_REDUCE => ParseAction::Reduce {
                symbol: Symbol(reader.u16("reduce symbol")?),
                child_count: reader.u16("reduce count")?,
                production_id: reader.u16("reduce production")?,
                dynamic_precedence: reader.i16("reduce precedence")?,
            },
            ACTION_ACCEPT => ParseAction::Accept,
            tag => return Err(LoadError::corrupt(format!("unknown action tag {tag}"))),
        };
        actions.push(action);
    }

    let entry_count = state_count * usize::from(terminal_count);
    let mut entries = reader.vec(entry_count, 6);
    for _ in 0..entry_count {
        entries.push(ActionEntry {
            start: reader.u32("action window")?,
            len: reader.u16("action window")?,
        });
    }
    let goto_count = state_count * nonterminal_count;
    let mut gotos = reader.vec(goto_count, 2);
    for _ in 0..goto_count {
        gotos.push(reader.u16("goto")?);
    }

    if reader.buf.has_remaining() {
        return Err(LoadError::corrupt(format!(
            "{} trailing bytes",
            reader.buf.remaining()
        )));
    }

    Language::from_parts(LanguageParts {
        name,
        policy,
        symbols,
        field_names,
        terminal_count,
        external_tokens,
        extras,
        word_token,
        nfa,
        token_rules,
        productions,
        table: ParseTable {
            state_count,
            terminal_count: usize::from(terminal_count),
            nonterminal_count,
            actions,
            entries,
            gotos,
            lex_modes,
            state_lex_modes,
        },
    })
}

/// Length-checked little-endian reader
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, len: usize, what: &str) -> Result<(), LoadError> {
        if self.buf.remaining() < len {
            return Err(LoadError::corrupt(format!("truncated while reading {what}")));
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> Result<u8, LoadError> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, what: &str) -> Result<u16, LoadError> {
        self.need(2, what)?;
        Ok(self.buf.get_u16_le())
    }

    fn i16(&mut self, what: &str) -> Result<i16, LoadError> {
        self.need(2, what)?;
        Ok(self.buf.get_i16_le())
    }

    fn u32(&mut self, what: &str) -> Result<u32, LoadError> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], LoadError> {
        self.need(len, what)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn string(&mut self, what: &str) -> Result<SmolStr, LoadError> {
        let len = self.u32(what)? as usize;
        let raw = self.take(len, what)?;
        std::str::from_utf8(raw)
            .map(SmolStr::new)
            .map_err(|_| LoadError::corrupt(format!("{what} is not UTF-8")))
    }

    fn symbols(&mut self, what: &str) -> Result<Vec<Symbol>, LoadError> {
        let count = self.u16(what)?;
        let mut symbols = self.vec(usize::from(count), 2);
        for _ in 0..count {
            symbols.push(Symbol(self.u16(what)?));
        }
        Ok(symbols)
    }

    /// Pre-size a vector without trusting the declared count further than the
    /// remaining input could justify.
    fn vec<T>(&self, count: usize, min_item_size: usize) -> Vec<T> {
        Vec::with_capacity(count.min(self.buf.remaining() / min_item_size.max(1)))
    }
}
