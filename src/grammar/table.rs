//! Parse table representation
//!
//! Actions for (state, terminal) pairs live in one flat pool; each table cell
//! is a `(start, len)` window into it. A cell with more than one action is a
//! conflict the grammar compiler could not resolve, and the runtime forks on
//! it. Non-terminal transitions live in a dense goto matrix.

use smallvec::SmallVec;

use super::symbol::{FieldId, StateId, Symbol};
use crate::error::LoadError;

/// Sentinel for an empty goto cell
pub const NO_STATE: StateId = StateId::MAX;

/// One automaton action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseAction {
    Shift {
        state: StateId,
    },
    Reduce {
        symbol: Symbol,
        child_count: u16,
        production_id: u16,
        dynamic_precedence: i16,
    },
    Accept,
}

pub(crate) type ActionList = SmallVec<[ParseAction; 2]>;

/// Window into the action pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ActionEntry {
    pub start: u32,
    pub len: u16,
}

/// Tokens the lexer may produce in a state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LexMode {
    /// Internal token symbols, sorted, extras included
    pub tokens: Vec<Symbol>,
    /// Indices into the grammar's external token list, sorted
    pub externals: Vec<u16>,
}

impl LexMode {
    pub fn accepts(&self, symbol: Symbol) -> bool {
        self.tokens.binary_search(&symbol).is_ok()
    }
}

/// A field name attached to a structural child position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEntry {
    pub field: FieldId,
    pub child_index: u16,
}

/// Per-production data the tree needs after a reduction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionInfo {
    pub symbol: Symbol,
    pub child_count: u16,
    pub dynamic_precedence: i16,
    pub fields: Vec<FieldEntry>,
    /// `(structural child index, alias symbol)`
    pub aliases: Vec<(u16, Symbol)>,
}

impl ProductionInfo {
    pub fn alias_at(&self, child_index: usize) -> Option<Symbol> {
        self.aliases
            .iter()
            .find(|(index, _)| usize::from(*index) == child_index)
            .map(|(_, symbol)| *symbol)
    }

    pub fn field_at(&self, child_index: usize) -> Option<FieldId> {
        self.fields
            .iter()
            .find(|entry| usize::from(entry.child_index) == child_index)
            .map(|entry| entry.field)
    }
}

/// The compiled LR automaton
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseTable {
    pub(crate) state_count: usize,
    pub(crate) terminal_count: usize,
    pub(crate) nonterminal_count: usize,
    pub(crate) actions: Vec<ParseAction>,
    pub(crate) entries: Vec<ActionEntry>,
    pub(crate) gotos: Vec<StateId>,
    pub(crate) lex_modes: Vec<LexMode>,
    pub(crate) state_lex_modes: Vec<u16>,
}

impl ParseTable {
    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal_count
    }

    /// Actions for a terminal in a state. Empty for unknown pairs and for
    /// symbols outside the terminal range (such as `ERROR`).
    pub fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction] {
        let state = usize::from(state);
        let terminal = symbol.index();
        if state >= self.state_count || terminal >= self.terminal_count {
            return &[];
        }
        let entry = self.entries[state * self.terminal_count + terminal];
        let start = entry.start as usize;
        &self.actions[start..start + usize::from(entry.len)]
    }

    pub fn has_actions(&self, state: StateId, symbol: Symbol) -> bool {
        !self.actions(state, symbol).is_empty()
    }

    /// Successor state after reducing to a non-terminal
    pub fn goto(&self, state: StateId, symbol: Symbol) -> Option<StateId> {
        let state = usize::from(state);
        let offset = symbol.index().checked_sub(self.terminal_count)?;
        if state >= self.state_count || offset >= self.nonterminal_count {
            return None;
        }
        let next = self.gotos[state * self.nonterminal_count + offset];
        (next != NO_STATE).then_some(next)
    }

    pub fn lex_mode_id(&self, state: StateId) -> u16 {
        self.state_lex_modes
            .get(usize::from(state))
            .copied()
            .unwrap_or_default()
    }

    pub fn lex_mode(&self, state: StateId) -> &LexMode {
        &self.lex_modes[usize::from(self.lex_mode_id(state))]
    }

    /// Bounds-check every cross reference.
    pub(crate) fn validate(
        &self,
        production_count: usize,
        external_count: usize,
    ) -> Result<(), LoadError> {
        if self.state_count == 0 || self.state_count >= usize::from(NO_STATE) {
            return Err(LoadError::corrupt(format!(
                "state count {} out of range",
                self.state_count
            )));
        }
        if self.entries.len() != self.state_count * self.terminal_count {
            return Err(LoadError::corrupt("action entry matrix has wrong size"));
        }
        if self.gotos.len() != self.state_count * self.nonterminal_count {
            return Err(LoadError::corrupt("goto matrix has wrong size"));
        }
        if self.state_lex_modes.len() != self.state_count {
            return Err(LoadError::corrupt("lex mode map has wrong size"));
        }
        for entry in &self.entries {
            let end = entry.start as usize + usize::from(entry.len);
            if end > self.actions.len() {
                return Err(LoadError::corrupt(format!(
                    "action window {}..{end} exceeds pool of {}",
                    entry.start,
                    self.actions.len()
                )));
            }
        }
        let nonterminals = self.terminal_count..self.terminal_count + self.nonterminal_count;
        for action in &self.actions {
            match *action {
                ParseAction::Shift { state } if usize::from(state) >= self.state_count => {
                    return Err(LoadError::corrupt(format!("shift to unknown state {state}")));
                }
                ParseAction::Reduce {
                    symbol,
                    production_id,
                    ..
                } => {
                    if !nonterminals.contains(&symbol.index()) {
                        return Err(LoadError::corrupt(format!(
                            "reduce to non-nonterminal symbol {}",
                            symbol.0
                        )));
                    }
                    if usize::from(production_id) >= production_count {
                        return Err(LoadError::corrupt(format!(
                            "reduce by unknown production {production_id}"
                        )));
                    }
                }
                _ => {}
            }
        }
        if let Some(bad) = self
            .gotos
            .iter()
            .find(|&&state| state != NO_STATE && usize::from(state) >= self.state_count)
        {
            return Err(LoadError::corrupt(format!("goto to unknown state {bad}")));
        }
        if let Some(bad) = self
            .state_lex_modes
            .iter()
            .find(|&&mode| usize::from(mode) >= self.lex_modes.len())
        {
            return Err(LoadError::corrupt(format!("unknown lex mode {bad}")));
        }
        for mode in &self.lex_modes {
            if mode.tokens.iter().any(|t| t.index() >= self.terminal_count) {
                return Err(LoadError::corrupt("lex mode lists a non-terminal"));
            }
            if mode.externals.iter().any(|&e| usize::from(e) >= external_count) {
                return Err(LoadError::corrupt("lex mode lists an unknown external token"));
            }
        }
        Ok(())
    }
}
