//! Symbol and field identifiers
//!
//! Symbols are dense `u16` ids assigned by the grammar compiler in a fixed
//! order: the end-of-input marker, lexical tokens, external tokens,
//! non-terminals, then alias-only names. Two ids are reserved outside the
//! table for nodes the runtime synthesizes.

use smol_str::SmolStr;

/// A grammar symbol (terminal, non-terminal or alias)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u16);

impl Symbol {
    /// End of input
    pub const END: Symbol = Symbol(0);
    /// Unparseable input, both as a leaf and as a wrapping node
    pub const ERROR: Symbol = Symbol(u16::MAX - 1);

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }
}

/// A field name id. Ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u16);

/// Parser state id
pub type StateId = u16;

/// What role a symbol plays in the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SymbolKind {
    Terminal = 0,
    External = 1,
    NonTerminal = 2,
    /// Appears only as an alias name
    Alias = 3,
}

impl SymbolKind {
    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Terminal),
            1 => Some(Self::External),
            2 => Some(Self::NonTerminal),
            3 => Some(Self::Alias),
            _ => None,
        }
    }

    pub fn is_token(self) -> bool {
        matches!(self, Self::Terminal | Self::External)
    }
}

/// Display information for one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMetadata {
    pub name: SmolStr,
    /// Hidden symbols are transparent: their children are shown in their place
    pub visible: bool,
    /// Named symbols come from grammar rules; anonymous ones from string literals
    pub named: bool,
    pub kind: SymbolKind,
}

impl SymbolMetadata {
    pub(crate) const FLAG_VISIBLE: u8 = 0b01;
    pub(crate) const FLAG_NAMED: u8 = 0b10;

    pub(crate) fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.visible {
            flags |= Self::FLAG_VISIBLE;
        }
        if self.named {
            flags |= Self::FLAG_NAMED;
        }
        flags
    }

    pub(crate) fn error() -> Self {
        Self {
            name: SmolStr::new_static("ERROR"),
            visible: true,
            named: true,
            kind: SymbolKind::NonTerminal,
        }
    }
}
