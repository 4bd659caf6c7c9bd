//! The compiled grammar handed to parsers
//!
//! A [`Language`] bundles the symbol table, field names, productions, parse
//! table and lexical grammar behind an `Arc`. Cloning is cheap and every
//! clone refers to the same grammar; [`Language::same_grammar`] compares
//! identity, which is how the parser checks that a previous tree belongs to
//! the current grammar.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use smol_str::SmolStr;

use super::artifact;
use super::lexical::{LexicalGrammar, Nfa, TokenConflictPolicy, TokenRule};
use super::symbol::{FieldId, Symbol, SymbolKind, SymbolMetadata};
use super::table::{ParseTable, ProductionInfo};
use crate::error::LoadError;
use crate::lexer::ExternalScanner;

/// Creates a fresh external scanner for each parser
pub type ScannerFactory = Arc<dyn Fn() -> Box<dyn ExternalScanner> + Send + Sync>;

static ERROR_METADATA: Lazy<SymbolMetadata> = Lazy::new(SymbolMetadata::error);

/// Raw grammar data, as produced by the compiler or read from an artifact
#[derive(Debug, Clone)]
pub(crate) struct LanguageParts {
    pub name: SmolStr,
    pub policy: TokenConflictPolicy,
    pub symbols: Vec<SymbolMetadata>,
    pub field_names: Vec<SmolStr>,
    pub terminal_count: u16,
    pub external_tokens: Vec<Symbol>,
    pub extras: Vec<Symbol>,
    pub word_token: Option<Symbol>,
    pub nfa: Nfa,
    pub token_rules: Vec<TokenRule>,
    pub productions: Vec<ProductionInfo>,
    pub table: ParseTable,
}

#[derive(Debug)]
pub(crate) struct LanguageInner {
    pub name: SmolStr,
    pub symbols: Vec<SymbolMetadata>,
    pub field_names: Vec<SmolStr>,
    pub terminal_count: usize,
    pub external_tokens: Vec<Symbol>,
    pub extras: Vec<Symbol>,
    pub productions: Vec<ProductionInfo>,
    pub table: ParseTable,
    pub lexical: LexicalGrammar,
    extra_flags: Vec<bool>,
}

/// A compiled, immutable grammar
#[derive(Clone)]
pub struct Language {
    inner: Arc<LanguageInner>,
    scanner: Option<ScannerFactory>,
}

impl Language {
    /// Validate raw parts and derive lookup tables.
    pub(crate) fn from_parts(parts: LanguageParts) -> Result<Self, LoadError> {
        let symbol_count = parts.symbols.len();
        let terminal_count = usize::from(parts.terminal_count);
        if symbol_count == 0 || symbol_count >= Symbol::ERROR.index() {
            return Err(LoadError::corrupt(format!(
                "symbol count {symbol_count} out of range"
            )));
        }
        if terminal_count == 0 || terminal_count > symbol_count {
            return Err(LoadError::corrupt("terminal count exceeds symbol count"));
        }
        if parts.symbols[..terminal_count]
            .iter()
            .any(|meta| !meta.kind.is_token())
        {
            return Err(LoadError::corrupt("non-token symbol in terminal range"));
        }
        let nonterminal_count = parts.symbols[terminal_count..]
            .iter()
            .take_while(|meta| meta.kind == SymbolKind::NonTerminal)
            .count();
        if parts.symbols[terminal_count + nonterminal_count..]
            .iter()
            .any(|meta| meta.kind != SymbolKind::Alias)
        {
            return Err(LoadError::corrupt("symbols out of order"));
        }
        if parts.table.terminal_count != terminal_count
            || parts.table.nonterminal_count != nonterminal_count
        {
            return Err(LoadError::corrupt("table dimensions disagree with symbols"));
        }

        let is_terminal = |symbol: &Symbol| symbol.index() < terminal_count;
        if !parts.external_tokens.iter().all(|symbol| {
            is_terminal(symbol) && parts.symbols[symbol.index()].kind == SymbolKind::External
        }) {
            return Err(LoadError::corrupt("external token list names a non-external"));
        }
        if !parts.extras.iter().all(is_terminal) {
            return Err(LoadError::corrupt("extra symbol is not a terminal"));
        }
        if !parts.word_token.iter().all(is_terminal) {
            return Err(LoadError::corrupt("word token is not a terminal"));
        }

        let nonterminals = terminal_count..terminal_count + nonterminal_count;
        for (id, production) in parts.productions.iter().enumerate() {
            let fields_ok = production.fields.iter().all(|entry| {
                entry.field.0 >= 1
                    && usize::from(entry.field.0) <= parts.field_names.len()
                    && entry.child_index < production.child_count
            });
            let aliases_ok = production.aliases.iter().all(|(index, symbol)| {
                *index < production.child_count && symbol.index() < symbol_count
            });
            if !nonterminals.contains(&production.symbol.index()) || !fields_ok || !aliases_ok {
                return Err(LoadError::corrupt(format!("malformed production {id}")));
            }
        }

        parts
            .table
            .validate(parts.productions.len(), parts.external_tokens.len())?;
        let lexical = LexicalGrammar::new(
            parts.token_rules,
            parts.nfa,
            parts.word_token,
            parts.policy,
            terminal_count,
        )?;

        let mut extra_flags = vec![false; terminal_count];
        for extra in &parts.extras {
            extra_flags[extra.index()] = true;
        }

        Ok(Self {
            inner: Arc::new(LanguageInner {
                name: parts.name,
                symbols: parts.symbols,
                field_names: parts.field_names,
                terminal_count,
                external_tokens: parts.external_tokens,
                extras: parts.extras,
                productions: parts.productions,
                table: parts.table,
                lexical,
                extra_flags,
            }),
            scanner: None,
        })
    }

    /// Load a compiled artifact.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        artifact::decode(bytes)
    }

    /// Serialize to the artifact format.
    pub fn to_bytes(&self) -> Vec<u8> {
        artifact::encode(self)
    }

    /// Attach the scanner for this grammar's external tokens.
    pub fn with_external_scanner<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ExternalScanner> + Send + Sync + 'static,
    {
        self.scanner = Some(Arc::new(factory));
        self
    }

    pub(crate) fn with_scanner_factory(mut self, factory: Option<ScannerFactory>) -> Self {
        self.scanner = factory;
        self
    }

    pub(crate) fn new_scanner(&self) -> Option<Box<dyn ExternalScanner>> {
        self.scanner.as_ref().map(|factory| factory())
    }

    pub fn has_external_scanner(&self) -> bool {
        self.scanner.is_some()
    }

    /// Whether both values refer to the same compiled grammar
    pub fn same_grammar(&self, other: &Language) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ===== Metadata =====

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Artifact format version this grammar was loaded with
    pub fn version(&self) -> u16 {
        artifact::FORMAT_VERSION
    }

    pub fn symbol_count(&self) -> usize {
        self.inner.symbols.len()
    }

    pub fn state_count(&self) -> usize {
        self.inner.table.state_count()
    }

    pub fn field_count(&self) -> usize {
        self.inner.field_names.len()
    }

    pub fn symbol_metadata(&self, symbol: Symbol) -> Option<&SymbolMetadata> {
        if symbol == Symbol::ERROR {
            return Some(&ERROR_METADATA);
        }
        self.inner.symbols.get(symbol.index())
    }

    pub fn symbol_name(&self, symbol: Symbol) -> Option<&str> {
        self.symbol_metadata(symbol).map(|meta| meta.name.as_str())
    }

    /// Look up a symbol by its kind name, as used by [`crate::tree::Node::kind`]
    pub fn symbol_for_name(&self, name: &str, named: bool) -> Option<Symbol> {
        if named && name == "ERROR" {
            return Some(Symbol::ERROR);
        }
        self.inner
            .symbols
            .iter()
            .position(|meta| meta.named == named && meta.name == name && meta.visible)
            .or_else(|| {
                self.inner
                    .symbols
                    .iter()
                    .position(|meta| meta.named == named && meta.name == name)
            })
            .map(|index| Symbol(index as u16))
    }

    pub fn is_named(&self, symbol: Symbol) -> bool {
        self.symbol_metadata(symbol).is_some_and(|meta| meta.named)
    }

    pub fn is_visible(&self, symbol: Symbol) -> bool {
        self.symbol_metadata(symbol).is_some_and(|meta| meta.visible)
    }

    pub fn is_extra(&self, symbol: Symbol) -> bool {
        self.inner
            .extra_flags
            .get(symbol.index())
            .copied()
            .unwrap_or(false)
    }

    pub fn is_terminal(&self, symbol: Symbol) -> bool {
        symbol.index() < self.inner.terminal_count
    }

    pub fn field_name_for_id(&self, field: FieldId) -> Option<&str> {
        let index = usize::from(field.0).checked_sub(1)?;
        self.inner.field_names.get(index).map(SmolStr::as_str)
    }

    pub fn field_id_for_name(&self, name: &str) -> Option<FieldId> {
        self.inner
            .field_names
            .iter()
            .position(|field| field == name)
            .map(|index| FieldId(index as u16 + 1))
    }

    pub fn external_tokens(&self) -> &[Symbol] {
        &self.inner.external_tokens
    }

    pub fn extras(&self) -> &[Symbol] {
        &self.inner.extras
    }

    pub fn token_conflict_policy(&self) -> TokenConflictPolicy {
        self.inner.lexical.policy()
    }

    // ===== Crate-internal tables =====

    pub(crate) fn inner(&self) -> &LanguageInner {
        &self.inner
    }

    pub(crate) fn table(&self) -> &ParseTable {
        &self.inner.table
    }

    pub(crate) fn lexical(&self) -> &LexicalGrammar {
        &self.inner.lexical
    }

    pub(crate) fn production(&self, id: u16) -> Option<&ProductionInfo> {
        self.inner.productions.get(usize::from(id))
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        self.same_grammar(other)
    }
}

impl Eq for Language {}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.inner.name)
            .field("symbols", &self.inner.symbols.len())
            .field("states", &self.inner.table.state_count())
            .field("external_scanner", &self.scanner.is_some())
            .finish()
    }
}

/// Process-wide handle to a compiled grammar artifact
///
/// Handles are `Copy` and compare by the identity of the artifact they
/// point at. [`LanguageHandle::load`] validates the artifact.
#[derive(Clone, Copy)]
pub struct LanguageHandle {
    artifact: &'static [u8],
    scanner: Option<fn() -> Box<dyn ExternalScanner>>,
}

impl LanguageHandle {
    pub const fn from_static(artifact: &'static [u8]) -> Self {
        Self {
            artifact,
            scanner: None,
        }
    }

    /// Attach the scanner constructor used for the grammar's external tokens.
    pub fn with_scanner(mut self, scanner: fn() -> Box<dyn ExternalScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn artifact(&self) -> &'static [u8] {
        self.artifact
    }

    pub fn load(self) -> Result<Language, LoadError> {
        let language = Language::from_bytes(self.artifact)?;
        Ok(match self.scanner {
            Some(scanner) => language.with_external_scanner(scanner),
            None => language,
        })
    }
}

impl PartialEq for LanguageHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.artifact, other.artifact)
    }
}

impl Eq for LanguageHandle {}

impl fmt::Debug for LanguageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageHandle")
            .field("artifact_len", &self.artifact.len())
            .field("scanner", &self.scanner.is_some())
            .finish()
    }
}
