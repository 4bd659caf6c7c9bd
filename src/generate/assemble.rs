//! Turning a prepared grammar into [`LanguageParts`]

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use super::conflicts::TokenConflicts;
use super::lr::{FlatGrammar, FlatProduction, FlatStep, build_table};
use super::pattern::compile;
use super::prepare::{PreparedGrammar, SymbolRef, TokenSource};
use crate::error::GrammarError;
use crate::grammar::language::LanguageParts;
use crate::grammar::lexical::{Nfa, NfaState, TokenMatcher, TokenRule};
use crate::grammar::symbol::{FieldId, Symbol, SymbolKind, SymbolMetadata};
use crate::grammar::table::{FieldEntry, ProductionInfo};

/// Symbol ids handed out by the compiler
struct SymbolLayout {
    token_count: usize,
    external_count: usize,
}

impl SymbolLayout {
    fn terminal_count(&self) -> usize {
        1 + self.token_count + self.external_count
    }

    fn symbol(&self, reference: SymbolRef) -> Symbol {
        let index = match reference {
            SymbolRef::Terminal(index) => 1 + index,
            SymbolRef::External(index) => 1 + self.token_count + index,
            SymbolRef::Variable(index) => self.terminal_count() + index,
        };
        Symbol(index as u16)
    }
}

pub(crate) fn assemble(grammar: PreparedGrammar) -> Result<LanguageParts, GrammarError> {
    let layout = SymbolLayout {
        token_count: grammar.tokens.len(),
        external_count: grammar.externals.len(),
    };
    let terminal_count = layout.terminal_count();
    let base_symbol_count = terminal_count + grammar.variables.len();
    if base_symbol_count >= Symbol::ERROR.index() {
        return Err(GrammarError::TooLarge(format!("{base_symbol_count} symbols")));
    }

    // ===== Symbols =====

    let mut symbols = Vec::with_capacity(base_symbol_count);
    symbols.push(SymbolMetadata {
        name: SmolStr::new_static("end"),
        visible: false,
        named: true,
        kind: SymbolKind::Terminal,
    });
    for token in &grammar.tokens {
        symbols.push(SymbolMetadata {
            name: token.name.clone(),
            visible: token.visible,
            named: token.named,
            kind: SymbolKind::Terminal,
        });
    }
    for name in &grammar.externals {
        symbols.push(SymbolMetadata {
            name: name.clone(),
            visible: !name.starts_with('_'),
            named: true,
            kind: SymbolKind::External,
        });
    }
    for variable in &grammar.variables {
        symbols.push(SymbolMetadata {
            name: variable.name.clone(),
            visible: variable.visible,
            named: true,
            kind: SymbolKind::NonTerminal,
        });
    }

    let mut alias_symbols: IndexMap<(SmolStr, bool), Symbol> = IndexMap::new();
    let mut field_names: Vec<SmolStr> = Vec::new();
    for step in grammar
        .variables
        .iter()
        .flat_map(|variable| variable.productions.iter().flatten())
    {
        if let Some(field) = &step.field {
            if !field_names.contains(field) {
                field_names.push(field.clone());
            }
        }
        if let Some(alias) = &step.alias {
            if alias_symbols.contains_key(alias) {
                continue;
            }
            let existing = symbols
                .iter()
                .position(|meta| meta.visible && meta.named == alias.1 && meta.name == alias.0);
            let symbol = match existing {
                Some(index) => Symbol(index as u16),
                None => {
                    symbols.push(SymbolMetadata {
                        name: alias.0.clone(),
                        visible: true,
                        named: alias.1,
                        kind: SymbolKind::Alias,
                    });
                    Symbol((symbols.len() - 1) as u16)
                }
            };
            alias_symbols.insert(alias.clone(), symbol);
        }
    }
    if symbols.len() >= Symbol::ERROR.index() {
        return Err(GrammarError::TooLarge(format!("{} symbols", symbols.len())));
    }
    field_names.sort();
    let field_id = |name: &SmolStr| {
        let index = field_names.iter().position(|field| field == name).unwrap_or(0);
        FieldId(index as u16 + 1)
    };

    // ===== Productions =====

    let mut flat = Vec::new();
    let mut productions = Vec::new();
    for (index, variable) in grammar.variables.iter().enumerate() {
        let lhs = layout.symbol(SymbolRef::Variable(index));
        for production in &variable.productions {
            let dynamic_precedence = production
                .iter()
                .map(|step| step.dynamic)
                .max_by_key(|level| level.unsigned_abs())
                .unwrap_or(0);
            flat.push(FlatProduction {
                lhs,
                steps: production
                    .iter()
                    .map(|step| FlatStep {
                        symbol: layout.symbol(step.symbol),
                        precedence: step.precedence,
                        assoc: step.assoc,
                    })
                    .collect(),
                dynamic_precedence,
            });
            productions.push(ProductionInfo {
                symbol: lhs,
                child_count: production.len() as u16,
                dynamic_precedence,
                fields: production
                    .iter()
                    .enumerate()
                    .filter_map(|(child, step)| {
                        step.field.as_ref().map(|name| FieldEntry {
                            field: field_id(name),
                            child_index: child as u16,
                        })
                    })
                    .collect(),
                aliases: production
                    .iter()
                    .enumerate()
                    .filter_map(|(child, step)| {
                        let alias = step.alias.as_ref()?;
                        alias_symbols
                            .get(alias)
                            .map(|symbol| (child as u16, *symbol))
                    })
                    .collect(),
            });
        }
    }
    if productions.len() >= usize::from(u16::MAX) {
        return Err(GrammarError::TooLarge(format!(
            "{} productions",
            productions.len()
        )));
    }

    // ===== Tokens =====

    let mut nfa = Nfa::default();
    let accept = nfa.push(NfaState::Accept);
    let mut token_rules = Vec::with_capacity(grammar.tokens.len());
    for (index, token) in grammar.tokens.iter().enumerate() {
        let matcher = match &token.source {
            TokenSource::Literal(text) => TokenMatcher::Literal(text.as_bytes().into()),
            TokenSource::Pattern(ast) => TokenMatcher::Pattern(compile(ast, &mut nfa, accept)),
        };
        token_rules.push(TokenRule {
            symbol: layout.symbol(SymbolRef::Terminal(index)),
            matcher,
            precedence: token.precedence,
            is_keyword: false,
        });
    }
    let word_token = grammar
        .word
        .map(|index| layout.symbol(SymbolRef::Terminal(index)));
    if let Some(word) = grammar.word {
        if let TokenMatcher::Pattern(start) = token_rules[word].matcher {
            for rule in token_rules.iter_mut() {
                if let TokenMatcher::Literal(text) = &rule.matcher {
                    rule.is_keyword = nfa.matches_exactly(start, text);
                }
            }
        }
    }
    let extras: Vec<Symbol> = grammar
        .extras
        .iter()
        .map(|extra| layout.symbol(*extra))
        .collect();

    // ===== Table =====

    let token_conflicts = TokenConflicts::new(grammar.tokens.iter().map(|token| &token.source), terminal_count);
    debug!(
        grammar = %grammar.name,
        overlapping_pairs = token_conflicts.overlap_count(),
        "analysed token overlap"
    );
    let table = build_table(
        &FlatGrammar {
            productions: flat,
            terminal_count,
            nonterminal_count: grammar.variables.len(),
            start: layout.symbol(SymbolRef::Variable(0)),
            extras: extras.clone(),
            external_base: 1 + layout.token_count,
            external_count: layout.external_count,
        },
        &token_conflicts,
    )?;

    debug!(
        grammar = %grammar.name,
        symbols = symbols.len(),
        terminals = terminal_count,
        productions = productions.len(),
        keywords = token_rules.iter().filter(|rule| rule.is_keyword).count(),
        "assembled grammar"
    );

    Ok(LanguageParts {
        name: grammar.name,
        policy: grammar.policy,
        symbols,
        field_names,
        terminal_count: terminal_count as u16,
        external_tokens: (0..layout.external_count)
            .map(|index| layout.symbol(SymbolRef::External(index)))
            .collect(),
        extras,
        word_token,
        nfa,
        token_rules,
        productions,
        table,
    })
}
