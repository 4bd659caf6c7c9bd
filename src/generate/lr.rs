//! LR(1) table construction
//!
//! Canonical LR(1) states are built breadth-first and merged on the fly: a new
//! kernel joins an existing state with the same core unless the merge would
//! add a reduce/reduce conflict neither side had, or would add a token that
//! overlaps lexically with one the other side already lexes. The result is as
//! small as LALR(1) wherever that is safe, and every state's lex mode only
//! holds tokens that are valid in all of the contexts it stands for.
//!
//! Shift/reduce and reduce/reduce conflicts are settled by declared
//! precedence where both sides have one. Every other conflict stays in the
//! table as a multi-action cell that the runtime explores by forking.

use std::collections::{BTreeMap, VecDeque};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::conflicts::TokenConflicts;
use super::prepare::Assoc;
use crate::error::GrammarError;
use crate::grammar::symbol::{StateId, Symbol};
use crate::grammar::table::{ActionEntry, LexMode, NO_STATE, ParseAction, ParseTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlatStep {
    pub symbol: Symbol,
    pub precedence: Option<i16>,
    pub assoc: Assoc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlatProduction {
    pub lhs: Symbol,
    pub steps: Vec<FlatStep>,
    pub dynamic_precedence: i16,
}

/// Symbol-numbered grammar ready for table construction
#[derive(Debug, Clone)]
pub(crate) struct FlatGrammar {
    pub productions: Vec<FlatProduction>,
    pub terminal_count: usize,
    pub nonterminal_count: usize,
    pub start: Symbol,
    pub extras: Vec<Symbol>,
    /// Symbol of the first external token; externals are contiguous
    pub external_base: usize,
    pub external_count: usize,
}

// ============================================================================
// Token sets
// ============================================================================

/// Bit set over terminals
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
struct TokenSet {
    words: Vec<u64>,
}

impl TokenSet {
    fn with_bits(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
        }
    }

    fn insert(&mut self, bit: usize) -> bool {
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        let changed = self.words[word] & mask == 0;
        self.words[word] |= mask;
        changed
    }

    fn contains(&self, bit: usize) -> bool {
        self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    fn union(&mut self, other: &TokenSet) -> bool {
        let mut changed = false;
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            let merged = *mine | theirs;
            changed |= merged != *mine;
            *mine = merged;
        }
        changed
    }

    fn is_superset(&self, other: &TokenSet) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .all(|(mine, theirs)| theirs & !mine == 0)
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| index * 64 + bit)
        })
    }
}

// ============================================================================
// Automaton
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Item {
    /// Internal production id; 0 is the augmented start production
    production: u32,
    dot: u32,
}

impl Item {
    fn advance(self) -> Self {
        Self {
            dot: self.dot + 1,
            ..self
        }
    }
}

struct Builder<'a> {
    grammar: &'a FlatGrammar,
    /// Internal productions: the augmented start production, then the grammar's
    steps: Vec<Vec<FlatStep>>,
    by_lhs: Vec<Vec<u32>>,
    first: Vec<TokenSet>,
    nullable: Vec<bool>,
}

impl<'a> Builder<'a> {
    fn new(grammar: &'a FlatGrammar) -> Self {
        let mut steps = vec![vec![FlatStep {
            symbol: grammar.start,
            precedence: None,
            assoc: Assoc::None,
        }]];
        let mut by_lhs = vec![Vec::new(); grammar.nonterminal_count];
        for (index, production) in grammar.productions.iter().enumerate() {
            steps.push(production.steps.clone());
            by_lhs[production.lhs.index() - grammar.terminal_count].push(index as u32 + 1);
        }
        let mut builder = Self {
            grammar,
            steps,
            by_lhs,
            first: Vec::new(),
            nullable: Vec::new(),
        };
        builder.compute_first_sets();
        builder
    }

    fn is_terminal(&self, symbol: Symbol) -> bool {
        symbol.index() < self.grammar.terminal_count
    }

    fn nonterminal(&self, symbol: Symbol) -> usize {
        symbol.index() - self.grammar.terminal_count
    }

    fn empty_set(&self) -> TokenSet {
        TokenSet::with_bits(self.grammar.terminal_count)
    }

    fn next_symbol(&self, item: Item) -> Option<Symbol> {
        self.steps[item.production as usize]
            .get(item.dot as usize)
            .map(|step| step.symbol)
    }

    fn compute_first_sets(&mut self) {
        let count = self.grammar.nonterminal_count;
        self.first = vec![self.empty_set(); count];
        self.nullable = vec![false; count];
        let mut changed = true;
        while changed {
            changed = false;
            for production in &self.grammar.productions {
                let lhs = self.nonterminal(production.lhs);
                let mut set = self.empty_set();
                let mut all_nullable = true;
                for step in &production.steps {
                    if self.is_terminal(step.symbol) {
                        set.insert(step.symbol.index());
                        all_nullable = false;
                        break;
                    }
                    let inner = self.nonterminal(step.symbol);
                    set.union(&self.first[inner]);
                    if !self.nullable[inner] {
                        all_nullable = false;
                        break;
                    }
                }
                changed |= self.first[lhs].union(&set);
                if all_nullable && !self.nullable[lhs] {
                    self.nullable[lhs] = true;
                    changed = true;
                }
            }
        }
    }

    /// FIRST of a symbol sequence and whether the whole sequence is nullable
    fn first_of(&self, steps: &[FlatStep]) -> (TokenSet, bool) {
        let mut set = self.empty_set();
        for step in steps {
            if self.is_terminal(step.symbol) {
                set.insert(step.symbol.index());
                return (set, false);
            }
            let inner = self.nonterminal(step.symbol);
            set.union(&self.first[inner]);
            if !self.nullable[inner] {
                return (set, false);
            }
        }
        (set, true)
    }

    fn closure1(&self, kernel: &[(Item, TokenSet)]) -> IndexMap<Item, TokenSet> {
        let mut items: IndexMap<Item, TokenSet> = kernel.iter().cloned().collect();
        let mut work: Vec<usize> = (0..items.len()).collect();
        while let Some(index) = work.pop() {
            let (item, lookahead) = match items.get_index(index) {
                Some((item, lookahead)) => (*item, lookahead.clone()),
                None => continue,
            };
            let Some(symbol) = self.next_symbol(item) else {
                continue;
            };
            if self.is_terminal(symbol) {
                continue;
            }
            let rest = &self.steps[item.production as usize][item.dot as usize + 1..];
            let (mut follow, nullable) = self.first_of(rest);
            if nullable {
                follow.union(&lookahead);
            }
            for &production in &self.by_lhs[self.nonterminal(symbol)] {
                let child = Item { production, dot: 0 };
                let entry = items.entry(child);
                let child_index = entry.index();
                let changed = match entry {
                    indexmap::map::Entry::Occupied(mut slot) => slot.get_mut().union(&follow),
                    indexmap::map::Entry::Vacant(slot) => {
                        slot.insert(follow.clone());
                        true
                    }
                };
                if changed {
                    work.push(child_index);
                }
            }
        }
        items
    }

    /// Build every state reachable from the start state.
    fn build_states(&self, conflicts: &TokenConflicts) -> Result<Vec<ParseStateBuild>, GrammarError> {
        let mut start = self.empty_set();
        start.insert(Symbol::END.index());
        let mut automaton = Automaton::default();
        automaton.create(
            vec![Item {
                production: 0,
                dot: 0,
            }],
            vec![start],
        );

        while let Some(state) = automaton.queue.pop_front() {
            automaton.queued[state] = false;
            let mut moves: BTreeMap<Symbol, Vec<(Item, TokenSet)>> = BTreeMap::new();
            for (item, lookahead) in self.closure1(&automaton.states[state].seeded()) {
                if let Some(symbol) = self.next_symbol(item) {
                    moves.entry(symbol).or_default().push((item.advance(), lookahead));
                }
            }
            let mut transitions = BTreeMap::new();
            for (symbol, mut kernel) in moves {
                kernel.sort_unstable_by_key(|(item, _)| *item);
                let (core, lookaheads) = kernel.into_iter().unzip();
                transitions.insert(symbol, self.place(&mut automaton, core, lookaheads, conflicts));
            }
            automaton.states[state].transitions = transitions;
            if automaton.states.len() >= usize::from(NO_STATE) {
                return Err(GrammarError::TooLarge(format!(
                    "more than {} parse states",
                    NO_STATE - 1
                )));
            }
        }

        let built = automaton.states.len();
        let states = reachable(automaton.states);
        debug!(
            states = states.len(),
            unreachable = built - states.len(),
            cores = automaton.by_core.len(),
            "built LR(1) automaton"
        );
        Ok(states)
    }

    /// The state a kernel goes to: an existing state that already covers it,
    /// a compatible state with the same core, or a new one.
    fn place(
        &self,
        automaton: &mut Automaton,
        core: Vec<Item>,
        lookaheads: Vec<TokenSet>,
        conflicts: &TokenConflicts,
    ) -> usize {
        let candidates = automaton.by_core.get(&core).cloned().unwrap_or_default();
        for &candidate in &candidates {
            let existing = &automaton.states[candidate].lookaheads;
            if existing.iter().zip(&lookaheads).all(|(have, new)| have.is_superset(new)) {
                return candidate;
            }
        }

        if !candidates.is_empty() {
            let incoming = self.summarize(&core, &lookaheads);
            for &candidate in &candidates {
                let existing = self.summarize(&core, &automaton.states[candidate].lookaheads);
                if self.compatible(&existing, &incoming, conflicts) {
                    for (have, new) in automaton.states[candidate].lookaheads.iter_mut().zip(&lookaheads) {
                        have.union(new);
                    }
                    automaton.enqueue(candidate);
                    return candidate;
                }
            }
        }
        automaton.create(core, lookaheads)
    }

    /// Valid terminals and per-production reduce lookaheads of a kernel
    fn summarize(&self, core: &[Item], lookaheads: &[TokenSet]) -> StateSummary {
        let seeded: Vec<(Item, TokenSet)> = core.iter().copied().zip(lookaheads.iter().cloned()).collect();
        let mut summary = StateSummary {
            valid: self.empty_set(),
            reduces: BTreeMap::new(),
        };
        for (item, lookahead) in self.closure1(&seeded) {
            match self.next_symbol(item) {
                Some(symbol) if self.is_terminal(symbol) => {
                    summary.valid.insert(symbol.index());
                }
                Some(_) => {}
                None if item.production == 0 => {
                    summary.valid.insert(Symbol::END.index());
                }
                None => {
                    summary.valid.union(&lookahead);
                    summary
                        .reduces
                        .entry(item.production)
                        .or_insert_with(|| self.empty_set())
                        .union(&lookahead);
                }
            }
        }
        summary
    }

    fn compatible(&self, left: &StateSummary, right: &StateSummary, conflicts: &TokenConflicts) -> bool {
        !self.adds_reduce_conflict(left, right)
            && !self.adds_token_conflict(left, right, conflicts)
            && !self.adds_token_conflict(right, left, conflicts)
    }

    /// Whether some terminal would reduce by two productions in the merged
    /// state but not in either state alone
    fn adds_reduce_conflict(&self, left: &StateSummary, right: &StateSummary) -> bool {
        let empty = self.empty_set();
        let lookahead = |summary: &StateSummary, production: u32| -> TokenSet {
            summary.reduces.get(&production).cloned().unwrap_or_else(|| empty.clone())
        };
        let mut productions: Vec<u32> = left.reduces.keys().chain(right.reduces.keys()).copied().collect();
        productions.sort_unstable();
        productions.dedup();
        for (index, &first) in productions.iter().enumerate() {
            let (left_first, right_first) = (lookahead(left, first), lookahead(right, first));
            for &second in &productions[index + 1..] {
                let (left_second, right_second) = (lookahead(left, second), lookahead(right, second));
                for word in 0..empty.words.len() {
                    let merged = (left_first.words[word] | right_first.words[word])
                        & (left_second.words[word] | right_second.words[word]);
                    let existing = (left_first.words[word] & left_second.words[word])
                        | (right_first.words[word] & right_second.words[word]);
                    if merged & !existing != 0 {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Whether `incoming` is valid on a terminal `base` lacks that is an
    /// external token or overlaps something `base` lexes
    fn adds_token_conflict(&self, base: &StateSummary, incoming: &StateSummary, conflicts: &TokenConflicts) -> bool {
        let lexed: Vec<usize> = base
            .valid
            .iter()
            .chain(self.grammar.extras.iter().map(|symbol| symbol.index()))
            .filter(|&terminal| terminal != Symbol::END.index() && !self.is_external(terminal))
            .collect();
        incoming
            .valid
            .iter()
            .filter(|&terminal| terminal != Symbol::END.index() && !base.valid.contains(terminal))
            .any(|terminal| {
                self.is_external(terminal) || lexed.iter().any(|&other| conflicts.overlap(terminal, other))
            })
    }

    fn is_external(&self, terminal: usize) -> bool {
        let base = self.grammar.external_base;
        (base..base + self.grammar.external_count).contains(&terminal)
    }
}

/// A parse state under construction: one LR(1) core with the union of the
/// lookaheads of every context merged into it
struct ParseStateBuild {
    core: Vec<Item>,
    lookaheads: Vec<TokenSet>,
    transitions: BTreeMap<Symbol, usize>,
}

impl ParseStateBuild {
    fn seeded(&self) -> Vec<(Item, TokenSet)> {
        self.core.iter().copied().zip(self.lookaheads.iter().cloned()).collect()
    }
}

/// What a state does with each terminal, as far as merging is concerned
struct StateSummary {
    valid: TokenSet,
    reduces: BTreeMap<u32, TokenSet>,
}

#[derive(Default)]
struct Automaton {
    states: Vec<ParseStateBuild>,
    by_core: FxHashMap<Vec<Item>, Vec<usize>>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
}

impl Automaton {
    fn create(&mut self, core: Vec<Item>, lookaheads: Vec<TokenSet>) -> usize {
        let id = self.states.len();
        self.by_core.entry(core.clone()).or_default().push(id);
        self.states.push(ParseStateBuild {
            core,
            lookaheads,
            transitions: BTreeMap::new(),
        });
        self.queued.push(false);
        self.enqueue(id);
        id
    }

    /// States whose lookaheads grew are expanded again.
    fn enqueue(&mut self, state: usize) {
        if !self.queued[state] {
            self.queued[state] = true;
            self.queue.push_back(state);
        }
    }
}

/// Drop states no transition leads to any more and renumber the rest in
/// breadth-first order from the start state.
fn reachable(states: Vec<ParseStateBuild>) -> Vec<ParseStateBuild> {
    let mut renumbered = vec![usize::MAX; states.len()];
    let mut order = vec![0];
    renumbered[0] = 0;
    let mut index = 0;
    while let Some(&state) = order.get(index) {
        for &target in states[state].transitions.values() {
            if renumbered[target] == usize::MAX {
                renumbered[target] = order.len();
                order.push(target);
            }
        }
        index += 1;
    }

    let mut slots: Vec<Option<ParseStateBuild>> = states.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|&state| slots[state].take())
        .map(|mut state| {
            for target in state.transitions.values_mut() {
                *target = renumbered[*target];
            }
            state
        })
        .collect()
}

// ============================================================================
// Table assembly
// ============================================================================

/// Precedence of the production an item reduces by
fn reduce_precedence(steps: &[FlatStep]) -> (Option<i16>, Assoc) {
    steps
        .last()
        .map(|step| (step.precedence, step.assoc))
        .unwrap_or((None, Assoc::None))
}

/// Settle the conflicts in one cell. Returns the surviving actions ordered
/// accept, reduces by production, shift.
fn resolve(
    accept: bool,
    shift: Option<(StateId, Option<i16>)>,
    mut reduces: Vec<(u32, Option<i16>, Assoc)>,
    grammar: &FlatGrammar,
) -> Vec<ParseAction> {
    reduces.sort_unstable_by_key(|(production, ..)| *production);
    let mut shift_alive = shift.is_some();

    if let Some((_, Some(shift_level))) = shift {
        let mut kept = Vec::with_capacity(reduces.len());
        for reduce in reduces {
            match reduce.1 {
                Some(level) if level > shift_level => {
                    shift_alive = false;
                    kept.push(reduce);
                }
                Some(level) if level < shift_level => {}
                Some(_) => match reduce.2 {
                    Assoc::Left => {
                        shift_alive = false;
                        kept.push(reduce);
                    }
                    Assoc::Right => {}
                    Assoc::None => kept.push(reduce),
                },
                None => kept.push(reduce),
            }
        }
        reduces = kept;
    }

    if reduces.len() > 1 && reduces.iter().all(|(_, level, _)| level.is_some()) {
        let best = reduces.iter().filter_map(|(_, level, _)| *level).max();
        reduces.retain(|(_, level, _)| *level == best);
    }

    let mut actions = Vec::new();
    if accept {
        actions.push(ParseAction::Accept);
    }
    for (production, ..) in reduces {
        let info = &grammar.productions[production as usize];
        actions.push(ParseAction::Reduce {
            symbol: info.lhs,
            child_count: info.steps.len() as u16,
            production_id: production as u16,
            dynamic_precedence: info.dynamic_precedence,
        });
    }
    if let (true, Some((state, _))) = (shift_alive, shift) {
        actions.push(ParseAction::Shift { state });
    }
    actions
}

/// Build the parse table for `grammar`. States are only merged where
/// `token_conflicts` shows their lex modes stay apart.
pub(crate) fn build_table(
    grammar: &FlatGrammar,
    token_conflicts: &TokenConflicts,
) -> Result<ParseTable, GrammarError> {
    let builder = Builder::new(grammar);
    let states = builder.build_states(token_conflicts)?;
    let terminal_count = grammar.terminal_count;
    let nonterminal_count = grammar.nonterminal_count;
    let state_count = states.len();

    let mut pool: Vec<ParseAction> = Vec::new();
    let mut pooled: FxHashMap<Vec<ParseAction>, u32> = FxHashMap::default();
    let mut entries = vec![ActionEntry::default(); state_count * terminal_count];
    let mut gotos = vec![NO_STATE; state_count * nonterminal_count];
    let mut lex_modes: IndexMap<LexMode, u16> = IndexMap::new();
    let mut state_lex_modes = Vec::with_capacity(state_count);
    let mut conflicts = 0usize;

    for (state, built) in states.iter().enumerate() {
        let items = builder.closure1(&built.seeded());

        let mut accept = false;
        let mut reduces: BTreeMap<usize, Vec<(u32, Option<i16>, Assoc)>> = BTreeMap::new();
        let mut shift_levels: BTreeMap<usize, Option<i16>> = BTreeMap::new();
        for (item, lookahead) in &items {
            let steps = &builder.steps[item.production as usize];
            match steps.get(item.dot as usize) {
                None if item.production == 0 => accept = true,
                None => {
                    let (level, assoc) = reduce_precedence(steps);
                    for terminal in lookahead.iter().filter(|&bit| bit < terminal_count) {
                        reduces
                            .entry(terminal)
                            .or_default()
                            .push((item.production - 1, level, assoc));
                    }
                }
                Some(step) if builder.is_terminal(step.symbol) => {
                    let slot = shift_levels.entry(step.symbol.index()).or_insert(None);
                    if let Some(level) = step.precedence {
                        *slot = Some(slot.map_or(level, |current: i16| current.max(level)));
                    }
                }
                Some(_) => {}
            }
        }

        let mut valid = Vec::new();
        for terminal in 0..terminal_count {
            let cell_accept = accept && terminal == Symbol::END.index();
            let shift = built
                .transitions
                .get(&Symbol(terminal as u16))
                .map(|&target| (target as StateId, shift_levels.get(&terminal).copied().flatten()));
            let cell_reduces = reduces.remove(&terminal).unwrap_or_default();
            if !cell_accept && shift.is_none() && cell_reduces.is_empty() {
                continue;
            }
            let actions = resolve(cell_accept, shift, cell_reduces, grammar);
            if actions.len() > 1 {
                conflicts += 1;
                debug!(state, terminal, ?actions, "conflict kept for runtime forking");
            }
            let start = match pooled.get(&actions) {
                Some(&start) => start,
                None => {
                    let start = pool.len() as u32;
                    pool.extend_from_slice(&actions);
                    pooled.insert(actions.clone(), start);
                    start
                }
            };
            entries[state * terminal_count + terminal] = ActionEntry {
                start,
                len: actions.len() as u16,
            };
            valid.push(terminal);
        }

        for (symbol, &target) in &built.transitions {
            if !builder.is_terminal(*symbol) {
                gotos[state * nonterminal_count + builder.nonterminal(*symbol)] =
                    target as StateId;
            }
        }

        let mode = lex_mode_for(grammar, &valid);
        let next_id = lex_modes.len() as u16;
        state_lex_modes.push(*lex_modes.entry(mode).or_insert(next_id));
    }

    debug!(
        states = state_count,
        actions = pool.len(),
        lex_modes = lex_modes.len(),
        conflicts,
        "built parse table"
    );

    Ok(ParseTable {
        state_count,
        terminal_count,
        nonterminal_count,
        actions: pool,
        entries,
        gotos,
        lex_modes: lex_modes.into_keys().collect(),
        state_lex_modes,
    })
}

/// Tokens worth lexing in a state with actions on `valid`
fn lex_mode_for(grammar: &FlatGrammar, valid: &[usize]) -> LexMode {
    let externals = grammar.external_base..grammar.external_base + grammar.external_count;
    let mut tokens = Vec::new();
    let mut external_indices = Vec::new();
    let extras = grammar.extras.iter().map(|symbol| symbol.index());
    for terminal in valid.iter().copied().chain(extras) {
        if terminal == Symbol::END.index() {
            continue;
        }
        if externals.contains(&terminal) {
            external_indices.push((terminal - grammar.external_base) as u16);
        } else {
            tokens.push(Symbol(terminal as u16));
        }
    }
    tokens.sort_unstable();
    tokens.dedup();
    external_indices.sort_unstable();
    external_indices.dedup();
    LexMode {
        tokens,
        externals: external_indices,
    }
}
