//! Lexical grammar: token rules and the shared token automaton
//!
//! Every pattern token is compiled into one Thompson NFA shared by the whole
//! grammar; each rule knows its start state. Simulation reports how many bytes
//! were examined, which is what incremental invalidation needs.

use rustc_hash::FxHashMap;

use super::symbol::Symbol;
use crate::error::LoadError;

// ============================================================================
// Automaton
// ============================================================================

/// One NFA state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfaState {
    /// Consume one character inside any of the inclusive code point ranges
    Class { ranges: Vec<(u32, u32)>, next: u32 },
    Split { first: u32, second: u32 },
    Accept,
}

/// Token automaton shared by all pattern rules of a grammar
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nfa {
    pub(crate) states: Vec<NfaState>,
}

/// Reusable buffers for NFA simulation
#[derive(Debug, Default)]
pub(crate) struct NfaScratch {
    current: Vec<u32>,
    next: Vec<u32>,
    marks: Vec<u32>,
    generation: u32,
    stack: Vec<u32>,
}

/// Result of running one token rule at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct MatchOutcome {
    /// Length of the longest non-empty match, zero when there is none
    pub len: usize,
    /// Bytes read before the rule could decide
    pub examined: usize,
    /// The rule wanted more input than was available
    pub hit_end: bool,
}

impl Nfa {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub(crate) fn push(&mut self, state: NfaState) -> u32 {
        self.states.push(state);
        (self.states.len() - 1) as u32
    }

    pub(crate) fn longest_match(
        &self,
        start: u32,
        input: &[u8],
        scratch: &mut NfaScratch,
    ) -> MatchOutcome {
        let NfaScratch {
            current,
            next,
            marks,
            generation,
            stack,
        } = scratch;
        if marks.len() < self.states.len() {
            marks.resize(self.states.len(), 0);
        }

        current.clear();
        advance_generation(generation, marks);
        add_state(&self.states, start, current, marks, *generation, stack);

        let mut outcome = MatchOutcome::default();
        let mut position = 0;
        while !current.is_empty() {
            let Some((ch, width)) = decode_char(&input[position..]) else {
                outcome.hit_end = true;
                break;
            };
            position += width;
            outcome.examined = position;

            next.clear();
            advance_generation(generation, marks);
            for &id in current.iter() {
                if let NfaState::Class { ranges, next: target } = &self.states[id as usize] {
                    if class_contains(ranges, u32::from(ch)) {
                        add_state(&self.states, *target, next, marks, *generation, stack);
                    }
                }
            }
            std::mem::swap(current, next);
            if current
                .iter()
                .any(|&id| matches!(self.states[id as usize], NfaState::Accept))
            {
                outcome.len = position;
            }
        }
        outcome
    }

    /// Whether `text` is matched in full by the rule starting at `start`
    pub(crate) fn matches_exactly(&self, start: u32, text: &[u8]) -> bool {
        let mut scratch = NfaScratch::default();
        self.longest_match(start, text, &mut scratch).len == text.len()
    }

    fn validate(&self) -> Result<(), LoadError> {
        let count = self.states.len() as u64;
        let in_range = |id: u32| u64::from(id) < count;
        for (index, state) in self.states.iter().enumerate() {
            let ok = match state {
                NfaState::Class { ranges, next } => {
                    in_range(*next) && ranges.iter().all(|(lo, hi)| lo <= hi)
                }
                NfaState::Split { first, second } => in_range(*first) && in_range(*second),
                NfaState::Accept => true,
            };
            if !ok {
                return Err(LoadError::corrupt(format!("malformed NFA state {index}")));
            }
        }
        Ok(())
    }
}

fn advance_generation(generation: &mut u32, marks: &mut [u32]) {
    if *generation == u32::MAX {
        marks.fill(0);
        *generation = 0;
    }
    *generation += 1;
}

fn add_state(
    states: &[NfaState],
    start: u32,
    set: &mut Vec<u32>,
    marks: &mut [u32],
    generation: u32,
    stack: &mut Vec<u32>,
) {
    stack.push(start);
    while let Some(id) = stack.pop() {
        let mark = &mut marks[id as usize];
        if *mark == generation {
            continue;
        }
        *mark = generation;
        match &states[id as usize] {
            NfaState::Split { first, second } => {
                stack.push(*second);
                stack.push(*first);
            }
            _ => set.push(id),
        }
    }
}

fn class_contains(ranges: &[(u32, u32)], code: u32) -> bool {
    ranges.iter().any(|&(lo, hi)| lo <= code && code <= hi)
}

/// Decode one character. Invalid bytes decode as U+FFFD with width 1.
pub(crate) fn decode_char(bytes: &[u8]) -> Option<(char, usize)> {
    let first = *bytes.first()?;
    let width = match first {
        0x00..=0x7F => return Some((char::from(first), 1)),
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return Some((char::REPLACEMENT_CHARACTER, 1)),
    };
    let end = width.min(bytes.len());
    match std::str::from_utf8(&bytes[..end]) {
        Ok(text) => text.chars().next().map(|ch| (ch, end)),
        Err(_) => Some((char::REPLACEMENT_CHARACTER, 1)),
    }
}

fn literal_match(literal: &[u8], input: &[u8]) -> MatchOutcome {
    let common = literal
        .iter()
        .zip(input)
        .take_while(|(a, b)| a == b)
        .count();
    if common == literal.len() {
        MatchOutcome {
            len: common,
            examined: common,
            hit_end: false,
        }
    } else if common == input.len() {
        MatchOutcome {
            len: 0,
            examined: common,
            hit_end: true,
        }
    } else {
        MatchOutcome {
            len: 0,
            examined: common + 1,
            hit_end: false,
        }
    }
}

// ============================================================================
// Token rules
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenMatcher {
    Literal(Box<[u8]>),
    /// Start state in the grammar's NFA
    Pattern(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRule {
    pub symbol: Symbol,
    pub matcher: TokenMatcher,
    pub precedence: i16,
    /// Lexed through the word token rather than directly
    pub is_keyword: bool,
}

/// How the lexer picks among several tokens matching at one position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TokenConflictPolicy {
    /// Length, then precedence, then literal over pattern, then declaration order
    #[default]
    LongestMatch,
    /// Precedence, then length, then literal over pattern, then declaration order
    PrecedenceFirst,
}

impl TokenConflictPolicy {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::LongestMatch => 0,
            Self::PrecedenceFirst => 1,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::LongestMatch),
            1 => Some(Self::PrecedenceFirst),
            _ => None,
        }
    }

    /// Whether `a` beats `b`
    pub(crate) fn prefers(self, a: &Candidate, b: &Candidate) -> bool {
        let key = |c: &Candidate| match self {
            Self::LongestMatch => (c.len as i64, i64::from(c.precedence)),
            Self::PrecedenceFirst => (i64::from(c.precedence), c.len as i64),
        };
        key(a)
            .cmp(&key(b))
            .then(a.literal.cmp(&b.literal))
            .then(b.order.cmp(&a.order))
            .is_gt()
    }
}

/// A token rule that matched at the current position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub symbol: Symbol,
    pub len: usize,
    pub precedence: i16,
    pub literal: bool,
    pub order: usize,
}

/// Token rules of a grammar plus lookup tables derived at load time
#[derive(Debug, Clone)]
pub struct LexicalGrammar {
    pub(crate) rules: Vec<TokenRule>,
    pub(crate) nfa: Nfa,
    pub(crate) word_token: Option<Symbol>,
    pub(crate) policy: TokenConflictPolicy,
    rule_by_symbol: Vec<Option<u32>>,
    keywords: FxHashMap<Box<[u8]>, Symbol>,
}

impl LexicalGrammar {
    pub(crate) fn new(
        rules: Vec<TokenRule>,
        nfa: Nfa,
        word_token: Option<Symbol>,
        policy: TokenConflictPolicy,
        terminal_count: usize,
    ) -> Result<Self, LoadError> {
        nfa.validate()?;
        let mut rule_by_symbol = vec![None; terminal_count];
        let mut keywords = FxHashMap::default();
        for (index, rule) in rules.iter().enumerate() {
            let slot = rule_by_symbol
                .get_mut(rule.symbol.index())
                .filter(|_| rule.symbol != Symbol::END)
                .ok_or_else(|| {
                    LoadError::corrupt(format!("token rule for invalid symbol {}", rule.symbol.0))
                })?;
            *slot = Some(index as u32);
            match &rule.matcher {
                TokenMatcher::Pattern(start) if *start as usize >= nfa.len() => {
                    return Err(LoadError::corrupt(format!(
                        "token rule starts at unknown NFA state {start}"
                    )));
                }
                TokenMatcher::Literal(text) if rule.is_keyword => {
                    keywords.insert(text.clone(), rule.symbol);
                }
                TokenMatcher::Pattern(_) if rule.is_keyword => {
                    return Err(LoadError::corrupt("keyword rule is not a literal"));
                }
                _ => {}
            }
        }
        if let Some(word) = word_token {
            if rule_by_symbol.get(word.index()).copied().flatten().is_none() {
                return Err(LoadError::corrupt("word token has no rule"));
            }
        }
        Ok(Self {
            rules,
            nfa,
            word_token,
            policy,
            rule_by_symbol,
            keywords,
        })
    }

    pub fn policy(&self) -> TokenConflictPolicy {
        self.policy
    }

    pub fn word_token(&self) -> Option<Symbol> {
        self.word_token
    }

    pub(crate) fn rule_index(&self, symbol: Symbol) -> Option<usize> {
        self.rule_by_symbol
            .get(symbol.index())
            .copied()
            .flatten()
            .map(|index| index as usize)
    }

    pub(crate) fn rule(&self, symbol: Symbol) -> Option<&TokenRule> {
        self.rule_index(symbol).map(|index| &self.rules[index])
    }

    pub(crate) fn keyword(&self, text: &[u8]) -> Option<Symbol> {
        self.keywords.get(text).copied()
    }

    pub(crate) fn has_keywords(&self) -> bool {
        !self.keywords.is_empty()
    }

    pub(crate) fn run(
        &self,
        rule: &TokenRule,
        input: &[u8],
        scratch: &mut NfaScratch,
    ) -> MatchOutcome {
        match &rule.matcher {
            TokenMatcher::Literal(text) => literal_match(text, input),
            TokenMatcher::Pattern(start) => self.nfa.longest_match(*start, input, scratch),
        }
    }
}
