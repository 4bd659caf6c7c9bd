//! Lexical overlap between tokens
//!
//! Two tokens overlap when some non-empty string matched by one of them is
//! also matched, or can still be extended, by the other. A lex mode holding
//! both may then lex differently from a mode holding only one, so the table
//! builder keeps parse states apart when merging them would add an
//! overlapping token to either side.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use super::pattern::{RegexAst, compile};
use super::prepare::TokenSource;
use crate::grammar::lexical::{Nfa, NfaState};

/// Pairwise overlap over terminal symbols. END and external tokens never
/// overlap anything here; the table builder treats externals separately.
#[derive(Debug, Clone, Default)]
pub(crate) struct TokenConflicts {
    terminal_count: usize,
    overlaps: Vec<bool>,
}

impl TokenConflicts {
    /// Analyse `tokens`, whose symbols start at 1.
    pub(crate) fn new<'a>(tokens: impl IntoIterator<Item = &'a TokenSource>, terminal_count: usize) -> Self {
        let mut nfa = Nfa::default();
        let accept = nfa.push(NfaState::Accept);
        let starts: Vec<u32> = tokens
            .into_iter()
            .map(|source| match source {
                TokenSource::Literal(text) => compile(&RegexAst::literal(text), &mut nfa, accept),
                TokenSource::Pattern(ast) => compile(ast, &mut nfa, accept),
            })
            .collect();

        let mut conflicts = Self {
            terminal_count,
            overlaps: vec![false; terminal_count * terminal_count],
        };
        for (left, &left_start) in starts.iter().enumerate() {
            for (offset, &right_start) in starts[left + 1..].iter().enumerate() {
                if overlap(&nfa, left_start, right_start) {
                    conflicts.set(1 + left, 2 + left + offset);
                }
            }
        }
        conflicts
    }

    /// Only the listed pairs overlap.
    #[cfg(test)]
    pub(crate) fn from_pairs(terminal_count: usize, pairs: &[(usize, usize)]) -> Self {
        let mut conflicts = Self {
            terminal_count,
            overlaps: vec![false; terminal_count * terminal_count],
        };
        for &(left, right) in pairs {
            conflicts.set(left, right);
        }
        conflicts
    }

    fn set(&mut self, left: usize, right: usize) {
        self.overlaps[left * self.terminal_count + right] = true;
        self.overlaps[right * self.terminal_count + left] = true;
    }

    pub(crate) fn overlap(&self, left: usize, right: usize) -> bool {
        if left >= self.terminal_count || right >= self.terminal_count {
            return false;
        }
        self.overlaps[left * self.terminal_count + right]
    }

    pub(crate) fn overlap_count(&self) -> usize {
        self.overlaps.iter().filter(|&&overlap| overlap).count() / 2
    }
}

/// Run both automata side by side over every character they can share.
/// Overlap is found once, after a non-empty prefix, both are still alive and
/// either accepts.
fn overlap(nfa: &Nfa, left: u32, right: u32) -> bool {
    let start = (closure(nfa, &[left]), closure(nfa, &[right]));
    let mut seen: FxHashSet<(Vec<u32>, Vec<u32>)> = FxHashSet::default();
    let mut queue = VecDeque::from([start]);
    while let Some((left, right)) = queue.pop_front() {
        for code in boundaries(nfa, &left, &right) {
            let next_left = step(nfa, &left, code);
            let next_right = step(nfa, &right, code);
            if next_left.is_empty() || next_right.is_empty() {
                continue;
            }
            if accepts(nfa, &next_left) || accepts(nfa, &next_right) {
                return true;
            }
            let pair = (next_left, next_right);
            if seen.insert(pair.clone()) {
                queue.push_back(pair);
            }
        }
    }
    false
}

/// Epsilon closure, as a sorted set of non-split states
fn closure(nfa: &Nfa, roots: &[u32]) -> Vec<u32> {
    let mut set = Vec::new();
    let mut visited = FxHashSet::default();
    let mut stack = roots.to_vec();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        match &nfa.states[id as usize] {
            NfaState::Split { first, second } => {
                stack.push(*second);
                stack.push(*first);
            }
            _ => set.push(id),
        }
    }
    set.sort_unstable();
    set
}

fn step(nfa: &Nfa, set: &[u32], code: u32) -> Vec<u32> {
    let targets: Vec<u32> = set
        .iter()
        .filter_map(|&id| match &nfa.states[id as usize] {
            NfaState::Class { ranges, next } if ranges.iter().any(|&(lo, hi)| lo <= code && code <= hi) => {
                Some(*next)
            }
            _ => None,
        })
        .collect();
    closure(nfa, &targets)
}

fn accepts(nfa: &Nfa, set: &[u32]) -> bool {
    set.iter()
        .any(|&id| matches!(nfa.states[id as usize], NfaState::Accept))
}

/// One code point from each interval on which every class of both sets
/// agrees
fn boundaries(nfa: &Nfa, left: &[u32], right: &[u32]) -> Vec<u32> {
    let mut points = Vec::new();
    for &id in left.iter().chain(right) {
        if let NfaState::Class { ranges, .. } = &nfa.states[id as usize] {
            for &(lo, hi) in ranges {
                points.push(lo);
                points.push(hi.saturating_add(1));
            }
        }
    }
    points.sort_unstable();
    points.dedup();
    points
}
