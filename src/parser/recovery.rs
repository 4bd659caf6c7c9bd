//! Error recovery for a version that stopped on an unexpected token
//!
//! Strategies, cheapest first:
//! 1. Insert a zero-width MISSING token that makes the lookahead valid.
//! 2. Pop back to a nearby state that can shift the lookahead, wrapping the
//!    popped subtrees in an `ERROR` node.
//! 3. Skip the lookahead into an `ERROR` node, extending the previous one if
//!    the last recovery already skipped.
//!
//! At end of input only popping applies; if that fails too, the whole stack
//! becomes the `ERROR` root.

use tracing::trace;

use super::session::Session;
use super::stack::StackVersion;
use crate::base::Length;
use crate::grammar::{ParseAction, StateId, Symbol};
use crate::tree::subtree::{Flags, Subtree};

/// How far below the head a synchronizing state is searched for
const MAX_POP_DEPTH: usize = 16;
/// End-of-input pops before the stack is given up as one `ERROR` root
const MAX_END_RECOVERIES: usize = 4;
/// Trailing extras looked through when extending a previous skip
const MAX_SKIP_LOOKBEHIND: usize = 8;

impl Session<'_> {
    /// Resume the paused `version` and repair it so it can make progress.
    pub(super) fn recover(&mut self, version: StackVersion) {
        let Some(lookahead) = self.stack.resume(version) else {
            return;
        };
        let symbol = lookahead.symbol();
        trace!(
            version,
            state = self.stack.state(version),
            symbol = self.language.symbol_name(symbol).unwrap_or("?"),
            cost = self.stack.error_cost(version),
            "recover"
        );

        if symbol == Symbol::END {
            self.recover_at_end(version, lookahead);
            return;
        }
        if !symbol.is_error() {
            if self.insert_missing(version, &lookahead) {
                self.stack.set_lookahead(version, lookahead);
                return;
            }
            if self.pop_to_acceptor(version, &lookahead) {
                self.stack.set_lookahead(version, lookahead);
                return;
            }
        }
        self.skip(version, lookahead);
    }

    fn recover_at_end(&mut self, version: StackVersion, end: Subtree) {
        let language = self.language;
        let table = language.table();
        if self.end_recoveries < MAX_END_RECOVERIES {
            let states = self.stack.states_below(version, usize::MAX);
            let target = states
                .iter()
                .position(|&state| table.has_actions(state, Symbol::END))
                .map(|index| (index + 1, states[index]));
            if let Some((depth, state)) = target {
                self.end_recoveries += 1;
                let popped = self.stack.pop_to(version, depth);
                trace!(version, depth, state, "pop to end acceptor");
                let error = Subtree::error_node(popped, true, self.language);
                self.stack.push(version, error, state);
                self.stack.set_lookahead(version, end);
                return;
            }
        }

        let subtrees = self.stack.pop_all(version);
        trace!(version, count = subtrees.len(), "wrapping stack in error root");
        let root = Subtree::error_node(subtrees, false, self.language);
        self.finish(root);
        self.stack.halt(version);
    }

    /// Insert a token after which the lookahead is acceptable. Tokens that
    /// let the lookahead complete a construct (reduce) are preferred over
    /// tokens it merely follows.
    fn insert_missing(&mut self, version: StackVersion, lookahead: &Subtree) -> bool {
        let position = self.stack.position(version).byte_len();
        if self.stack.missing_at(version) == Some(position) || lookahead.size().is_zero() {
            return false;
        }
        let state = self.stack.state(version);
        let language = self.language;
        let table = language.table();

        let mut fallback = None;
        let mut chosen = None;
        for index in 1..table.terminal_count() {
            let symbol = Symbol(index as u16);
            if language.is_extra(symbol) {
                continue;
            }
            let Some(next) = shift_target(table.actions(state, symbol)) else {
                continue;
            };
            if next == state {
                continue;
            }
            let after = table.actions(next, lookahead.symbol());
            if after.iter().any(|action| matches!(action, ParseAction::Reduce { .. })) {
                chosen = Some((symbol, next));
                break;
            }
            if fallback.is_none() && shift_target(after).is_some() {
                fallback = Some((symbol, next));
            }
        }
        let Some((symbol, next)) = chosen.or(fallback) else {
            return false;
        };

        trace!(
            version,
            symbol = language.symbol_name(symbol).unwrap_or("?"),
            "insert missing"
        );
        self.stack.set_missing_at(version, position);
        let missing = Subtree::missing_leaf(symbol, Length::ZERO, state, language);
        self.stack.push(version, missing, next);
        true
    }

    /// Pop to the nearest state below that can shift the lookahead, when that
    /// costs less than skipping it.
    fn pop_to_acceptor(&mut self, version: StackVersion, lookahead: &Subtree) -> bool {
        let state = self.stack.state(version);
        let language = self.language;
        let table = language.table();
        let states = self.stack.states_below(version, MAX_POP_DEPTH);
        let target = states.iter().position(|&below| {
            below != state && shift_target(table.actions(below, lookahead.symbol())).is_some()
        });
        let Some(index) = target else {
            return false;
        };
        let depth = index + 1;

        let mut popped = self.stack.top_subtrees(version, depth);
        popped.reverse();
        let error = Subtree::error_node(popped, true, self.language);
        let skipped = Subtree::error_node(vec![lookahead.clone()], true, self.language);
        if error.error_cost() >= skipped.error_cost() {
            return false;
        }

        trace!(version, depth, state = states[index], "pop to acceptor");
        self.stack.pop_to(version, depth);
        self.stack.push(version, error, states[index]);
        true
    }

    /// Consume the lookahead as unexpected input.
    fn skip(&mut self, version: StackVersion, lookahead: Subtree) {
        if lookahead.size().is_zero() {
            // Nothing to consume; relex ignoring the lex mode instead.
            self.stack.set_error_mode(version, true);
            return;
        }

        let top = self.stack.top_subtrees(version, MAX_SKIP_LOOKBEHIND);
        let previous = top
            .iter()
            .position(|tree| !tree.is_extra() || tree.is_error())
            .filter(|&index| top[index].is_error() && top[index].is_extra() && !top[index].is_leaf());

        let error = match previous {
            Some(index) => {
                let mut popped = self.stack.pop_to(version, index + 1).into_iter();
                let mut children: Vec<Subtree> = popped
                    .next()
                    .map(|error| error.children().to_vec())
                    .unwrap_or_default();
                children.extend(popped);
                children.push(lookahead);
                Subtree::error_node(children, true, self.language)
            }
            // Unrecognized characters are already an `ERROR` leaf.
            None if lookahead.is_error() => {
                let mut leaf = lookahead;
                leaf.make_mut().flags.set(Flags::EXTRA, true);
                leaf
            }
            None => Subtree::error_node(vec![lookahead], true, self.language),
        };
        let state = self.stack.state(version);
        trace!(version, size = error.size().byte_len(), "skip");
        self.stack.push(version, error, state);
    }
}

fn shift_target(actions: &[ParseAction]) -> Option<StateId> {
    actions.iter().find_map(|action| match *action {
        ParseAction::Shift { state } => Some(state),
        _ => None,
    })
}
