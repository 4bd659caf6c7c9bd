//! One run of the GLR automaton over one input
//!
//! Versions are advanced in lockstep: each one runs until it has consumed
//! input past the furthest position seen so far, then the stack is condensed
//! (merged, pruned, recovered) and the next round starts. The run ends when
//! every version has been accepted or abandoned.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::trace;

use super::reusable::ReusableNode;
use super::stack::{
    MAX_VERSIONS, Selection, Stack, StackVersion, VersionStatus, choose, mark_ambiguous, select_tree,
};
use crate::error::ParseError;
use crate::grammar::table::{ActionList, NO_STATE};
use crate::grammar::{Language, ParseAction, StateId, Symbol};
use crate::lexer::{LexInput, LexRequest, Lexer};
use crate::tree::subtree::{ERROR_COST_PER_SKIPPED_TREE, Flags, Subtree, external_state_eq};

/// Versions this much worse than another are dropped.
const MAX_COST_DIFFERENCE: u32 = 16 * ERROR_COST_PER_SKIPPED_TREE;
/// Reductions may briefly exceed the version cap by this much.
const MAX_VERSION_OVERFLOW: usize = 4;

/// Token lexed at a position, shared by versions that would lex it identically
struct CachedToken {
    position: usize,
    lex_mode: u16,
    last_external_token: Option<Subtree>,
    token: Subtree,
}

pub(crate) struct Session<'a> {
    pub(super) language: &'a Language,
    input: LexInput<'a>,
    lexer: &'a mut Lexer,
    pub(super) stack: &'a mut Stack,
    reusable: Option<ReusableNode>,
    cancel: &'a AtomicBool,
    deadline: Option<Instant>,
    cached_token: Option<CachedToken>,
    pub(super) finished: Option<Subtree>,
    pub(super) end_recoveries: usize,
}

impl<'a> Session<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        language: &'a Language,
        input: LexInput<'a>,
        lexer: &'a mut Lexer,
        stack: &'a mut Stack,
        old_root: Option<Subtree>,
        cancel: &'a AtomicBool,
        deadline: Option<Instant>,
    ) -> Self {
        stack.clear();
        Self {
            language,
            input,
            lexer,
            stack,
            reusable: old_root.map(ReusableNode::new),
            cancel,
            deadline,
            cached_token: None,
            finished: None,
            end_recoveries: 0,
        }
    }

    /// Parse to completion and return the root subtree.
    pub fn run(mut self) -> Result<Subtree, ParseError> {
        self.check_interrupt()?;
        let mut last_position = 0usize;
        loop {
            let mut version = 0;
            while version < self.stack.version_count() {
                while self.stack.is_active(version) {
                    self.check_interrupt()?;
                    self.advance(version);
                    let position = self.stack.position(version).byte_len();
                    if position > last_position || (version > 0 && position == last_position) {
                        last_position = position;
                        break;
                    }
                }
                version += 1;
            }
            self.condense();
            if self.stack.version_count() == 0 {
                break;
            }
        }
        Ok(self
            .finished
            .take()
            .unwrap_or_else(|| Subtree::error_node(Vec::new(), false, self.language)))
    }

    fn check_interrupt(&self) -> Result<(), ParseError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(ParseError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ParseError::TimedOut);
        }
        Ok(())
    }

    // ===== Advancing one version =====

    fn advance(&mut self, version: StackVersion) {
        let mut state = self.stack.state(version);
        let mut lookahead = match self.stack.take_lookahead(version) {
            Some(token) => token,
            None => self.next_lookahead(version, state),
        };

        loop {
            if !lookahead.is_leaf() {
                if let Some(next) = self.whole_node_target(state, &lookahead) {
                    self.shift(version, next, lookahead, false);
                    return;
                }
                // A lone reduction depends only on the first leaf; keep the
                // node whole so it can still be shifted in the state below.
                let language = self.language;
                let leaf = first_leaf(&lookahead);
                if let [ParseAction::Reduce { symbol, child_count, production_id, .. }] =
                    *language.table().actions(state, leaf.symbol())
                {
                    match self.reduce(version, symbol, child_count, production_id, false, leaf) {
                        Some(new_version) => {
                            self.stack.renumber_version(new_version, version);
                            if !self.stack.is_active(version) {
                                return;
                            }
                            state = self.stack.state(version);
                        }
                        None => {
                            self.stack.halt(version);
                            return;
                        }
                    }
                    continue;
                }
                lookahead = self.breakdown(version, state, &lookahead);
                continue;
            }

            let symbol = lookahead.symbol();
            let actions: ActionList = self.language.table().actions(state, symbol).iter().copied().collect();
            let mut last_reduction = None;
            let mut reduced = false;
            for action in &actions {
                match *action {
                    ParseAction::Shift { state: next } => {
                        self.shift(version, next, lookahead, false);
                        return;
                    }
                    ParseAction::Reduce {
                        symbol,
                        child_count,
                        production_id,
                        ..
                    } => {
                        reduced = true;
                        let fragile = actions.len() > 1;
                        if let Some(new_version) =
                            self.reduce(version, symbol, child_count, production_id, fragile, &lookahead)
                        {
                            last_reduction = Some(new_version);
                        }
                    }
                    ParseAction::Accept => {
                        self.accept(version);
                        return;
                    }
                }
            }

            if let Some(new_version) = last_reduction {
                self.stack.renumber_version(new_version, version);
                if !self.stack.is_active(version) {
                    return;
                }
                state = self.stack.state(version);
                continue;
            }
            if reduced {
                // Every reduction merged into another version.
                self.stack.halt(version);
                return;
            }

            if actions.is_empty() && symbol != Symbol::END && self.language.is_extra(symbol) {
                self.shift(version, state, lookahead, true);
                return;
            }

            trace!(
                version,
                state,
                symbol = self.language.symbol_name(symbol).unwrap_or("?"),
                "no action, pausing"
            );
            self.stack.pause(version, lookahead);
            return;
        }
    }

    /// Goto state for shifting a reused non-terminal in one step
    fn whole_node_target(&self, state: StateId, tree: &Subtree) -> Option<StateId> {
        if tree.parse_state() != state {
            return None;
        }
        let leaf = first_leaf(tree);
        match self.language.table().actions(state, leaf.symbol()) {
            [ParseAction::Shift { .. }] => self.language.table().goto(state, tree.symbol()),
            _ => None,
        }
    }

    /// Replace a non-terminal lookahead by its first child (or a fresh token).
    fn breakdown(&mut self, version: StackVersion, state: StateId, tree: &Subtree) -> Subtree {
        if let Some(reusable) = self.reusable.as_mut() {
            if reusable.tree().is_some_and(|current| current.ptr_eq(tree)) && !reusable.descend() {
                reusable.advance();
            }
        }
        self.next_lookahead(version, state)
    }

    fn next_lookahead(&mut self, version: StackVersion, state: StateId) -> Subtree {
        if self.stack.version_count() == 1 && !self.stack.error_mode(version) {
            if let Some(tree) = self.reuse_node(version, state) {
                return tree;
            }
        }
        self.lex(version, state)
    }

    pub(super) fn shift(&mut self, version: StackVersion, state: StateId, mut lookahead: Subtree, extra: bool) {
        if let Some(reusable) = self.reusable.as_mut() {
            if reusable.tree().is_some_and(|current| current.ptr_eq(&lookahead)) {
                reusable.advance();
            }
        }
        if lookahead.is_extra() != extra {
            lookahead.make_mut().flags.set(Flags::EXTRA, extra);
        }
        trace!(
            version,
            state,
            symbol = self.language.symbol_name(lookahead.symbol()).unwrap_or("?"),
            extra,
            "shift"
        );
        self.stack.push(version, lookahead, state);
    }

    // ===== Reductions =====

    /// Reduce `child_count` subtrees into `symbol` along every path. Returns
    /// the first version created, unless every result merged into an
    /// existing version.
    fn reduce(
        &mut self,
        version: StackVersion,
        symbol: Symbol,
        child_count: u16,
        production_id: u16,
        fragile: bool,
        lookahead: &Subtree,
    ) -> Option<StackVersion> {
        let initial = self.stack.version_count();
        let lookahead_end = u32::from(self.stack.position(version).bytes)
            + u32::from(lookahead.total_size().bytes)
            + lookahead.lookahead_bytes();
        let slices = self.stack.pop_count(version, usize::from(child_count));
        let mut removed = 0;
        let mut index = 0;

        while index < slices.len() {
            let group_version = slices[index].version;
            let end = slices[index..]
                .iter()
                .position(|slice| slice.version != group_version)
                .map_or(slices.len(), |offset| index + offset);
            let slice_version = group_version - removed;
            let path_count = end - index;

            if slice_version > MAX_VERSIONS + MAX_VERSION_OVERFLOW {
                self.stack.remove_version(slice_version);
                removed += 1;
                index = end;
                continue;
            }

            // Equivalent paths: keep the better reading.
            let mut parent: Option<Subtree> = None;
            let mut trailing = Vec::new();
            let mut ambiguous = false;
            for slice in &slices[index..end] {
                let (children, extras) = split_trailing_extras(slice.subtrees.clone());
                let candidate = Subtree::node(symbol, children, production_id, self.language);
                let replace = match &parent {
                    None => true,
                    Some(current) => match select_tree(current, &candidate) {
                        Selection::Left => false,
                        Selection::Right => true,
                        Selection::Tie => {
                            ambiguous = true;
                            current.compare(&candidate) == CmpOrdering::Greater
                        }
                    },
                };
                if replace {
                    parent = Some(candidate);
                    trailing = extras;
                }
            }
            index = end;
            let Some(mut parent) = parent else { continue };

            let state_below = self.stack.state(slice_version);
            let Some(next) = self.language.table().goto(state_below, symbol) else {
                self.stack.halt(slice_version);
                continue;
            };

            let parent_end = u32::from((self.stack.position(slice_version) + parent.total_size()).bytes);
            {
                let data = parent.make_mut();
                if fragile || path_count > 1 || initial > 1 {
                    data.flags.set(Flags::FRAGILE, true);
                    data.parse_state = NO_STATE;
                } else {
                    data.parse_state = state_below;
                }
                data.lookahead_bytes = data.lookahead_bytes.max(lookahead_end.saturating_sub(parent_end));
            }
            if ambiguous {
                parent = mark_ambiguous(parent);
            }

            trace!(
                version = slice_version,
                symbol = self.language.symbol_name(symbol).unwrap_or("?"),
                child_count,
                state = next,
                "reduce"
            );
            self.stack.push(slice_version, parent, next);
            for extra in trailing {
                self.stack.push(slice_version, extra, next);
            }

            for other in 0..slice_version {
                if other == version {
                    continue;
                }
                if self.stack.merge(other, slice_version) {
                    removed += 1;
                    break;
                }
            }
        }

        (self.stack.version_count() > initial).then_some(initial)
    }

    /// Finish `version`: wrap the stack into a root node and keep it if it
    /// beats the best tree found so far.
    fn accept(&mut self, version: StackVersion) {
        let subtrees = self.stack.pop_all(version);
        let root = match subtrees.iter().rposition(|tree| !tree.is_extra()) {
            Some(index) if !subtrees[index].is_leaf() => {
                let inner = &subtrees[index];
                let mut children = Vec::with_capacity(subtrees.len() + inner.children().len());
                children.extend(subtrees[..index].iter().cloned());
                children.extend(inner.children().iter().cloned());
                children.extend(subtrees[index + 1..].iter().cloned());
                let mut root = Subtree::node(inner.symbol(), children, inner.production_id(), self.language);
                {
                    let data = root.make_mut();
                    data.parse_state = NO_STATE;
                    data.flags.set(Flags::AMBIGUOUS, inner.is_ambiguous());
                }
                root
            }
            _ => Subtree::error_node(subtrees, false, self.language),
        };
        trace!(version, cost = root.error_cost(), "accept");
        self.finish(root);
        self.stack.halt(version);
    }

    pub(super) fn finish(&mut self, root: Subtree) {
        self.finished = match self.finished.take() {
            None => Some(root),
            Some(existing) => Some(choose(&existing, &root).unwrap_or(existing)),
        };
    }

    // ===== Node reuse =====

    fn reuse_node(&mut self, version: StackVersion, state: StateId) -> Option<Subtree> {
        let position = self.stack.position(version).byte_len();
        let last_external = self.stack.last_external_token(version).cloned();
        let language = self.language;
        let table = language.table();
        let reusable = self.reusable.as_mut()?;

        loop {
            let tree = reusable.tree()?.clone();
            let offset = reusable.byte_offset();
            if offset > position {
                return None;
            }
            if offset < position {
                let end = offset + tree.total_size().byte_len();
                if end <= position || !reusable.descend() {
                    reusable.advance();
                }
                continue;
            }
            if !external_state_eq(reusable.last_external_token(), last_external.as_ref()) {
                reusable.advance();
                continue;
            }
            let unusable = tree.has_changes()
                || tree.has_error()
                || tree.is_missing()
                || tree.is_fragile()
                || tree.total_size().is_zero();
            if unusable {
                if !reusable.descend() {
                    reusable.advance();
                }
                continue;
            }
            let leaf = first_leaf(&tree);
            if !leaf.is_leaf() || leaf.is_missing() {
                if !reusable.descend() {
                    reusable.advance();
                }
                continue;
            }
            if table.lex_mode_id(leaf.lex_state()) != table.lex_mode_id(state) {
                if !reusable.descend() {
                    reusable.advance();
                }
                continue;
            }
            trace!(
                version,
                offset,
                symbol = language.symbol_name(tree.symbol()).unwrap_or("?"),
                "reuse"
            );
            return Some(tree);
        }
    }

    // ===== Lexing =====

    fn lex(&mut self, version: StackVersion, state: StateId) -> Subtree {
        let position = self.stack.position(version);
        let error_mode = self.stack.error_mode(version);
        let lex_mode = self.language.table().lex_mode_id(state);
        let last_external = self.stack.last_external_token(version).cloned();

        if !error_mode {
            if let Some(cached) = &self.cached_token {
                if cached.position == position.byte_len()
                    && cached.lex_mode == lex_mode
                    && external_state_eq(cached.last_external_token.as_ref(), last_external.as_ref())
                {
                    return cached.token.clone();
                }
            }
        }

        let token = self.lexer.lex(
            self.language,
            &self.input,
            LexRequest {
                position,
                lex_state: state,
                external_state: last_external.as_ref().and_then(Subtree::external_state),
                error_mode,
            },
        );
        if error_mode {
            self.stack.set_error_mode(version, false);
        } else {
            self.cached_token = Some(CachedToken {
                position: position.byte_len(),
                lex_mode,
                last_external_token: last_external,
                token: token.clone(),
            });
        }
        token
    }

    // ===== Condensing =====

    /// Drop halted and hopeless versions, merge equivalent ones, and start
    /// recovery when nothing else can make progress.
    fn condense(&mut self) {
        let mut i = 0;
        while i < self.stack.version_count() {
            if self.stack.status(i) == VersionStatus::Halted {
                self.stack.remove_version(i);
                continue;
            }
            let mut removed_i = false;
            let mut j = 0;
            while j < i {
                if self.stack.merge(j, i) {
                    removed_i = true;
                    break;
                }
                let (cost_j, cost_i) = (self.stack.error_cost(j), self.stack.error_cost(i));
                if cost_i > cost_j + MAX_COST_DIFFERENCE {
                    self.stack.remove_version(i);
                    removed_i = true;
                    break;
                }
                if cost_j > cost_i + MAX_COST_DIFFERENCE {
                    self.stack.remove_version(j);
                    i -= 1;
                    continue;
                }
                j += 1;
            }
            if !removed_i {
                i += 1;
            }
        }

        while self.stack.version_count() > MAX_VERSIONS {
            let worst = (0..self.stack.version_count())
                .max_by_key(|&version| (self.stack.error_cost(version), version))
                .unwrap_or(MAX_VERSIONS);
            self.stack.remove_version(worst);
        }

        if let Some(finished) = &self.finished {
            let limit = finished.error_cost();
            let mut version = 0;
            while version < self.stack.version_count() {
                if self.stack.error_cost(version) > limit {
                    self.stack.remove_version(version);
                } else {
                    version += 1;
                }
            }
        }

        let any_active = (0..self.stack.version_count()).any(|version| self.stack.is_active(version));
        if any_active {
            let mut version = 0;
            while version < self.stack.version_count() {
                if self.stack.is_active(version) {
                    version += 1;
                } else {
                    self.stack.remove_version(version);
                }
            }
            return;
        }

        let best = (0..self.stack.version_count()).min_by(|&a, &b| {
            self.stack
                .error_cost(a)
                .cmp(&self.stack.error_cost(b))
                .then(self.stack.position(b).bytes.cmp(&self.stack.position(a).bytes))
                .then(a.cmp(&b))
        });
        let Some(best) = best else { return };
        for version in (0..self.stack.version_count()).rev() {
            if version != best {
                self.stack.remove_version(version);
            }
        }
        self.recover(0);
    }
}

// ===== Helpers =====

/// Leftmost descendant without children
pub(super) fn first_leaf(tree: &Subtree) -> &Subtree {
    let mut tree = tree;
    while let Some(child) = tree.children().first() {
        tree = child;
    }
    tree
}

fn split_trailing_extras(mut subtrees: Vec<Subtree>) -> (Vec<Subtree>, Vec<Subtree>) {
    let keep = subtrees
        .iter()
        .rposition(|tree| !tree.is_extra())
        .map_or(0, |index| index + 1);
    let trailing = subtrees.split_off(keep);
    (subtrees, trailing)
}
