//! Graph-structured parse stack
//!
//! ```text
//!            ┌── [7 expr] ◀─┐
//! [0] ◀─ [3 a] ◀─ [5 +] ◀───┴── [9 expr]   two paths, one head
//! ```
//!
//! Nodes live in an arena and point *down* to their predecessors through
//! links that carry the pushed subtree. Each parse version is a head index
//! into the arena. Forked versions share their common prefix; merged versions
//! share a head with several links.

use std::cmp::Ordering;

use smallvec::SmallVec;
use tracing::trace;

use crate::base::Length;
use crate::grammar::StateId;
use crate::tree::subtree::{Flags, Subtree, external_state_eq};

/// Upper bound on simultaneously live versions
pub(crate) const MAX_VERSIONS: usize = 6;
const MAX_LINKS: usize = 8;
const MAX_POP_PATHS: usize = 64;

pub(crate) type StackNodeId = usize;
pub(crate) type StackVersion = usize;

#[derive(Clone)]
struct StackLink {
    node: StackNodeId,
    subtree: Subtree,
}

struct StackNode {
    state: StateId,
    position: Length,
    links: SmallVec<[StackLink; 2]>,
    error_cost: u32,
    dynamic_precedence: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionStatus {
    Active,
    /// Stopped on a token it cannot handle; waiting for recovery
    Paused,
    /// Finished or abandoned; removed at the next condense
    Halted,
}

#[derive(Clone)]
struct StackHead {
    node: StackNodeId,
    status: VersionStatus,
    last_external_token: Option<Subtree>,
    /// Token to process before lexing again
    lookahead: Option<Subtree>,
    /// Byte offset of the last MISSING insertion
    missing_at: Option<usize>,
    /// Lex the next token ignoring the lex mode
    error_mode: bool,
}

/// Subtrees popped along one path, in document order
pub(crate) struct StackSlice {
    pub version: StackVersion,
    pub subtrees: Vec<Subtree>,
}

pub(crate) struct Stack {
    nodes: Vec<StackNode>,
    heads: Vec<StackHead>,
}

impl Default for Stack {
    fn default() -> Self {
        let mut stack = Self {
            nodes: Vec::new(),
            heads: Vec::new(),
        };
        stack.clear();
        stack
    }
}

impl Stack {
    /// Drop everything and start over with one version in state 0.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.heads.clear();
        self.nodes.push(StackNode {
            state: 0,
            position: Length::ZERO,
            links: SmallVec::new(),
            error_cost: 0,
            dynamic_precedence: 0,
        });
        self.heads.push(StackHead {
            node: 0,
            status: VersionStatus::Active,
            last_external_token: None,
            lookahead: None,
            missing_at: None,
            error_mode: false,
        });
    }

    // ===== Version queries =====

    pub fn version_count(&self) -> usize {
        self.heads.len()
    }

    fn node(&self, version: StackVersion) -> &StackNode {
        &self.nodes[self.heads[version].node]
    }

    pub fn state(&self, version: StackVersion) -> StateId {
        self.node(version).state
    }

    pub fn position(&self, version: StackVersion) -> Length {
        self.node(version).position
    }

    /// Error cost of everything on the stack, plus one recovery if paused
    pub fn error_cost(&self, version: StackVersion) -> u32 {
        let cost = self.node(version).error_cost;
        if self.heads[version].status == VersionStatus::Paused {
            cost + crate::tree::subtree::ERROR_COST_PER_RECOVERY
        } else {
            cost
        }
    }

    pub fn status(&self, version: StackVersion) -> VersionStatus {
        self.heads[version].status
    }

    pub fn is_active(&self, version: StackVersion) -> bool {
        self.status(version) == VersionStatus::Active
    }

    pub fn last_external_token(&self, version: StackVersion) -> Option<&Subtree> {
        self.heads[version].last_external_token.as_ref()
    }

    pub fn missing_at(&self, version: StackVersion) -> Option<usize> {
        self.heads[version].missing_at
    }

    pub fn set_missing_at(&mut self, version: StackVersion, position: usize) {
        self.heads[version].missing_at = Some(position);
    }

    pub fn error_mode(&self, version: StackVersion) -> bool {
        self.heads[version].error_mode
    }

    pub fn set_error_mode(&mut self, version: StackVersion, error_mode: bool) {
        self.heads[version].error_mode = error_mode;
    }

    // ===== Version lifecycle =====

    pub fn pause(&mut self, version: StackVersion, lookahead: Subtree) {
        let head = &mut self.heads[version];
        head.status = VersionStatus::Paused;
        head.lookahead = Some(lookahead);
    }

    /// Reactivate a paused version, handing back the token it stopped on.
    pub fn resume(&mut self, version: StackVersion) -> Option<Subtree> {
        let head = &mut self.heads[version];
        head.status = VersionStatus::Active;
        head.lookahead.take()
    }

    pub fn set_lookahead(&mut self, version: StackVersion, lookahead: Subtree) {
        self.heads[version].lookahead = Some(lookahead);
    }

    pub fn take_lookahead(&mut self, version: StackVersion) -> Option<Subtree> {
        self.heads[version].lookahead.take()
    }

    pub fn halt(&mut self, version: StackVersion) {
        self.heads[version].status = VersionStatus::Halted;
    }

    pub fn remove_version(&mut self, version: StackVersion) {
        self.heads.remove(version);
    }

    /// Move `from` into the slot of `to`, dropping what was there.
    pub fn renumber_version(&mut self, from: StackVersion, to: StackVersion) {
        if from == to {
            return;
        }
        let head = self.heads.remove(from);
        self.heads[to] = head;
    }

    #[cfg(test)]
    pub fn copy_version(&mut self, version: StackVersion) -> StackVersion {
        let head = self.heads[version].clone();
        self.heads.push(head);
        self.heads.len() - 1
    }

    // ===== Push and pop =====

    pub fn push(&mut self, version: StackVersion, subtree: Subtree, state: StateId) {
        let previous = self.heads[version].node;
        let below = &self.nodes[previous];
        let node = StackNode {
            state,
            position: below.position + subtree.total_size(),
            error_cost: below.error_cost + subtree.error_cost(),
            dynamic_precedence: below.dynamic_precedence + subtree.dynamic_precedence(),
            links: SmallVec::new(),
        };
        let external = subtree.last_external_token().cloned();
        self.nodes.push(node);
        let id = self.nodes.len() - 1;
        self.nodes[id].links.push(StackLink {
            node: previous,
            subtree,
        });
        let head = &mut self.heads[version];
        head.node = id;
        if external.is_some() {
            head.last_external_token = external;
        }
    }

    /// Pop `count` non-extra subtrees along every path below `version`.
    ///
    /// Extras met on the way are included but not counted. Each distinct
    /// node the paths end at becomes a new version; slices ending at the same
    /// node are adjacent and share a version. `version` itself is untouched.
    pub fn pop_count(&mut self, version: StackVersion, count: usize) -> Vec<StackSlice> {
        #[derive(Clone)]
        struct Path {
            node: StackNodeId,
            subtrees: Vec<Subtree>,
            remaining: usize,
        }

        let mut paths = vec![Path {
            node: self.heads[version].node,
            subtrees: Vec::new(),
            remaining: count,
        }];
        let mut index = 0;
        while index < paths.len() {
            if paths[index].remaining == 0 {
                index += 1;
                continue;
            }
            let links = self.nodes[paths[index].node].links.clone();
            let Some((first, rest)) = links.split_first() else {
                // Bottom of the stack before `count` subtrees
                paths.remove(index);
                continue;
            };
            for link in rest {
                if paths.len() >= MAX_POP_PATHS {
                    break;
                }
                let mut forked = paths[index].clone();
                follow(&mut forked.subtrees, &mut forked.remaining, &mut forked.node, link);
                paths.push(forked);
            }
            let path = &mut paths[index];
            follow(&mut path.subtrees, &mut path.remaining, &mut path.node, first);
        }

        // Group by end node, keeping first-seen order.
        let mut ends: Vec<StackNodeId> = Vec::new();
        for path in &paths {
            if !ends.contains(&path.node) {
                ends.push(path.node);
            }
        }
        let mut slices = Vec::with_capacity(paths.len());
        for end in ends {
            let mut head = self.heads[version].clone();
            head.node = end;
            head.lookahead = None;
            self.heads.push(head);
            let new_version = self.heads.len() - 1;
            for path in paths.iter().filter(|path| path.node == end) {
                let mut subtrees = path.subtrees.clone();
                subtrees.reverse();
                slices.push(StackSlice {
                    version: new_version,
                    subtrees,
                });
            }
        }
        slices
    }

    /// States below the head along the first path, nearest first.
    pub fn states_below(&self, version: StackVersion, max_depth: usize) -> Vec<StateId> {
        let mut states = Vec::new();
        let mut node = &self.nodes[self.heads[version].node];
        while states.len() < max_depth {
            let Some(link) = node.links.first() else { break };
            node = &self.nodes[link.node];
            states.push(node.state);
        }
        states
    }

    /// Topmost subtrees along the first path, nearest first.
    pub fn top_subtrees(&self, version: StackVersion, max_depth: usize) -> Vec<Subtree> {
        let mut subtrees = Vec::new();
        let mut node = &self.nodes[self.heads[version].node];
        while subtrees.len() < max_depth {
            let Some(link) = node.links.first() else { break };
            subtrees.push(link.subtree.clone());
            node = &self.nodes[link.node];
        }
        subtrees
    }

    /// Move the head `depth` entries down the first path and return the
    /// subtrees passed over, in document order.
    pub fn pop_to(&mut self, version: StackVersion, depth: usize) -> Vec<Subtree> {
        let mut subtrees = Vec::new();
        let mut node = self.heads[version].node;
        while subtrees.len() < depth {
            let Some(link) = self.nodes[node].links.first() else { break };
            subtrees.push(link.subtree.clone());
            node = link.node;
        }
        self.heads[version].node = node;
        subtrees.reverse();
        subtrees
    }

    /// Everything on the first path, in document order.
    pub fn pop_all(&mut self, version: StackVersion) -> Vec<Subtree> {
        self.pop_to(version, usize::MAX)
    }

    // ===== Merging =====

    pub fn can_merge(&self, left: StackVersion, right: StackVersion) -> bool {
        let (a, b) = (&self.heads[left], &self.heads[right]);
        let (node_a, node_b) = (&self.nodes[a.node], &self.nodes[b.node]);
        a.status == VersionStatus::Active
            && b.status == VersionStatus::Active
            && node_a.state == node_b.state
            && node_a.position.bytes == node_b.position.bytes
            && node_a.error_cost == node_b.error_cost
            && external_state_eq(a.last_external_token.as_ref(), b.last_external_token.as_ref())
    }

    /// Fold `right` into `left` when they are interchangeable from here on.
    pub fn merge(&mut self, left: StackVersion, right: StackVersion) -> bool {
        if !self.can_merge(left, right) {
            return false;
        }
        let target = self.heads[left].node;
        let source = self.heads[right].node;
        if target != source {
            let links = self.nodes[source].links.clone();
            for link in links {
                self.add_link(target, link);
            }
            let precedence = self.nodes[source].dynamic_precedence;
            let node = &mut self.nodes[target];
            node.dynamic_precedence = node.dynamic_precedence.max(precedence);
        }
        trace!(left, right, state = self.nodes[target].state, "merged versions");
        self.remove_version(right);
        true
    }

    fn add_link(&mut self, node: StackNodeId, link: StackLink) {
        if link.node == node {
            return;
        }
        let link_node = &self.nodes[link.node];
        let (link_state, link_position, link_cost) = (link_node.state, link_node.position.bytes, link_node.error_cost);
        for index in 0..self.nodes[node].links.len() {
            let existing = self.nodes[node].links[index].clone();
            if !equivalent(&existing.subtree, &link.subtree) {
                continue;
            }
            if existing.node == link.node {
                // Two readings between the same pair of nodes: decide now.
                if let Some(chosen) = choose(&existing.subtree, &link.subtree) {
                    self.nodes[node].links[index].subtree = chosen;
                }
                return;
            }
            let existing_node = &self.nodes[existing.node];
            if existing_node.state == link_state
                && existing_node.position.bytes == link_position
                && existing_node.error_cost == link_cost
            {
                let nested = self.nodes[link.node].links.clone();
                for nested_link in nested {
                    self.add_link(existing.node, nested_link);
                }
                return;
            }
        }
        if self.nodes[node].links.len() < MAX_LINKS {
            self.nodes[node].links.push(link);
        }
    }
}

fn follow(subtrees: &mut Vec<Subtree>, remaining: &mut usize, node: &mut StackNodeId, link: &StackLink) {
    if !link.subtree.is_extra() {
        *remaining -= 1;
    }
    subtrees.push(link.subtree.clone());
    *node = link.node;
}

/// Subtrees that may stand for each other on a link
fn equivalent(left: &Subtree, right: &Subtree) -> bool {
    if left.ptr_eq(right) {
        return true;
    }
    left.symbol() == right.symbol()
        && left.padding().bytes == right.padding().bytes
        && left.size().bytes == right.size().bytes
        && left.is_extra() == right.is_extra()
}

/// Outcome of comparing two readings of the same input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selection {
    Left,
    Right,
    /// Equally good but different; the left one is kept
    Tie,
}

/// Pick between two readings: lower error cost, then higher dynamic
/// precedence, then a deterministic structural order.
pub(crate) fn select_tree(left: &Subtree, right: &Subtree) -> Selection {
    if left.ptr_eq(right) {
        return Selection::Left;
    }
    match left.error_cost().cmp(&right.error_cost()) {
        Ordering::Less => return Selection::Left,
        Ordering::Greater => return Selection::Right,
        Ordering::Equal => {}
    }
    match left.dynamic_precedence().cmp(&right.dynamic_precedence()) {
        Ordering::Greater => return Selection::Left,
        Ordering::Less => return Selection::Right,
        Ordering::Equal => {}
    }
    if left.error_cost() > 0 {
        return Selection::Left;
    }
    match left.compare(right) {
        Ordering::Equal => Selection::Left,
        _ => Selection::Tie,
    }
}

/// The reading to keep in place of `existing`, if it changes
pub(crate) fn choose(existing: &Subtree, candidate: &Subtree) -> Option<Subtree> {
    match select_tree(existing, candidate) {
        Selection::Left => None,
        Selection::Right => Some(candidate.clone()),
        Selection::Tie => {
            let preferred = match existing.compare(candidate) {
                Ordering::Greater => candidate,
                _ => existing,
            };
            Some(mark_ambiguous(preferred.clone()))
        }
    }
}

pub(crate) fn mark_ambiguous(mut tree: Subtree) -> Subtree {
    if !tree.is_ambiguous() {
        tree.make_mut().flags.set(Flags::AMBIGUOUS, true);
    }
    tree
}
