//! Reference-counted subtree storage
//!
//! A [`Subtree`] never records where it sits in the document. It records its
//! *padding* (bytes before it that belong to no leaf) and its *size*; the
//! absolute position comes from summing everything to its left. That is what
//! lets an edited tree share every untouched subtree with the previous one.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::base::Length;
use crate::grammar::{Language, StateId, Symbol};

// ===== Error costs =====

pub(crate) const ERROR_COST_PER_RECOVERY: u32 = 500;
pub(crate) const ERROR_COST_PER_MISSING_TREE: u32 = 110;
pub(crate) const ERROR_COST_PER_SKIPPED_TREE: u32 = 100;
pub(crate) const ERROR_COST_PER_SKIPPED_CHAR: u32 = 1;
pub(crate) const ERROR_COST_PER_SKIPPED_LINE: u32 = 30;

/// Per-subtree boolean properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Flags(u16);

impl Flags {
    pub const VISIBLE: u16 = 1 << 0;
    pub const NAMED: u16 = 1 << 1;
    pub const EXTRA: u16 = 1 << 2;
    pub const FRAGILE: u16 = 1 << 3;
    pub const HAS_CHANGES: u16 = 1 << 4;
    pub const MISSING: u16 = 1 << 5;
    pub const HAS_EXTERNAL_TOKENS: u16 = 1 << 7;
    pub const AMBIGUOUS: u16 = 1 << 8;
    pub const HAS_ERROR: u16 = 1 << 9;
    pub const LEAF: u16 = 1 << 10;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u16, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

#[derive(Clone)]
pub(crate) struct SubtreeData {
    pub symbol: Symbol,
    pub padding: Length,
    pub size: Length,
    /// Bytes past the end that were examined while producing this subtree
    pub lookahead_bytes: u32,
    /// State in which the subtree was pushed (the state before it)
    pub parse_state: StateId,
    /// State whose lex mode produced the first token
    pub lex_state: StateId,
    pub flags: Flags,
    pub error_cost: u32,
    pub dynamic_precedence: i32,
    pub production_id: u16,
    pub visible_child_count: u32,
    pub named_child_count: u32,
    pub node_count: u32,
    pub children: Vec<Subtree>,
    /// Serialized scanner state after an external token
    pub external_state: Option<Arc<[u8]>>,
}

/// Leaf description handed to [`Subtree::leaf`]
#[derive(Debug, Clone)]
pub(crate) struct LeafSpec {
    pub symbol: Symbol,
    pub padding: Length,
    pub size: Length,
    pub lookahead_bytes: u32,
    pub lex_state: StateId,
    pub visible: bool,
    pub named: bool,
    /// `Some` for tokens produced by the external scanner
    pub external_state: Option<Arc<[u8]>>,
}

/// An immutable, shared subtree
#[derive(Clone)]
pub(crate) struct Subtree(Arc<SubtreeData>);

impl Subtree {
    // ===== Construction =====

    pub fn leaf(spec: LeafSpec) -> Self {
        let mut flags = Flags::default();
        flags.set(Flags::LEAF, true);
        flags.set(Flags::VISIBLE, spec.visible);
        flags.set(Flags::NAMED, spec.named);
        flags.set(Flags::HAS_EXTERNAL_TOKENS, spec.external_state.is_some());
        Self(Arc::new(SubtreeData {
            symbol: spec.symbol,
            padding: spec.padding,
            size: spec.size,
            lookahead_bytes: spec.lookahead_bytes,
            parse_state: 0,
            lex_state: spec.lex_state,
            flags,
            error_cost: 0,
            dynamic_precedence: 0,
            production_id: 0,
            visible_child_count: 0,
            named_child_count: 0,
            node_count: 1,
            children: Vec::new(),
            external_state: spec.external_state,
        }))
    }

    /// Characters no token rule accepts
    pub fn error_leaf(padding: Length, size: Length, lookahead_bytes: u32, lex_state: StateId) -> Self {
        let mut leaf = Self::leaf(LeafSpec {
            symbol: Symbol::ERROR,
            padding,
            size,
            lookahead_bytes,
            lex_state,
            visible: true,
            named: true,
            external_state: None,
        });
        let data = leaf.make_mut();
        data.error_cost = ERROR_COST_PER_RECOVERY
            + ERROR_COST_PER_SKIPPED_CHAR * u32::from(size.bytes)
            + ERROR_COST_PER_SKIPPED_LINE * size.extent.row as u32;
        data.flags.set(Flags::HAS_ERROR, true);
        leaf
    }

    /// A zero-width token inserted by error recovery
    pub fn missing_leaf(symbol: Symbol, padding: Length, lex_state: StateId, language: &Language) -> Self {
        let mut leaf = Self::leaf(LeafSpec {
            symbol,
            padding,
            size: Length::ZERO,
            lookahead_bytes: 0,
            lex_state,
            visible: language.is_visible(symbol),
            named: language.is_named(symbol),
            external_state: None,
        });
        let data = leaf.make_mut();
        data.error_cost = ERROR_COST_PER_MISSING_TREE + ERROR_COST_PER_RECOVERY;
        data.flags.set(Flags::MISSING, true);
        data.flags.set(Flags::HAS_ERROR, true);
        leaf
    }

    /// Interior node; metrics are summarized from the children.
    pub fn node(symbol: Symbol, children: Vec<Subtree>, production_id: u16, language: &Language) -> Self {
        let mut flags = Flags::default();
        flags.set(Flags::VISIBLE, language.is_visible(symbol));
        flags.set(Flags::NAMED, language.is_named(symbol));
        let mut data = SubtreeData {
            symbol,
            padding: Length::ZERO,
            size: Length::ZERO,
            lookahead_bytes: 0,
            parse_state: 0,
            lex_state: 0,
            flags,
            error_cost: 0,
            dynamic_precedence: 0,
            production_id,
            visible_child_count: 0,
            named_child_count: 0,
            node_count: 1,
            children,
            external_state: None,
        };
        summarize(&mut data, language);
        Self(Arc::new(data))
    }

    /// An `ERROR` node wrapping skipped or unparseable subtrees
    pub fn error_node(children: Vec<Subtree>, extra: bool, language: &Language) -> Self {
        let mut node = Self::node(Symbol::ERROR, children, 0, language);
        if extra {
            node.make_mut().flags.set(Flags::EXTRA, true);
        }
        node
    }

    pub fn make_mut(&mut self) -> &mut SubtreeData {
        Arc::make_mut(&mut self.0)
    }

    // ===== Accessors =====

    pub fn data(&self) -> &SubtreeData {
        &self.0
    }

    pub fn symbol(&self) -> Symbol {
        self.0.symbol
    }

    pub fn padding(&self) -> Length {
        self.0.padding
    }

    pub fn size(&self) -> Length {
        self.0.size
    }

    pub fn total_size(&self) -> Length {
        self.0.padding + self.0.size
    }

    pub fn children(&self) -> &[Subtree] {
        &self.0.children
    }

    pub fn is_leaf(&self) -> bool {
        self.0.flags.contains(Flags::LEAF)
    }

    pub fn is_visible(&self) -> bool {
        self.0.flags.contains(Flags::VISIBLE)
    }

    pub fn is_named(&self) -> bool {
        self.0.flags.contains(Flags::NAMED)
    }

    pub fn is_extra(&self) -> bool {
        self.0.flags.contains(Flags::EXTRA)
    }

    pub fn is_fragile(&self) -> bool {
        self.0.flags.contains(Flags::FRAGILE)
    }

    pub fn has_changes(&self) -> bool {
        self.0.flags.contains(Flags::HAS_CHANGES)
    }

    pub fn is_missing(&self) -> bool {
        self.0.flags.contains(Flags::MISSING)
    }

    pub fn has_external_tokens(&self) -> bool {
        self.0.flags.contains(Flags::HAS_EXTERNAL_TOKENS)
    }

    pub fn is_ambiguous(&self) -> bool {
        self.0.flags.contains(Flags::AMBIGUOUS)
    }

    pub fn has_error(&self) -> bool {
        self.0.flags.contains(Flags::HAS_ERROR)
    }

    pub fn is_error(&self) -> bool {
        self.0.symbol == Symbol::ERROR
    }

    pub fn error_cost(&self) -> u32 {
        self.0.error_cost
    }

    pub fn dynamic_precedence(&self) -> i32 {
        self.0.dynamic_precedence
    }

    pub fn lookahead_bytes(&self) -> u32 {
        self.0.lookahead_bytes
    }

    pub fn parse_state(&self) -> StateId {
        self.0.parse_state
    }

    pub fn lex_state(&self) -> StateId {
        self.0.lex_state
    }

    pub fn production_id(&self) -> u16 {
        self.0.production_id
    }

    pub fn node_count(&self) -> u32 {
        self.0.node_count
    }

    pub fn visible_child_count(&self) -> u32 {
        self.0.visible_child_count
    }

    pub fn named_child_count(&self) -> u32 {
        self.0.named_child_count
    }

    pub fn external_state(&self) -> Option<&[u8]> {
        self.0.external_state.as_deref()
    }

    /// Stable identity of the shared allocation
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Subtree) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Last external token inside this subtree
    pub fn last_external_token(&self) -> Option<&Subtree> {
        if !self.has_external_tokens() {
            return None;
        }
        let mut tree = self;
        while !tree.is_leaf() {
            tree = tree.children().iter().rev().find(|child| child.has_external_tokens())?;
        }
        Some(tree)
    }

    // ===== Comparison =====

    /// Equality of everything observable through the node API
    pub fn structurally_equal(&self, other: &Subtree) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        const OBSERVABLE: u16 =
            Flags::EXTRA | Flags::MISSING | Flags::HAS_ERROR | Flags::AMBIGUOUS | Flags::LEAF;
        let (a, b) = (&self.0, &other.0);
        a.symbol == b.symbol
            && a.padding == b.padding
            && a.size == b.size
            && a.flags.0 & OBSERVABLE == b.flags.0 & OBSERVABLE
            && a.production_id == b.production_id
            && a.children.len() == b.children.len()
            && a
                .children
                .iter()
                .zip(&b.children)
                .all(|(x, y)| x.structurally_equal(y))
    }

    /// Deterministic total order used to break ties between equivalent parses
    pub fn compare(&self, other: &Subtree) -> Ordering {
        if self.ptr_eq(other) {
            return Ordering::Equal;
        }
        self.symbol()
            .cmp(&other.symbol())
            .then(self.children().len().cmp(&other.children().len()))
            .then_with(|| {
                self.children()
                    .iter()
                    .zip(other.children())
                    .map(|(a, b)| a.compare(b))
                    .find(|order| order.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }
}

/// Scanner states are equal when both are absent or byte-identical.
pub(crate) fn external_state_eq(a: Option<&Subtree>, b: Option<&Subtree>) -> bool {
    fn state(tree: Option<&Subtree>) -> &[u8] {
        tree.and_then(Subtree::external_state).unwrap_or(&[])
    }
    state(a) == state(b)
}

/// Recompute the metrics of an interior node from its children.
pub(crate) fn summarize(data: &mut SubtreeData, language: &Language) {
    let is_error = data.symbol == Symbol::ERROR;
    let production = if is_error {
        None
    } else {
        language.production(data.production_id)
    };

    data.visible_child_count = 0;
    data.named_child_count = 0;
    data.node_count = 1;
    data.error_cost = 0;
    data.dynamic_precedence = production.map_or(0, |p| i32::from(p.dynamic_precedence));
    data.flags.set(Flags::HAS_EXTERNAL_TOKENS, false);
    data.flags.set(Flags::HAS_ERROR, is_error);

    let mut offset = Length::ZERO;
    let mut lookahead_end = 0u32;
    let mut structural_index = 0;
    for (index, child) in data.children.iter().enumerate() {
        let child_data = child.data();
        if index == 0 {
            data.padding = child.padding();
            data.lex_state = child.lex_state();
        }
        offset += child.total_size();
        lookahead_end = lookahead_end.max(u32::from(offset.bytes) + child.lookahead_bytes());

        data.node_count += child.node_count();
        data.error_cost += child.error_cost();
        data.dynamic_precedence += child.dynamic_precedence();
        if child.has_external_tokens() {
            data.flags.set(Flags::HAS_EXTERNAL_TOKENS, true);
        }
        if child.has_error() {
            data.flags.set(Flags::HAS_ERROR, true);
        }

        let alias = if child.is_extra() {
            None
        } else {
            let alias = production.and_then(|p| p.alias_at(structural_index));
            structural_index += 1;
            alias
        };
        let (visible, named) = match alias {
            Some(symbol) => (language.is_visible(symbol), language.is_named(symbol)),
            None => (child.is_visible(), child.is_named()),
        };
        if visible {
            data.visible_child_count += 1;
            if named {
                data.named_child_count += 1;
            }
        } else if !child.is_leaf() {
            data.visible_child_count += child_data.visible_child_count;
            data.named_child_count += child_data.named_child_count;
        }

        if is_error && !child.is_extra() && !(child.is_error() && child.is_leaf()) {
            if child.is_visible() {
                data.error_cost += ERROR_COST_PER_SKIPPED_TREE;
            } else if !child.is_leaf() {
                data.error_cost += ERROR_COST_PER_SKIPPED_TREE * child_data.visible_child_count;
            }
        }
    }

    let total = offset;
    data.size = total - data.padding;
    data.lookahead_bytes = lookahead_end.saturating_sub(u32::from(total.bytes));

    if is_error {
        data.error_cost += ERROR_COST_PER_RECOVERY
            + ERROR_COST_PER_SKIPPED_CHAR * u32::from(data.size.bytes)
            + ERROR_COST_PER_SKIPPED_LINE * data.size.extent.row as u32;
    }

    let fragile = match (data.children.first(), data.children.last()) {
        (Some(first), Some(last)) => first.is_fragile() || last.is_fragile(),
        _ => false,
    };
    data.flags.set(Flags::FRAGILE, fragile);
}

impl fmt::Debug for Subtree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = &self.0;
        if self.is_leaf() {
            write!(
                f,
                "Leaf({} pad={} size={}{})",
                data.symbol.0,
                data.padding.byte_len(),
                data.size.byte_len(),
                if self.is_missing() { " missing" } else { "" }
            )
        } else {
            f.debug_struct("Node")
                .field("symbol", &data.symbol.0)
                .field("size", &data.size.byte_len())
                .field("children", &data.children)
                .finish()
        }
    }
}
