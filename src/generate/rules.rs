//! Rule combinators
//!
//! Grammars are written as nested [`Rule`] values built with the functions in
//! this module:
//!
//! ```
//! use sitter::generate::{choice, optional, repeat, seq, string, sym};
//!
//! let list = seq([string("["), optional(sym("items")), string("]")]);
//! let items = seq([sym("item"), repeat(seq([string(","), sym("item")]))]);
//! # let _ = (list, items, choice([string("a")]));
//! ```

use smol_str::SmolStr;

/// A grammar rule expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Matches nothing
    Blank,
    /// A literal token
    String(SmolStr),
    /// A pattern token
    Pattern(SmolStr),
    /// Reference to another rule or to an external token
    Symbol(SmolStr),
    Seq(Vec<Rule>),
    Choice(Vec<Rule>),
    /// One or more repetitions
    Repeat1(Box<Rule>),
    /// Collapse the inner rule into a single token
    Token(Box<Rule>),
    Field(SmolStr, Box<Rule>),
    Alias {
        value: SmolStr,
        named: bool,
        rule: Box<Rule>,
    },
    Prec(Precedence, Box<Rule>),
}

/// Precedence annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precedence {
    /// Resolves shift/reduce conflicts by level only
    Value(i16),
    /// Equal levels reduce
    Left(i16),
    /// Equal levels shift
    Right(i16),
    /// Breaks ties between complete alternative parses at runtime
    Dynamic(i16),
}

impl Precedence {
    pub fn value(self) -> i16 {
        match self {
            Self::Value(v) | Self::Left(v) | Self::Right(v) | Self::Dynamic(v) => v,
        }
    }
}

pub fn blank() -> Rule {
    Rule::Blank
}

pub fn string(text: impl Into<SmolStr>) -> Rule {
    Rule::String(text.into())
}

pub fn pattern(regex: impl Into<SmolStr>) -> Rule {
    Rule::Pattern(regex.into())
}

pub fn sym(name: impl Into<SmolStr>) -> Rule {
    Rule::Symbol(name.into())
}

pub fn seq(rules: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Seq(rules.into_iter().collect())
}

pub fn choice(rules: impl IntoIterator<Item = Rule>) -> Rule {
    Rule::Choice(rules.into_iter().collect())
}

pub fn repeat(rule: Rule) -> Rule {
    optional(repeat1(rule))
}

pub fn repeat1(rule: Rule) -> Rule {
    Rule::Repeat1(Box::new(rule))
}

pub fn optional(rule: Rule) -> Rule {
    choice([rule, blank()])
}

pub fn token(rule: Rule) -> Rule {
    Rule::Token(Box::new(rule))
}

pub fn field(name: impl Into<SmolStr>, rule: Rule) -> Rule {
    Rule::Field(name.into(), Box::new(rule))
}

/// Rename the node produced by `rule`. Named aliases look like rule names,
/// anonymous ones like string literals.
pub fn alias(rule: Rule, value: impl Into<SmolStr>, named: bool) -> Rule {
    Rule::Alias {
        value: value.into(),
        named,
        rule: Box::new(rule),
    }
}

pub fn prec(level: i16, rule: Rule) -> Rule {
    Rule::Prec(Precedence::Value(level), Box::new(rule))
}

pub fn prec_left(level: i16, rule: Rule) -> Rule {
    Rule::Prec(Precedence::Left(level), Box::new(rule))
}

pub fn prec_right(level: i16, rule: Rule) -> Rule {
    Rule::Prec(Precedence::Right(level), Box::new(rule))
}

pub fn prec_dynamic(level: i16, rule: Rule) -> Rule {
    Rule::Prec(Precedence::Dynamic(level), Box::new(rule))
}

/// `rule (separator rule)*`
pub fn sep1(rule: Rule, separator: Rule) -> Rule {
    seq([rule.clone(), repeat(seq([separator, rule]))])
}
