//! Lowering rule trees into flat productions
//!
//! Every rule becomes either a token (a named terminal, when its body is a
//! string, a pattern or a `token(...)`) or a syntax variable with a list of
//! alternative productions. Choices are multiplied out, `repeat1` becomes a
//! hidden left-recursive helper and inline strings or patterns become
//! anonymous terminals.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::{SmolStr, format_smolstr};

use super::pattern::{RegexAst, parse_pattern};
use super::rules::{Precedence, Rule};
use crate::error::GrammarError;
use crate::grammar::TokenConflictPolicy;

/// Upper bound on the productions a single rule may expand into
const MAX_EXPANSION: usize = 4096;

/// Grammar definition collected by the builder
#[derive(Debug, Clone, Default)]
pub(crate) struct InputGrammar {
    pub name: SmolStr,
    pub rules: IndexMap<SmolStr, Rule>,
    pub extras: Vec<Rule>,
    pub externals: Vec<SmolStr>,
    pub word: Option<SmolStr>,
    pub policy: TokenConflictPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TokenSource {
    Literal(SmolStr),
    Pattern(RegexAst),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexicalVariable {
    pub name: SmolStr,
    pub named: bool,
    pub visible: bool,
    pub source: TokenSource,
    pub precedence: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SymbolRef {
    Terminal(usize),
    External(usize),
    Variable(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) enum Assoc {
    #[default]
    None,
    Left,
    Right,
}

/// One position of a production
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Step {
    pub symbol: SymbolRef,
    pub field: Option<SmolStr>,
    /// `(name, named)`
    pub alias: Option<(SmolStr, bool)>,
    pub precedence: Option<i16>,
    pub assoc: Assoc,
    pub dynamic: i16,
}

impl Step {
    fn new(symbol: SymbolRef) -> Self {
        Self {
            symbol,
            field: None,
            alias: None,
            precedence: None,
            assoc: Assoc::None,
            dynamic: 0,
        }
    }
}

pub(crate) type Production = Vec<Step>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyntaxVariable {
    pub name: SmolStr,
    pub visible: bool,
    pub productions: Vec<Production>,
}

#[derive(Debug, Clone)]
pub(crate) struct PreparedGrammar {
    pub name: SmolStr,
    pub tokens: Vec<LexicalVariable>,
    pub externals: Vec<SmolStr>,
    /// Index 0 is the start rule
    pub variables: Vec<SyntaxVariable>,
    pub extras: Vec<SymbolRef>,
    pub word: Option<usize>,
    pub policy: TokenConflictPolicy,
}

/// Lower `input` into tokens and syntax variables.
pub(crate) fn prepare(input: &InputGrammar) -> Result<PreparedGrammar, GrammarError> {
    if input.rules.is_empty() {
        return Err(GrammarError::Empty);
    }
    let mut lowering = Lowering {
        names: FxHashMap::default(),
        tokens: Vec::new(),
        anonymous: FxHashMap::default(),
        variables: Vec::new(),
        owner: SmolStr::default(),
        aux_counter: 0,
    };

    for (index, name) in input.externals.iter().enumerate() {
        lowering.names.insert(name.clone(), SymbolRef::External(index));
    }

    // Pass 1: named tokens and variable slots, in declaration order. The
    // first rule always stays a variable so the start symbol is a rule.
    let mut pending = Vec::new();
    for (position, (name, rule)) in input.rules.iter().enumerate() {
        if lowering.names.contains_key(name) {
            return Err(GrammarError::invalid_rule(
                name.clone(),
                "name is defined twice (as a rule and an external token)",
            ));
        }
        match token_body(rule).filter(|_| position > 0) {
            Some((body, precedence)) => {
                let source = token_source(name, body)?;
                let precedence = match precedence {
                    0 => token_precedence(body),
                    level => level,
                };
                let index = lowering.tokens.len();
                lowering.tokens.push(LexicalVariable {
                    name: name.clone(),
                    named: true,
                    visible: !name.starts_with('_'),
                    source,
                    precedence,
                });
                lowering.names.insert(name.clone(), SymbolRef::Terminal(index));
            }
            None => {
                let index = lowering.variables.len();
                lowering.variables.push(SyntaxVariable {
                    name: name.clone(),
                    visible: !name.starts_with('_'),
                    productions: Vec::new(),
                });
                lowering.names.insert(name.clone(), SymbolRef::Variable(index));
                pending.push((index, name.clone(), rule));
            }
        }
    }

    // Pass 2: expand rule bodies; helper variables are appended as found.
    for (index, name, rule) in pending {
        lowering.owner = name;
        let productions = lowering.expand(rule)?;
        lowering.variables[index].productions = dedup(productions);
    }

    let mut extras = Vec::new();
    for extra in &input.extras {
        let symbol = lowering.extra(extra)?;
        if !extras.contains(&symbol) {
            extras.push(symbol);
        }
    }

    let word = match &input.word {
        None => None,
        Some(name) => match lowering.names.get(name) {
            Some(SymbolRef::Terminal(index)) if lowering.tokens[*index].named => Some(*index),
            Some(_) => {
                return Err(GrammarError::invalid_rule(
                    name.clone(),
                    "the word token must be a named token rule",
                ));
            }
            None => {
                return Err(GrammarError::UndefinedSymbol {
                    name: name.clone(),
                    rule: SmolStr::new_static("word"),
                });
            }
        },
    };

    for token in &lowering.tokens {
        let empty = match &token.source {
            TokenSource::Literal(text) => text.is_empty(),
            TokenSource::Pattern(ast) => ast.matches_empty(),
        };
        if empty {
            return Err(GrammarError::EmptyToken(token.name.clone()));
        }
    }

    Ok(PreparedGrammar {
        name: input.name.clone(),
        tokens: lowering.tokens,
        externals: input.externals.clone(),
        variables: lowering.variables,
        extras,
        word,
        policy: input.policy,
    })
}

/// If `rule` is token-shaped, return its token body and lexical precedence.
fn token_body(rule: &Rule) -> Option<(&Rule, i16)> {
    match rule {
        Rule::String(_) | Rule::Pattern(_) | Rule::Token(_) => Some((rule, 0)),
        Rule::Prec(Precedence::Dynamic(_), _) => None,
        Rule::Prec(precedence, inner) => token_body(inner).map(|(body, level)| {
            let level = if level == 0 { precedence.value() } else { level };
            (body, level)
        }),
        _ => None,
    }
}

fn token_source(owner: &SmolStr, rule: &Rule) -> Result<TokenSource, GrammarError> {
    match rule {
        Rule::String(text) => Ok(TokenSource::Literal(text.clone())),
        Rule::Token(inner) => match inner.as_ref() {
            Rule::String(text) => Ok(TokenSource::Literal(text.clone())),
            other => token_ast(owner, other).map(TokenSource::Pattern),
        },
        other => token_ast(owner, other).map(TokenSource::Pattern),
    }
}

/// Lexical precedence declared inside a `token(...)`
fn token_precedence(rule: &Rule) -> i16 {
    match rule {
        Rule::Prec(precedence, _) => precedence.value(),
        Rule::Token(inner) => token_precedence(inner),
        _ => 0,
    }
}

/// Flatten a rule used inside `token(...)` into one pattern.
fn token_ast(owner: &SmolStr, rule: &Rule) -> Result<RegexAst, GrammarError> {
    Ok(match rule {
        Rule::Blank => RegexAst::Empty,
        Rule::String(text) => RegexAst::literal(text),
        Rule::Pattern(source) => {
            parse_pattern(source).map_err(|message| GrammarError::InvalidPattern {
                pattern: source.clone(),
                message,
            })?
        }
        Rule::Seq(items) => RegexAst::Concat(
            items
                .iter()
                .map(|item| token_ast(owner, item))
                .collect::<Result<_, _>>()?,
        ),
        Rule::Choice(items) => RegexAst::Alt(
            items
                .iter()
                .map(|item| token_ast(owner, item))
                .collect::<Result<_, _>>()?,
        ),
        Rule::Repeat1(inner) => RegexAst::Repeat {
            inner: Box::new(token_ast(owner, inner)?),
            min: 1,
            max: None,
        },
        Rule::Token(inner) | Rule::Prec(_, inner) => token_ast(owner, inner)?,
        Rule::Symbol(name) => {
            return Err(GrammarError::invalid_rule(
                owner.clone(),
                format!("symbol `{name}` cannot be used inside a token"),
            ));
        }
        Rule::Field(..) | Rule::Alias { .. } => {
            return Err(GrammarError::invalid_rule(
                owner.clone(),
                "fields and aliases cannot be used inside a token",
            ));
        }
    })
}

fn dedup(productions: Vec<Production>) -> Vec<Production> {
    let mut unique: Vec<Production> = Vec::with_capacity(productions.len());
    for production in productions {
        if !unique.contains(&production) {
            unique.push(production);
        }
    }
    unique
}

struct Lowering {
    names: FxHashMap<SmolStr, SymbolRef>,
    tokens: Vec<LexicalVariable>,
    anonymous: FxHashMap<TokenSource, usize>,
    variables: Vec<SyntaxVariable>,
    /// Rule currently being expanded, for error messages and helper names
    owner: SmolStr,
    aux_counter: usize,
}

impl Lowering {
    fn expand(&mut self, rule: &Rule) -> Result<Vec<Production>, GrammarError> {
        match rule {
            Rule::Blank => Ok(vec![Vec::new()]),
            Rule::String(_) | Rule::Pattern(_) | Rule::Token(_) => {
                let symbol = self.inline_token(rule)?;
                Ok(vec![vec![Step::new(symbol)]])
            }
            Rule::Symbol(name) => match self.names.get(name) {
                Some(symbol) => Ok(vec![vec![Step::new(*symbol)]]),
                None => Err(GrammarError::UndefinedSymbol {
                    name: name.clone(),
                    rule: self.owner.clone(),
                }),
            },
            Rule::Seq(items) => {
                let mut result: Vec<Production> = vec![Vec::new()];
                for item in items {
                    let alternatives = self.expand(item)?;
                    if result.len() * alternatives.len() > MAX_EXPANSION {
                        return Err(GrammarError::TooLarge(format!(
                            "rule `{}` expands into more than {MAX_EXPANSION} productions",
                            self.owner
                        )));
                    }
                    result = result
                        .iter()
                        .flat_map(|prefix| {
                            alternatives.iter().map(move |suffix| {
                                let mut production = prefix.clone();
                                production.extend(suffix.iter().cloned());
                                production
                            })
                        })
                        .collect();
                }
                Ok(result)
            }
            Rule::Choice(items) => {
                let mut result = Vec::new();
                for item in items {
                    result.extend(self.expand(item)?);
                    if result.len() > MAX_EXPANSION {
                        return Err(GrammarError::TooLarge(format!(
                            "rule `{}` expands into more than {MAX_EXPANSION} productions",
                            self.owner
                        )));
                    }
                }
                Ok(dedup(result))
            }
            Rule::Repeat1(inner) => {
                let alternatives = self.expand(inner)?;
                let has_empty = alternatives.iter().any(Vec::is_empty);
                let alternatives: Vec<Production> =
                    alternatives.into_iter().filter(|p| !p.is_empty()).collect();
                if alternatives.is_empty() {
                    return Ok(vec![Vec::new()]);
                }
                let helper = self.helper("repeat");
                let recursive = Step::new(SymbolRef::Variable(helper));
                let mut productions: Vec<Production> = alternatives
                    .iter()
                    .map(|alt| {
                        let mut production = vec![recursive.clone()];
                        production.extend(alt.iter().cloned());
                        production
                    })
                    .collect();
                productions.extend(alternatives);
                self.variables[helper].productions = dedup(productions);
                let mut result = vec![vec![recursive]];
                if has_empty {
                    result.push(Vec::new());
                }
                Ok(result)
            }
            Rule::Field(name, inner) => {
                let mut productions = self.expand(inner)?;
                for step in productions.iter_mut().flatten() {
                    step.field.get_or_insert_with(|| name.clone());
                }
                Ok(productions)
            }
            Rule::Alias { value, named, rule } => {
                let productions = self.expand(rule)?;
                if productions.iter().all(|p| p.len() == 1) {
                    let mut productions = productions;
                    for step in productions.iter_mut().flatten() {
                        step.alias.get_or_insert_with(|| (value.clone(), *named));
                    }
                    return Ok(productions);
                }
                if productions.iter().any(Vec::is_empty) {
                    return Err(GrammarError::invalid_rule(
                        self.owner.clone(),
                        format!("alias `{value}` wraps a rule that can be empty"),
                    ));
                }
                let helper = self.helper("alias");
                self.variables[helper].productions = productions;
                let mut step = Step::new(SymbolRef::Variable(helper));
                step.alias = Some((value.clone(), *named));
                Ok(vec![vec![step]])
            }
            Rule::Prec(precedence, inner) => {
                let mut productions = self.expand(inner)?;
                for step in productions.iter_mut().flatten() {
                    match *precedence {
                        Precedence::Dynamic(level) => {
                            if step.dynamic == 0 {
                                step.dynamic = level;
                            }
                        }
                        Precedence::Value(level)
                        | Precedence::Left(level)
                        | Precedence::Right(level) => {
                            if step.precedence.is_none() {
                                step.precedence = Some(level);
                                step.assoc = match precedence {
                                    Precedence::Left(_) => Assoc::Left,
                                    Precedence::Right(_) => Assoc::Right,
                                    _ => Assoc::None,
                                };
                            }
                        }
                    }
                }
                Ok(productions)
            }
        }
    }

    /// Append a hidden helper variable owned by the current rule.
    fn helper(&mut self, kind: &str) -> usize {
        self.aux_counter += 1;
        let name = format_smolstr!("{}_{kind}{}", self.owner, self.aux_counter);
        self.variables.push(SyntaxVariable {
            name,
            visible: false,
            productions: Vec::new(),
        });
        self.variables.len() - 1
    }

    /// Intern a token written inside a rule body.
    fn inline_token(&mut self, rule: &Rule) -> Result<SymbolRef, GrammarError> {
        let source = token_source(&self.owner, rule)?;
        if let Some(&index) = self.anonymous.get(&source) {
            return Ok(SymbolRef::Terminal(index));
        }
        let (name, visible) = match (&source, rule) {
            (TokenSource::Literal(text), Rule::String(_)) => (text.clone(), true),
            (TokenSource::Literal(text), _) => (text.clone(), false),
            // Hidden, so it only shows up as a leaf of the rule that wrote it.
            (TokenSource::Pattern(_), _) => (self.owner.clone(), false),
        };
        let index = self.tokens.len();
        self.tokens.push(LexicalVariable {
            name,
            named: false,
            visible,
            source: source.clone(),
            precedence: token_precedence(rule),
        });
        self.anonymous.insert(source, index);
        Ok(SymbolRef::Terminal(index))
    }

    fn extra(&mut self, rule: &Rule) -> Result<SymbolRef, GrammarError> {
        self.owner = SmolStr::new_static("extra");
        match rule {
            Rule::Symbol(name) => match self.names.get(name) {
                Some(symbol @ (SymbolRef::Terminal(_) | SymbolRef::External(_))) => Ok(*symbol),
                Some(SymbolRef::Variable(_)) => Err(GrammarError::NonTokenExtra(name.clone())),
                None => Err(GrammarError::UndefinedSymbol {
                    name: name.clone(),
                    rule: self.owner.clone(),
                }),
            },
            Rule::String(_) | Rule::Pattern(_) | Rule::Token(_) => self.inline_token(rule),
            Rule::Prec(_, inner) if token_body(rule).is_some() => self.inline_token(inner),
            other => Err(GrammarError::NonTokenExtra(format_smolstr!("{other:?}"))),
        }
    }
}
