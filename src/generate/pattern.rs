//! Token pattern syntax and NFA construction
//!
//! Patterns use the `regex-syntax` dialect. Its high-level IR is lowered into
//! [`RegexAst`], which only knows character classes, concatenation,
//! alternation and bounded or unbounded repetition. Anchors and word
//! boundaries have no meaning for a token and are rejected.

use regex_syntax::ParserBuilder;
use regex_syntax::hir::{Class, Hir, HirKind, Literal};

use crate::grammar::lexical::{Nfa, NfaState};

const MAX_REPEAT: u32 = 1000;

/// Parsed token pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RegexAst {
    Empty,
    Class(Vec<(u32, u32)>),
    Concat(Vec<RegexAst>),
    Alt(Vec<RegexAst>),
    Repeat {
        inner: Box<RegexAst>,
        min: u32,
        max: Option<u32>,
    },
}

impl RegexAst {
    pub(crate) fn literal(text: &str) -> Self {
        let mut chars: Vec<RegexAst> = text
            .chars()
            .map(|ch| RegexAst::Class(vec![(u32::from(ch), u32::from(ch))]))
            .collect();
        match chars.len() {
            0 => RegexAst::Empty,
            1 => chars.remove(0),
            _ => RegexAst::Concat(chars),
        }
    }

    pub(crate) fn matches_empty(&self) -> bool {
        match self {
            RegexAst::Empty => true,
            RegexAst::Class(_) => false,
            RegexAst::Concat(items) => items.iter().all(RegexAst::matches_empty),
            RegexAst::Alt(items) => items.iter().any(RegexAst::matches_empty),
            RegexAst::Repeat { inner, min, .. } => *min == 0 || inner.matches_empty(),
        }
    }
}

/// Compile `ast` so that a successful match continues at `out`. Returns the
/// entry state.
pub(crate) fn compile(ast: &RegexAst, nfa: &mut Nfa, out: u32) -> u32 {
    match ast {
        RegexAst::Empty => out,
        RegexAst::Class(ranges) => nfa.push(NfaState::Class {
            ranges: ranges.clone(),
            next: out,
        }),
        RegexAst::Concat(items) => items
            .iter()
            .rev()
            .fold(out, |next, item| compile(item, nfa, next)),
        RegexAst::Alt(branches) => {
            let entries: Vec<u32> = branches.iter().map(|b| compile(b, nfa, out)).collect();
            entries
                .into_iter()
                .rev()
                .reduce(|second, first| nfa.push(NfaState::Split { first, second }))
                .unwrap_or(out)
        }
        RegexAst::Repeat { inner, min, max } => {
            let mut entry = match max {
                None => {
                    let split = nfa.push(NfaState::Split {
                        first: out,
                        second: out,
                    });
                    let body = compile(inner, nfa, split);
                    nfa.states[split as usize] = NfaState::Split {
                        first: body,
                        second: out,
                    };
                    split
                }
                Some(max) => {
                    let mut entry = out;
                    for _ in *min..*max {
                        let body = compile(inner, nfa, entry);
                        entry = nfa.push(NfaState::Split {
                            first: body,
                            second: out,
                        });
                    }
                    entry
                }
            };
            for _ in 0..*min {
                entry = compile(inner, nfa, entry);
            }
            entry
        }
    }
}

pub(crate) fn parse_pattern(source: &str) -> Result<RegexAst, String> {
    let hir = ParserBuilder::new()
        .build()
        .parse(source)
        .map_err(|error| error.to_string())?;
    lower(&hir)
}

fn lower(hir: &Hir) -> Result<RegexAst, String> {
    Ok(match hir.kind() {
        HirKind::Empty => RegexAst::Empty,
        HirKind::Literal(Literal(bytes)) => {
            let text = std::str::from_utf8(bytes).map_err(|_| "literal is not valid UTF-8".to_string())?;
            RegexAst::literal(text)
        }
        HirKind::Class(Class::Unicode(class)) => RegexAst::Class(
            class
                .iter()
                .map(|range| (u32::from(range.start()), u32::from(range.end())))
                .collect(),
        ),
        HirKind::Class(Class::Bytes(class)) => {
            let ranges = class
                .iter()
                .map(|range| {
                    if range.end().is_ascii() {
                        Ok((u32::from(range.start()), u32::from(range.end())))
                    } else {
                        Err("byte class reaches past ASCII".to_string())
                    }
                })
                .collect::<Result<_, _>>()?;
            RegexAst::Class(ranges)
        }
        HirKind::Look(look) => return Err(format!("unsupported assertion {look:?}")),
        HirKind::Repetition(repetition) => {
            if repetition.min > MAX_REPEAT || repetition.max.is_some_and(|max| max > MAX_REPEAT) {
                return Err("repetition bound too large".into());
            }
            RegexAst::Repeat {
                inner: Box::new(lower(&repetition.sub)?),
                min: repetition.min,
                max: repetition.max,
            }
        }
        HirKind::Capture(capture) => lower(&capture.sub)?,
        HirKind::Concat(items) => RegexAst::Concat(items.iter().map(lower).collect::<Result<_, _>>()?),
        HirKind::Alternation(branches) => {
            RegexAst::Alt(branches.iter().map(lower).collect::<Result<_, _>>()?)
        }
    })
}
