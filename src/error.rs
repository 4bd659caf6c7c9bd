//! Error types for loading grammars, compiling grammars and parsing.
//!
//! Lexical and syntax errors are not here: they never abort a parse and are
//! represented as nodes in the tree (see [`crate::tree::diagnostics`]).

use smol_str::SmolStr;
use thiserror::Error;

/// Failures while loading a compiled grammar artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The artifact was produced for a format version this runtime cannot read.
    #[error("Incompatible artifact version {found} (supported {min}..={max})")]
    IncompatibleVersion { found: u16, min: u16, max: u16 },

    /// Truncated data, bad magic or an out-of-bounds table reference.
    #[error("Corrupt grammar artifact: {0}")]
    CorruptArtifact(String),
}

impl LoadError {
    /// Create a corrupt-artifact error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptArtifact(message.into())
    }
}

/// Failures that abort a parse call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The cancellation flag was set.
    #[error("Parse cancelled")]
    Cancelled,

    /// The configured timeout elapsed.
    #[error("Parse timed out")]
    TimedOut,

    /// `parse` was called before a language was assigned.
    #[error("No language assigned to the parser")]
    NoLanguage,

    /// The previous tree was produced by a different grammar.
    #[error("Previous tree was produced by a different language")]
    LanguageMismatch,
}

/// Rejected included-range configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Included range {index} is unordered or overlaps its predecessor")]
pub struct IncludedRangesError {
    pub index: usize,
}

/// Failures while compiling a grammar definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// The grammar defines no rules.
    #[error("Grammar has no rules")]
    Empty,

    /// A rule refers to a name that is neither a rule nor an external token.
    #[error("Undefined symbol `{name}` referenced from rule `{rule}`")]
    UndefinedSymbol { name: SmolStr, rule: SmolStr },

    /// A token pattern could not be parsed.
    #[error("Invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: SmolStr, message: String },

    /// A token can match the empty string.
    #[error("Token `{0}` matches the empty string")]
    EmptyToken(SmolStr),

    /// Extras must be tokens.
    #[error("Extra `{0}` is not a token")]
    NonTokenExtra(SmolStr),

    /// A rule is used where a token is required, or vice versa.
    #[error("Invalid rule in `{rule}`: {message}")]
    InvalidRule { rule: SmolStr, message: String },

    /// The grammar needs more symbols or states than the table format holds.
    #[error("Grammar too large: {0}")]
    TooLarge(String),

    /// The compiled tables failed validation.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl GrammarError {
    /// Create an invalid-rule error.
    pub fn invalid_rule(rule: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
