//! Diagnostics extracted from a syntax tree
//!
//! Error codes follow a naming convention: E{category}{number}
//! - E01xx: Lexical errors (no token rule matches)
//! - E02xx: Syntax errors (missing or unexpected input)
//!
//! Nothing here aborts a parse. Errors live in the tree as `ERROR` nodes and
//! MISSING leaves; [`collect`] walks the tree and turns them into values.

use std::fmt;

use text_size::{TextRange, TextSize};

use crate::tree::Node;

/// Error codes for parser diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // =========================================================================
    // E01xx: Lexical errors
    // =========================================================================
    /// Characters that no token rule accepts
    E0101,

    // =========================================================================
    // E02xx: Syntax errors
    // =========================================================================
    /// A token the grammar requires was inserted by recovery
    E0201,
    /// Input that could not be attached to the tree
    E0202,
}

impl ErrorCode {
    /// Get the string representation of the error code (e.g., "E0201")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E0101 => "E0101",
            Self::E0201 => "E0201",
            Self::E0202 => "E0202",
        }
    }

    /// Get the default message for this error code
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::E0101 => "invalid character",
            Self::E0201 => "missing token",
            Self::E0202 => "unexpected input",
        }
    }

    /// Get the category description for this error code
    pub fn category(&self) -> &'static str {
        match self {
            Self::E0101 => "lexical",
            Self::E0201 | Self::E0202 => "syntax",
        }
    }

    pub fn is_lexical(&self) -> bool {
        matches!(self, Self::E0101)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Hint,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Hint => "hint",
        }
    }
}

/// Related location information for an error, e.g. the node a missing token
/// belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedInfo {
    pub message: String,
    pub range: TextRange,
}

impl RelatedInfo {
    pub fn new(message: impl Into<String>, range: TextRange) -> Self {
        Self {
            message: message.into(),
            range,
        }
    }
}

/// A syntax error found in a parsed tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Human-readable error message
    pub message: String,
    /// Source location
    pub range: TextRange,
    /// Categorized error code
    pub code: ErrorCode,
    pub severity: Severity,
    /// Optional suggestion for fixing the error
    pub hint: Option<String>,
    pub related: Vec<RelatedInfo>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, range: TextRange, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            range,
            code,
            severity: Severity::Error,
            hint: None,
            related: vec![],
        }
    }

    /// Create an error at a specific offset with zero-width range
    pub fn at_offset(message: impl Into<String>, offset: TextSize, code: ErrorCode) -> Self {
        Self::new(message, TextRange::empty(offset), code)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_related(mut self, info: RelatedInfo) -> Self {
        self.related.push(info);
        self
    }

    pub fn has_hint(&self) -> bool {
        self.hint.is_some()
    }

    /// Format the error for display
    ///
    /// Format: `error[E0201]: missing `;` at 4..4`
    pub fn format(&self) -> String {
        let mut result = format!(
            "{}[{}]: {} at {}..{}",
            self.severity.as_str(),
            self.code,
            self.message,
            u32::from(self.range.start()),
            u32::from(self.range.end()),
        );
        if let Some(hint) = &self.hint {
            result.push_str("\n  hint: ");
            result.push_str(hint);
        }
        for info in &self.related {
            result.push_str(&format!(
                "\n  note: {} at {}..{}",
                info.message,
                u32::from(info.range.start()),
                u32::from(info.range.end())
            ));
        }
        result
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

// ===== Extraction =====

/// Every error in the tree under `root`, in document order.
pub(crate) fn collect(root: Node<'_>) -> Vec<SyntaxError> {
    let mut errors = Vec::new();
    if root.has_error() {
        visit(root, None, &mut errors);
    }
    errors
}

fn visit<'tree>(node: Node<'tree>, enclosing: Option<Node<'tree>>, errors: &mut Vec<SyntaxError>) {
    let range = node.text_range();
    if node.is_missing() {
        let kind = node.kind();
        let mut error = SyntaxError::new(format!("missing `{kind}`"), range, ErrorCode::E0201)
            .with_hint(format!("insert `{kind}` here"));
        if let Some(parent) = enclosing {
            error = error.with_related(RelatedInfo::new(
                format!("while parsing `{}`", parent.kind()),
                parent.text_range(),
            ));
        }
        errors.push(error);
        return;
    }
    if node.is_error() {
        let children = node.children();
        if children.is_empty() {
            if node.is_leaf() {
                errors.push(SyntaxError::new(
                    ErrorCode::E0101.default_message(),
                    range,
                    ErrorCode::E0101,
                ));
            } else {
                errors.push(SyntaxError::new(
                    ErrorCode::E0202.default_message(),
                    range,
                    ErrorCode::E0202,
                ));
            }
            return;
        }
        // An ERROR node holding only unlexable characters is one lexical error.
        let only_lexical = children.iter().all(|child| child.is_error() && child.is_leaf());
        if !only_lexical {
            errors.push(SyntaxError::new(
                format!("unexpected `{}`", summary(&children)),
                range,
                ErrorCode::E0202,
            ));
        }
    }
    let enclosing = if node.is_named() && !node.is_error() {
        Some(node)
    } else {
        enclosing
    };
    for child in node.children() {
        if child.has_error() {
            visit(child, enclosing, errors);
        }
    }
}

fn summary(children: &[Node<'_>]) -> String {
    let mut kinds: Vec<&str> = children.iter().take(3).map(|child| child.kind()).collect();
    if children.len() > 3 {
        kinds.push("...");
    }
    kinds.join(" ")
}
