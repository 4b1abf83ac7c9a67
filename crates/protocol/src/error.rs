//! Parse error type.

use crate::xml::Position;

/// A malformed or structurally unexpected document.
///
/// `line` and `column` are 1-based and point at the element the problem
/// was detected on (or at the offending character for well-formedness
/// errors). `source` names the document, usually the request URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{source_name}:{line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub source_name: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: Position, source: &str) -> Self {
        Self {
            message: message.into(),
            line: position.line,
            column: position.column,
            source_name: source.to_string(),
        }
    }

    /// Returns the position the error was reported at.
    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }
}
