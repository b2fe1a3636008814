//! Transcript parse errors

use thiserror::Error;

use crate::Span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing `// SOURCE` marker")]
    MissingSourceMarker,
    #[error("malformed module marker: {0}")]
    MalformedModuleMarker(String),
    #[error("malformed file marker: {0}")]
    MalformedFileMarker(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {}..{}", .span.start, .span.end)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
