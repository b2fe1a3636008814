//! Error types for reading index artifacts

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("malformed index at line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error("index `{name}` does not match its contents (expected `{expected}`)")]
    NameMismatch { name: String, expected: String },
}
