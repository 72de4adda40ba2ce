//! Protocol error types.

use thiserror::Error;

/// Errors raised while reading values out of request or result types.
#[derive(Debug, Error)]
pub enum Error {
    /// A value had a different type than the reader expected.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A projection row did not carry the requested column.
    #[error("missing column: {0}")]
    MissingColumn(String),
}
