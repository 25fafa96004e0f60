//! Error types for Protopool.

use thiserror::Error;

/// Protopool error types.
///
/// Configuration errors are reported eagerly at construction time; format
/// errors come from the persistence codec and leave the pooler untouched.
/// Internal invariant violations are logic bugs and panic instead.
#[derive(Error, Debug)]
pub enum PoolerError {
    /// Invalid construction parameters
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Unrecognized format tag at the head of a matrix encoding
    #[error("unknown matrix format tag: {0:?}")]
    UnknownTag(String),

    /// Version tag of a saved state does not match this implementation
    #[error("state version mismatch: expected {expected:?}, got {got:?}")]
    VersionMismatch {
        expected: &'static str,
        got: String,
    },

    /// A row's entry count disagrees with the fixed row arity
    #[error("row {row} has {got} entries, expected {expected}")]
    RowArity {
        row: usize,
        expected: usize,
        got: usize,
    },

    /// A column index at or beyond the column count
    #[error("column index {column} out of range ({cols} columns) on row {row}")]
    ColumnOutOfRange { row: usize, column: u32, cols: usize },

    /// A token that failed to parse as the expected kind of value
    #[error("malformed token {token:?}, expected {expected}")]
    MalformedToken {
        token: String,
        expected: &'static str,
    },

    /// The encoding ended before all declared fields were read
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEnd(&'static str),

    /// Declared total nonzero count disagrees with the rows actually present
    #[error("nonzero count mismatch: header declares {header}, rows contain {actual}")]
    NonzeroCount { header: usize, actual: usize },

    /// Stream failure while saving or loading state
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Protopool operations.
pub type Result<T> = std::result::Result<T, PoolerError>;
