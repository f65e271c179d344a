//! Error types for the rowsync engine.

use thiserror::Error;

/// Which input of a join an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

impl std::fmt::Display for JoinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinSide::Left => write!(f, "left"),
            JoinSide::Right => write!(f, "right"),
        }
    }
}

/// All possible errors from the rowsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Composition errors
    #[error("invalid column reference: {0}")]
    InvalidReference(String),

    #[error("duplicate column alias: {0}")]
    DuplicateColumn(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("type mismatch for column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("row has {actual} values, expected {expected}")]
    RowShape { expected: usize, actual: usize },

    // Enumeration errors
    #[error("store error: {0}")]
    Store(String),

    #[error("enumerator has been released")]
    Disposed,

    #[error("{side} join input is not ordered by its join keys")]
    UnsortedInput { side: JoinSide },

    // Synchronization errors
    #[error("invalid sync hint: {0}")]
    Format(String),

    #[error("invalid sync column '{column}': {reason}")]
    InvalidArgument { column: String, reason: String },

    // Connection errors
    #[error("connection pool error: {0}")]
    Pool(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
