use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key value: {0}")]
    InvalidKey(String),

    #[error("key type mismatch: expected {expected}, got {actual}")]
    KeyTypeMismatch { expected: String, actual: String },
}
