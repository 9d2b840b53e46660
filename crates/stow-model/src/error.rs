use stow_store::StoreError;
use stow_types::TypeError;
use thiserror::Error;

/// Errors from model declaration, persistence and association operations.
///
/// Absence is not an error: loads return `Ok(None)` for missing records and
/// a failed validation makes `save` return `Ok(false)`.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A store operation was attempted before any store was configured.
    #[error("No store has been set for {model}")]
    NoStore { model: String },

    /// The store adapter failed or the store spec was malformed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An attribute value could not be used as a key.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// The configured key factory name is not known.
    #[error("invalid key factory: {0}")]
    InvalidKeyFactory(String),

    /// The key factory produced no key (or a blank one).
    #[error("key factory for {model} produced no key")]
    InvalidKey { model: String },

    /// A record of the wrong model type was assigned to an association.
    #[error("{expected} expected, but was {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A strict save found validation errors.
    #[error("{model} is invalid: {}", .errors.join(", "))]
    RecordInvalid { model: String, errors: Vec<String> },

    /// The record has been deleted; no transition leaves that state.
    #[error("{model} {id} has been destroyed")]
    Destroyed { model: String, id: String },

    /// The record is not in the store.
    #[error("{model} {id} not found")]
    NotFound { model: String, id: String },

    /// An identifier that was already assigned was about to change.
    #[error("{model} already has id {id}")]
    IdReassignment { model: String, id: String },

    #[error("{model} has no reference named {name}")]
    UnknownReference { model: String, name: String },

    #[error("{model} has no embedded list named {name}")]
    UnknownEmbeddedList { model: String, name: String },

    /// An operation was forwarded through an association with no target.
    #[error("{model}.{reference} has no target")]
    UnresolvedTarget { model: String, reference: String },

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Conversion between a record and a typed value failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
