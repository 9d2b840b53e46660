/// Errors from store adapter operations and store configuration.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An adapter name was given without a client to drive it.
    #[error("client is required")]
    ClientRequired,

    /// A client was given without naming the adapter that should use it.
    #[error("adapter name is required")]
    AdapterRequired,

    /// No adapter is registered under this name.
    #[error("unknown store adapter: {0}")]
    UnknownAdapter(String),

    /// The client handed to an adapter is not the kind it drives.
    #[error("adapter {adapter} expected a {expected} client")]
    InvalidClient {
        adapter: String,
        expected: &'static str,
    },

    /// Encoding or decoding of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend itself failed (lock poisoning, connection loss, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
