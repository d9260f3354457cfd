//! Error types for kvlb

use thiserror::Error;

/// Main error type for kvlb
#[derive(Error, Debug)]
pub enum KvlbError {
    /// The key-value store could not be reached or refused the request
    #[error("Connection error: {0}")]
    Connection(String),

    /// The live watch subscription ended after a successful start
    #[error("Watch stream error: {0}")]
    WatchStream(String),

    /// A pick was attempted while the known backend set is empty
    #[error("No available backend")]
    NoAvailableBackend,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dial target could not be parsed
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// No resolver is registered for the scheme
    #[error("Unknown resolver scheme: {0}")]
    UnknownScheme(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for kvlb operations
pub type KvlbResult<T> = Result<T, KvlbError>;

impl From<serde_json::Error> for KvlbError {
    fn from(err: serde_json::Error) -> Self {
        KvlbError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for KvlbError {
    fn from(err: toml::de::Error) -> Self {
        KvlbError::Config(err.to_string())
    }
}
