//! Error types for QueryLog-DB

use thiserror::Error;

/// Result type alias for QueryLog-DB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for QueryLog-DB
///
/// Lookups on a built index never fail: an unknown prefix is an empty
/// result and a `size` above `k_max` is capped. Errors only come from
/// ingestion, configuration, snapshots and the HTTP server.
#[derive(Error, Debug)]
pub enum Error {
    /// A log record that cannot be turned into an event
    #[error("Malformed event on line {line}: {reason}")]
    MalformedEvent { line: u64, reason: String },

    /// Snapshot file errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Index construction errors
    #[error("Index error: {0}")]
    Index(String),

    /// Network/API errors
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper
    #[error("Error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::Serialization(format!("{:?}", other)),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Other(e.to_string())
    }
}
