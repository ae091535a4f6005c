//! Error types for the Raven client

use std::io;
use thiserror::Error;

/// Invalid settings detected while building a client or key generator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// Failures reported by a [`DocumentStore`](crate::store::DocumentStore)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Authentication failed
    #[error("Unauthorized")]
    Unauthorized,

    /// The server rejected the request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server returned an error
    #[error("Server error (status {status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message from the server
        message: String,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Embedded storage error
    #[error("Embedded storage error: {0}")]
    Embedded(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Embedded(err.to_string())
    }
}

/// A conditional write lost against a concurrent writer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Document '{key}' was modified by another writer")]
pub struct ConflictError {
    /// Key of the document whose write was rejected
    pub key: String,
}

/// Failure to produce a document key
#[derive(Error, Debug)]
pub enum AllocationError {
    /// Reading or writing the range document failed
    #[error("Failed to reserve keys for '{entity}': {source}")]
    Store {
        /// Entity type the key was requested for
        entity: String,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },

    /// Another writer advanced the range document first
    #[error("Failed to reserve keys for '{entity}': {source}")]
    Conflict {
        /// Entity type the key was requested for
        entity: String,
        /// The rejected write
        #[source]
        source: ConflictError,
    },

    /// The range document holds something other than a usable counter
    #[error("Malformed range document '{key}': {reason}")]
    Malformed {
        /// Key of the range document
        key: String,
        /// What was wrong with it
        reason: String,
    },
}

impl AllocationError {
    /// Returns true when the failure was a lost race; retrying reserves a fresh range
    pub fn is_conflict(&self) -> bool {
        matches!(self, AllocationError::Conflict { .. })
    }

    /// Entity type the failed allocation was for, when known
    pub fn entity(&self) -> Option<&str> {
        match self {
            AllocationError::Store { entity, .. } | AllocationError::Conflict { entity, .. } => {
                Some(entity)
            }
            AllocationError::Malformed { .. } => None,
        }
    }
}

/// Errors that can occur when using the [`Client`](crate::Client)
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Document store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Key generation failure
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Database names may not contain path or quoting characters
    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    /// `store` needs the entity name to assign a key
    #[error("Document has no entity name metadata")]
    MissingEntityName,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
