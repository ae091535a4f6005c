//! The document store seam consumed by the key generator and the client

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A JSON object body
pub type Body = Map<String, Value>;

/// Opaque concurrency token for conditional writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(String);

impl Etag {
    const EMPTY: &'static str = "00000000-0000-0000-0000-000000000000";

    /// Wrap a token returned by the server
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The token meaning "the document must not exist yet"
    pub fn empty() -> Self {
        Self(Self::EMPTY.to_string())
    }

    /// Returns true for the create-only token
    pub fn is_empty(&self) -> bool {
        self.0 == Self::EMPTY
    }

    /// Raw token value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata carried alongside a document, never inside its body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Concurrency token from the last read or write
    pub etag: Option<Etag>,
    /// Entity type the document belongs to
    pub entity_name: Option<String>,
}

/// A document as read from, or about to be written to, the server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Document key, if one has been assigned
    pub key: Option<String>,
    /// JSON body
    pub body: Body,
    /// Metadata
    pub metadata: Metadata,
}

impl Document {
    /// A new, unkeyed document of the given entity type
    pub fn new(entity_name: &str, body: Body) -> Self {
        Self {
            key: None,
            body,
            metadata: Metadata {
                etag: None,
                entity_name: Some(entity_name.to_string()),
            },
        }
    }

    /// Field accessor
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Concurrency token, if known
    pub fn etag(&self) -> Option<&Etag> {
        self.metadata.etag.as_ref()
    }

    /// Entity type, if known
    pub fn entity_name(&self) -> Option<&str> {
        self.metadata.entity_name.as_deref()
    }
}

/// Result of a put
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The document was stored
    Written {
        /// New concurrency token, when the store reports one
        etag: Option<Etag>,
    },
    /// The supplied token no longer matches the stored version
    Conflict,
}

impl PutOutcome {
    /// Returns true if the document was stored
    pub fn is_success(&self) -> bool {
        matches!(self, PutOutcome::Written { .. })
    }
}

/// Key/value document storage with optimistic concurrency
///
/// A missing key is `Ok(None)`, and a token mismatch on write is
/// `Ok(PutOutcome::Conflict)`; only transport or server failures are errors.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by key
    async fn get_document(&self, key: &str) -> Result<Option<Document>, StoreError>;

    /// Store a document body.
    ///
    /// With `token = Some(t)` the write only succeeds if the stored version
    /// still has token `t`; [`Etag::empty`] requires the key to be absent.
    async fn put_document(
        &self,
        key: &str,
        body: &Body,
        token: Option<&Etag>,
    ) -> Result<PutOutcome, StoreError>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn get_document(&self, key: &str) -> Result<Option<Document>, StoreError> {
        (**self).get_document(key).await
    }

    async fn put_document(
        &self,
        key: &str,
        body: &Body,
        token: Option<&Etag>,
    ) -> Result<PutOutcome, StoreError> {
        (**self).put_document(key, body, token).await
    }
}
