use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sled::{Db as SledDb, IVec, Mode, Tree};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{Body, Document, DocumentStore, Etag, Metadata, PutOutcome};

const DOCUMENTS_TREE: &str = "documents";

const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

/// Stored form of a document; the etag lives beside the body, not in it
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    etag: Etag,
    body: Body,
}

/// A [`DocumentStore`] kept in an embedded sled database
///
/// Every write mints a new etag, and conditional writes go through
/// `compare_and_swap` so a writer holding a stale etag gets
/// [`PutOutcome::Conflict`].
#[derive(Clone)]
pub struct SledStore {
    db: Arc<SledDb>,
    documents: Arc<Tree>,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let config = sled::Config::default()
            .path(path)
            .cache_capacity(DEFAULT_CACHE_CAPACITY)
            .mode(Mode::LowSpace);
        Self::from_db(config.open()?)
    }

    /// A store removed from disk when the last handle is dropped
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: SledDb) -> Result<Self, StoreError> {
        let documents = db.open_tree(DOCUMENTS_TREE)?;
        Ok(Self {
            db: Arc::new(db),
            documents: Arc::new(documents),
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Keys starting with `prefix`, in key order
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.documents
            .scan_prefix(prefix.as_bytes())
            .keys()
            .map(|key| {
                key.map(|k| String::from_utf8_lossy(&k).into_owned())
                    .map_err(StoreError::from)
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Result<Option<Document>, StoreError> {
        self.documents
            .get(key.as_bytes())?
            .map(|raw| {
                let envelope = decode(&raw)?;
                Ok(Document {
                    key: Some(key.to_string()),
                    body: envelope.body,
                    metadata: Metadata {
                        etag: Some(envelope.etag),
                        entity_name: None,
                    },
                })
            })
            .transpose()
    }

    pub fn put(&self, key: &str, body: &Body, token: Option<&Etag>) -> Result<PutOutcome, StoreError> {
        let current = self.documents.get(key.as_bytes())?;

        if let Some(token) = token {
            let current_etag = current.as_ref().map(decode).transpose()?.map(|e| e.etag);
            let matches = match &current_etag {
                None => token.is_empty(),
                Some(etag) => etag == token,
            };
            if !matches {
                debug!("Rejecting write to {}: etag {} is stale", key, token);
                return Ok(PutOutcome::Conflict);
            }
        }

        let etag = self.next_etag()?;
        let encoded = serde_json::to_vec(&Envelope {
            etag: etag.clone(),
            body: body.clone(),
        })?;

        if token.is_none() {
            self.documents.insert(key.as_bytes(), encoded)?;
            return Ok(PutOutcome::Written { etag: Some(etag) });
        }

        // Another writer may have landed since the etag check above
        match self.documents.compare_and_swap(key.as_bytes(), current, Some(encoded))? {
            Ok(()) => Ok(PutOutcome::Written { etag: Some(etag) }),
            Err(_) => {
                debug!("Rejecting write to {}: lost compare-and-swap", key);
                Ok(PutOutcome::Conflict)
            }
        }
    }

    fn next_etag(&self) -> Result<Etag, StoreError> {
        // Offset by one so no minted etag equals the create-only token
        let id = self.db.generate_id()? + 1;
        Ok(Etag::new(format!(
            "00000000-0000-0000-{:04x}-{:012x}",
            (id >> 48) & 0xffff,
            id & 0xffff_ffff_ffff
        )))
    }
}

fn decode(raw: &IVec) -> Result<Envelope, StoreError> {
    Ok(serde_json::from_slice(raw)?)
}

#[async_trait]
impl DocumentStore for SledStore {
    async fn get_document(&self, key: &str) -> Result<Option<Document>, StoreError> {
        self.get(key)
    }

    async fn put_document(
        &self,
        key: &str,
        body: &Body,
        token: Option<&Etag>,
    ) -> Result<PutOutcome, StoreError> {
        self.put(key, body, token)
    }
}
