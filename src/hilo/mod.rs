//! Hi-Lo document key generation
//!
//! Each generator reserves a contiguous block of ids per entity type by
//! advancing a range document on the server, then hands ids out of that block
//! locally. With the default capacity of 32 only one in every 32 keys costs a
//! round trip.
//!
//! Range documents live at `<document_prefix><entity type>` and hold the
//! highest id reserved so far as `{ "max": n }`. Writes are conditioned on the
//! etag that was read, so two generators racing for the same block cannot both
//! win it.

mod range;


use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::HiLoConfig;
use crate::error::{AllocationError, ConfigurationError, ConflictError, StoreError};
use crate::store::{DocumentStore, Etag, PutOutcome};

use range::{RangeDocument, RangeState, Reservation};

/// Generates `<entity><separator><id>` keys from ranges reserved on a [`DocumentStore`]
///
/// # Example
/// ```rust,no_run
/// use raven_client::{HiLoConfig, HiLoKeyGenerator, SledStore};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SledStore::temporary()?;
/// let generator = HiLoKeyGenerator::new(store, HiLoConfig::default())?;
///
/// assert_eq!(generator.generate_document_key("Album").await?, "Album/1");
/// assert_eq!(generator.generate_document_key("Album").await?, "Album/2");
/// # Ok(())
/// # }
/// ```
pub struct HiLoKeyGenerator<S> {
    store: S,
    config: HiLoConfig,
    // Map lock is never held across an await; the per-entity lock is.
    ranges: Mutex<HashMap<String, Arc<AsyncMutex<RangeState>>>>,
}

impl<S: DocumentStore> HiLoKeyGenerator<S> {
    /// Create a generator, rejecting a zero capacity up front
    pub fn new(store: S, config: HiLoConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            ranges: Mutex::new(HashMap::new()),
        })
    }

    /// Create a generator with `/` as separator and a capacity of 32
    pub fn with_defaults(store: S) -> Self {
        Self {
            store,
            config: HiLoConfig::default(),
            ranges: Mutex::new(HashMap::new()),
        }
    }

    /// Generate a new document key for the entity type
    ///
    /// On failure no id is consumed, so the call can simply be retried.
    pub async fn generate_document_key(&self, entity: &str) -> Result<String, AllocationError> {
        let id = self.next_id(entity).await?;
        Ok(format!("{}{}{}", entity, self.config.key_separator, id))
    }

    /// Next numeric id for the entity type, reserving a new range when the held one is used up
    pub async fn next_id(&self, entity: &str) -> Result<u64, AllocationError> {
        let slot = self.slot(entity);
        let mut range = slot.lock().await;

        if let Some(id) = range.try_next() {
            return Ok(id);
        }

        // Range exhausted; later callers for this entity wait here instead of refreshing again
        let reservation = self.refresh_range(entity).await?;
        if reservation.last_max < range.current_max {
            return Err(malformed(
                &self.range_document_key(entity),
                format!(
                    "reserved range starts at {} but ids up to {} were already handed out",
                    reservation.last_max + 1,
                    range.current_max
                ),
            ));
        }
        Ok(range.adopt(reservation))
    }

    /// Key of the range document for an entity type
    pub fn range_document_key(&self, entity: &str) -> String {
        format!("{}{}", self.config.document_prefix, entity)
    }

    /// Settings this generator was built with
    pub fn config(&self) -> &HiLoConfig {
        &self.config
    }

    /// Ids reserved per refresh
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Separator between entity type and id
    pub fn key_separator(&self) -> &str {
        &self.config.key_separator
    }

    /// Prefix of the range document keys
    pub fn document_prefix(&self) -> &str {
        &self.config.document_prefix
    }

    /// The underlying document store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn slot(&self, entity: &str) -> Arc<AsyncMutex<RangeState>> {
        let mut ranges = self.ranges.lock();
        ranges
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(RangeState::default())))
            .clone()
    }

    /// Reserve the next block on the server. Does not touch in-memory state.
    async fn refresh_range(&self, entity: &str) -> Result<Reservation, AllocationError> {
        let key = self.range_document_key(entity);
        let capacity = self.config.capacity;
        debug!("Reserving {} keys for '{}' via {}", capacity, entity, key);

        let existing = self
            .store
            .get_document(&key)
            .await
            .map_err(|source| store_error(entity, source))?;

        let (reservation, body, token) = match existing {
            Some(doc) => {
                let parsed = RangeDocument::parse(&doc.body, capacity)
                    .map_err(|reason| malformed(&key, reason))?;
                if parsed.migrated {
                    warn!("Migrating legacy ServerHi range document {} to max {}", key, parsed.max);
                }
                let (reservation, body) = parsed
                    .reserve(capacity)
                    .map_err(|reason| malformed(&key, reason))?;
                // Range writes must always be conditional
                let token = doc.metadata.etag.ok_or_else(|| {
                    malformed(&key, "range document has no concurrency token".to_string())
                })?;
                (reservation, body, token)
            }
            None => {
                let (reservation, body) = RangeDocument::initial(capacity);
                (reservation, body, Etag::empty())
            }
        };

        match self
            .store
            .put_document(&key, &body, Some(&token))
            .await
            .map_err(|source| store_error(entity, source))?
        {
            PutOutcome::Written { .. } => {
                info!(
                    "Reserved keys {}..={} for '{}'",
                    reservation.last_max + 1,
                    reservation.max,
                    entity
                );
                Ok(reservation)
            }
            PutOutcome::Conflict => {
                warn!("Range document {} was advanced by another writer", key);
                Err(AllocationError::Conflict {
                    entity: entity.to_string(),
                    source: ConflictError { key },
                })
            }
        }
    }
}

fn store_error(entity: &str, source: StoreError) -> AllocationError {
    AllocationError::Store {
        entity: entity.to_string(),
        source,
    }
}

fn malformed(key: &str, reason: String) -> AllocationError {
    AllocationError::Malformed {
        key: key.to_string(),
        reason,
    }
}
