use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{Error, Result, StoreError};
use crate::hilo::HiLoKeyGenerator;
use crate::http::{HttpStore, Scope};
use crate::store::{Body, Document, PutOutcome};
use crate::types::{DatabaseDocument, IndexQuery, QueryResult};
use crate::util::query::{index_query_path, is_valid_database_name};

const DATABASE_DOCUMENT_PREFIX: &str = "Raven/Databases/";

/// Client for a document database server
///
/// # Example
/// ```rust,no_run
/// use raven_client::Client;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut client = Client::new("http://localhost:8080")?;
/// client.ensure_database_exists("music").await?;
/// client.use_database("music")?;
///
/// let body = json!({ "Title": "Abbey Road" }).as_object().cloned().unwrap_or_default();
/// let mut album = client.create_document("Album", body);
/// client.store(&mut album).await?;
/// println!("Stored {:?}", album.key);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    store: HttpStore,
    keys: Arc<HiLoKeyGenerator<HttpStore>>,
}

impl Client {
    /// Create a client for a server URL with default settings
    pub fn new(server_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::new(server_url))
    }

    /// Create a client from explicit configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let root = HttpStore::new(&config)?;
        let store = match &config.database {
            Some(name) => {
                if !is_valid_database_name(name) {
                    return Err(Error::InvalidDatabaseName(name.clone()));
                }
                root.for_database(name)
            }
            None => root,
        };
        let keys = Arc::new(HiLoKeyGenerator::new(store.clone(), config.hilo.clone())?);

        debug!(
            "Client created for {} (database: {:?})",
            store.root_url(),
            store.database()
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            keys,
        })
    }

    /// Create a client configured from `RAVEN_*` and `HILO_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::with_config(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The selected tenant database, if any
    pub fn database(&self) -> Option<&str> {
        self.store.database()
    }

    /// Base URL database-scoped requests are sent to
    pub fn database_url(&self) -> &str {
        self.store.database_url()
    }

    pub fn key_generator(&self) -> &HiLoKeyGenerator<HttpStore> {
        &self.keys
    }

    /// Fetch a document from the selected database
    pub async fn get_document(&self, key: &str) -> Result<Option<Document>> {
        self.get_document_in(Scope::Database, key).await
    }

    /// Fetch a document, choosing whether to read from the server root
    pub async fn get_document_in(&self, scope: Scope, key: &str) -> Result<Option<Document>> {
        Ok(self.store.fetch(scope, key).await?)
    }

    /// Write a document under `key`
    ///
    /// The document's etag is sent as a precondition only when optimistic
    /// concurrency is enabled. Returns `false` if the server rejected the
    /// write because the document changed in the meantime.
    pub async fn put_document(&self, key: &str, doc: &Document) -> Result<bool> {
        Ok(self.write(Scope::Database, key, doc).await?.is_success())
    }

    /// Store a document, generating a key first if it has none
    ///
    /// The document must carry an entity name (see [`Client::create_document`]).
    /// On success the document's etag is refreshed from the server response.
    pub async fn store(&self, doc: &mut Document) -> Result<bool> {
        let entity = doc
            .entity_name()
            .map(|s| s.to_string())
            .ok_or(Error::MissingEntityName)?;

        let key = match doc.key.clone() {
            Some(key) => key,
            None => self.generate_document_key(&entity, doc).await?,
        };

        match self.write(Scope::Database, &key, doc).await? {
            PutOutcome::Written { etag } => {
                if etag.is_some() {
                    doc.metadata.etag = etag;
                }
                Ok(true)
            }
            PutOutcome::Conflict => Ok(false),
        }
    }

    /// Query an index with `field:value` terms
    ///
    /// With [`IndexQuery::wait_for_non_stale_results`] the query is repeated
    /// until the server stops reporting stale results. `None` when the index
    /// does not exist.
    pub async fn query_index(&self, index: &str, query: &IndexQuery) -> Result<Option<QueryResult>> {
        let path = index_query_path(index, &query.terms);
        let interval = Duration::from_millis(self.config.stale_retry_interval_ms);

        loop {
            let result: Option<QueryResult> = self.store.get_json(Scope::Database, &path).await?;
            match result {
                Some(result) if query.wait_for_non_stale_results && result.is_stale => {
                    debug!("Index {} is stale, retrying in {:?}", index, interval);
                    tokio::time::sleep(interval).await;
                }
                other => return Ok(other),
            }
        }
    }

    /// A new, unkeyed document tagged with an entity type
    pub fn create_document(&self, entity_type: &str, body: Body) -> Document {
        Document::new(entity_type, body)
    }

    /// Names of the tenant databases on the server
    pub async fn get_database_names(&self) -> Result<Vec<String>> {
        let names: Option<Vec<String>> = self.store.get_json(Scope::Root, "/databases").await?;
        Ok(names.unwrap_or_default())
    }

    /// Send subsequent database-level calls to the named tenant database
    ///
    /// Range documents are stored per database, so the key generator is
    /// replaced and any ids it held are abandoned.
    pub fn use_database(&mut self, name: &str) -> Result<()> {
        if !is_valid_database_name(name) {
            return Err(Error::InvalidDatabaseName(name.to_string()));
        }

        let store = self.store.for_database(name);
        self.keys = Arc::new(HiLoKeyGenerator::new(store.clone(), self.config.hilo.clone())?);
        self.store = store;
        info!("Using database '{}'", name);
        Ok(())
    }

    /// Make sure a tenant database exists, creating its settings document if needed
    ///
    /// Returns `true` if the database already existed or was created.
    pub async fn ensure_database_exists(&self, name: &str) -> Result<bool> {
        if !is_valid_database_name(name) {
            return Err(Error::InvalidDatabaseName(name.to_string()));
        }

        let key = format!("{}{}", DATABASE_DOCUMENT_PREFIX, name);
        if self.store.fetch(Scope::Root, &key).await?.is_some() {
            debug!("Database '{}' already exists", name);
            return Ok(true);
        }

        let settings = serde_json::to_value(DatabaseDocument::for_tenant(name)).map_err(StoreError::from)?;
        let body = match settings {
            serde_json::Value::Object(map) => map,
            _ => Body::new(),
        };
        let outcome = self.store.write(Scope::Root, &key, &body, None, None).await?;
        if outcome.is_success() {
            info!("Created database '{}'", name);
        }
        Ok(outcome.is_success())
    }

    /// Generate a key for the entity type and assign it to the document
    pub async fn generate_document_key(&self, entity_type: &str, doc: &mut Document) -> Result<String> {
        let key = self.keys.generate_document_key(entity_type).await?;
        doc.key = Some(key.clone());
        Ok(key)
    }

    async fn write(&self, scope: Scope, key: &str, doc: &Document) -> Result<PutOutcome> {
        let token = if self.config.use_optimistic_concurrency {
            doc.etag()
        } else {
            None
        };
        Ok(self
            .store
            .write(scope, key, &doc.body, doc.entity_name(), token)
            .await?)
    }
}
