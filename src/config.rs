use std::env;

use crate::error::ConfigurationError;

pub const DEFAULT_CAPACITY: u64 = 32;
pub const DEFAULT_KEY_SEPARATOR: &str = "/";
pub const DEFAULT_DOCUMENT_PREFIX: &str = "Raven/Hilo/";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_STALE_RETRY_INTERVAL_MS: u64 = 500;

/// Settings for [`HiLoKeyGenerator`](crate::hilo::HiLoKeyGenerator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiLoConfig {
    /// Joins entity type and numeric id in generated keys (default: `/`)
    pub key_separator: String,
    /// Ids reserved per server round trip (default: 32)
    pub capacity: u64,
    /// Prefix of the range documents (default: `Raven/Hilo/`)
    pub document_prefix: String,
}

impl Default for HiLoConfig {
    fn default() -> Self {
        Self {
            key_separator: DEFAULT_KEY_SEPARATOR.to_string(),
            capacity: DEFAULT_CAPACITY,
            document_prefix: DEFAULT_DOCUMENT_PREFIX.to_string(),
        }
    }
}

impl HiLoConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.capacity == 0 {
            return Err(ConfigurationError(
                "capacity must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration options for the [`Client`](crate::Client)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, without any tenant path (default: http://localhost:8080)
    pub server_url: String,
    /// Tenant database to use, if any
    pub database: Option<String>,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Request timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Send the document etag on put so concurrent edits are rejected (default: false)
    pub use_optimistic_concurrency: bool,
    /// Delay between re-issued queries while an index is stale (default: 500)
    pub stale_retry_interval_ms: u64,
    /// Key generator settings
    pub hilo: HiLoConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            database: None,
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            use_optimistic_concurrency: false,
            stale_retry_interval_ms: DEFAULT_STALE_RETRY_INTERVAL_MS,
            hilo: HiLoConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config for a server URL with every other option defaulted
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigurationError> {
        let server_url = env::var("RAVEN_URL")
            .map_err(|_| ConfigurationError("RAVEN_URL environment variable must be set".to_string()))?;
        let database = env::var("RAVEN_DATABASE").ok().filter(|s| !s.is_empty());
        let token = env::var("RAVEN_TOKEN").ok().filter(|s| !s.is_empty());
        let timeout_ms = env::var("RAVEN_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let use_optimistic_concurrency = env::var("RAVEN_OPTIMISTIC_CONCURRENCY")
            .ok()
            .map(|s| parse_bool(&s))
            .unwrap_or(false);

        // Unparseable capacity is an error, not a fallback
        let capacity = match env::var("HILO_CAPACITY") {
            Ok(s) => s.trim().parse::<u64>().map_err(|_| {
                ConfigurationError(format!("HILO_CAPACITY must be a positive integer, got '{}'", s))
            })?,
            Err(_) => DEFAULT_CAPACITY,
        };
        let key_separator = env::var("HILO_KEY_SEPARATOR")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_KEY_SEPARATOR.to_string());

        let config = ClientConfig {
            server_url,
            database,
            token,
            timeout_ms,
            use_optimistic_concurrency,
            stale_retry_interval_ms: DEFAULT_STALE_RETRY_INTERVAL_MS,
            hilo: HiLoConfig {
                key_separator,
                capacity,
                document_prefix: DEFAULT_DOCUMENT_PREFIX.to_string(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigurationError("server_url must not be empty".to_string()));
        }
        self.hilo.validate()
    }

    /// Server URL with any trailing `/` removed
    pub fn root_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
