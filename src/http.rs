//! HTTP document store speaking the server's REST API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroize;

use crate::config::ClientConfig;
use crate::error::StoreError;
use crate::store::{Body, Document, DocumentStore, Etag, Metadata, PutOutcome};
use crate::util::encoding::encode_key;

pub const ENTITY_NAME_HEADER: &str = "raven-entity-name";
const METADATA_FIELD: &str = "@metadata";

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Which URL a request is resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The selected tenant database, or the server root when none is selected
    Database,
    /// The server root, regardless of the selected database
    Root,
}

/// Bearer token that zeros its memory on drop
struct BearerToken(String);

impl Drop for BearerToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[derive(Deserialize)]
struct PutResponse {
    #[serde(rename = "ETag")]
    etag: Option<String>,
}

/// Build a rustls ClientConfig trusting the webpki root certificates.
fn build_tls_config() -> Result<rustls::ClientConfig, StoreError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| StoreError::Connection(format!("TLS setup failed: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// A [`DocumentStore`] backed by the server's `/docs` endpoint
#[derive(Clone)]
pub struct HttpStore {
    root_url: Arc<str>,
    database_url: Arc<str>,
    database: Option<Arc<str>>,
    token: Option<Arc<BearerToken>>,
    timeout_ms: u64,
    http_client: HttpClient<HttpsConnector, Full<Bytes>>,
}

impl HttpStore {
    /// Create a store for the server root; see [`HttpStore::for_database`] for tenants
    pub fn new(config: &ClientConfig) -> Result<Self, StoreError> {
        let root_url = config.root_url();
        let parsed = url::Url::parse(root_url)
            .map_err(|e| StoreError::InvalidUrl(format!("Invalid server URL '{}': {}", root_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreError::InvalidUrl(format!(
                "Unsupported scheme '{}' in server URL",
                parsed.scheme()
            )));
        }

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(build_tls_config()?)
            .https_or_http()
            .enable_http1()
            .build();
        let http_client = HttpClient::builder(TokioExecutor::new()).build(https_connector);

        let root_url: Arc<str> = Arc::from(root_url);
        Ok(Self {
            database_url: root_url.clone(),
            root_url,
            database: None,
            token: config.token.clone().map(|t| Arc::new(BearerToken(t))),
            timeout_ms: config.timeout_ms,
            http_client,
        })
    }

    /// A handle whose database-scoped requests go to `/databases/<name>`
    pub fn for_database(&self, name: &str) -> Self {
        let mut store = self.clone();
        store.database_url = Arc::from(format!("{}/databases/{}", self.root_url, encode_key(name)));
        store.database = Some(Arc::from(name));
        store
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Base URL for database-scoped requests
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn url(&self, scope: Scope, path: &str) -> String {
        match scope {
            Scope::Database => format!("{}{}", self.database_url, path),
            Scope::Root => format!("{}{}", self.root_url, path),
        }
    }

    /// Send a request and read the whole response.
    /// 401 and 5xx become errors; every other status is left to the caller.
    async fn send(
        &self,
        scope: Scope,
        path: &str,
        method: Method,
        body: Option<Bytes>,
        headers: &[(&str, String)],
    ) -> Result<(StatusCode, HeaderMap, Bytes), StoreError> {
        let url = self.url(scope, path);
        let uri: Uri = url
            .parse()
            .map_err(|e| StoreError::InvalidUrl(format!("Invalid request URL '{}': {}", url, e)))?;

        let mut builder = Request::builder().method(method.clone()).uri(uri);
        if let Some(token) = &self.token {
            builder = builder.header("authorization", format!("Bearer {}", token.0));
        }
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let req = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| StoreError::InvalidRequest(format!("Failed to build request: {}", e)))?;

        debug!("Sending request: {} {}", method, url);

        let timeout = Duration::from_millis(self.timeout_ms);
        let response = tokio::time::timeout(timeout, self.http_client.request(req))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout_ms))?
            .map_err(|e| StoreError::Connection(format!("Request failed: {}", e)))?;

        let status = response.status();
        let (parts, body) = response.into_parts();
        let bytes = read_body(body).await?;

        match status {
            StatusCode::UNAUTHORIZED => Err(StoreError::Unauthorized),
            code if code.is_server_error() => Err(StoreError::Server {
                status: code.as_u16(),
                message: String::from_utf8_lossy(&bytes).to_string(),
            }),
            _ => Ok((status, parts.headers, bytes)),
        }
    }

    /// Fetch a document; `None` when the server answers 404
    pub async fn fetch(&self, scope: Scope, key: &str) -> Result<Option<Document>, StoreError> {
        let path = format!("/docs/{}", encode_key(key));
        let (status, headers, bytes) = self.send(scope, &path, Method::GET, None, &[]).await?;

        match status {
            StatusCode::OK => {
                let mut body: Body = serde_json::from_slice(&bytes)?;
                body.remove(METADATA_FIELD);
                Ok(Some(Document {
                    key: Some(key.to_string()),
                    body,
                    metadata: Metadata {
                        etag: header_etag(&headers),
                        entity_name: header_str(&headers, ENTITY_NAME_HEADER),
                    },
                }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(unexpected(other, &bytes)),
        }
    }

    /// Store a document body, conditioned on `token` when one is given
    pub async fn write(
        &self,
        scope: Scope,
        key: &str,
        body: &Body,
        entity_name: Option<&str>,
        token: Option<&Etag>,
    ) -> Result<PutOutcome, StoreError> {
        let path = format!("/docs/{}", encode_key(key));
        let payload = if body.contains_key(METADATA_FIELD) {
            let mut stripped = body.clone();
            stripped.remove(METADATA_FIELD);
            serde_json::to_vec(&stripped)?
        } else {
            serde_json::to_vec(body)?
        };

        let mut headers = vec![("content-type", "application/json; charset=utf-8".to_string())];
        if let Some(token) = token {
            headers.push(("if-none-match", token.to_string()));
        }
        if let Some(name) = entity_name {
            headers.push((ENTITY_NAME_HEADER, name.to_string()));
        }

        let (status, response_headers, bytes) = self
            .send(scope, &path, Method::PUT, Some(Bytes::from(payload)), &headers)
            .await?;

        match status {
            StatusCode::OK | StatusCode::CREATED => {
                let etag = header_etag(&response_headers).or_else(|| {
                    serde_json::from_slice::<PutResponse>(&bytes)
                        .ok()
                        .and_then(|r| r.etag)
                        .map(Etag::new)
                });
                Ok(PutOutcome::Written { etag })
            }
            StatusCode::CONFLICT => {
                debug!("Write to {} rejected: concurrency conflict", key);
                Ok(PutOutcome::Conflict)
            }
            other => Err(unexpected(other, &bytes)),
        }
    }

    /// GET a JSON resource; `None` when the server answers 404
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        scope: Scope,
        path_and_query: &str,
    ) -> Result<Option<T>, StoreError> {
        let headers = [("accept", "application/json".to_string())];
        let (status, _, bytes) = self
            .send(scope, path_and_query, Method::GET, None, &headers)
            .await?;

        match status {
            StatusCode::OK => Ok(Some(serde_json::from_slice(&bytes)?)),
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(unexpected(other, &bytes)),
        }
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn get_document(&self, key: &str) -> Result<Option<Document>, StoreError> {
        self.fetch(Scope::Database, key).await
    }

    async fn put_document(
        &self,
        key: &str,
        body: &Body,
        token: Option<&Etag>,
    ) -> Result<PutOutcome, StoreError> {
        self.write(Scope::Database, key, body, None, token).await
    }
}

/// Read response body to bytes
async fn read_body(body: Incoming) -> Result<Bytes, StoreError> {
    let collected = body
        .collect()
        .await
        .map_err(|e| StoreError::Connection(format!("Failed to read response body: {}", e)))?;
    Ok(collected.to_bytes())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

fn header_etag(headers: &HeaderMap) -> Option<Etag> {
    header_str(headers, "etag").map(|v| Etag::new(v.trim_matches('"')))
}

fn unexpected(status: StatusCode, body: &[u8]) -> StoreError {
    let message = String::from_utf8_lossy(body).to_string();
    if status.is_client_error() {
        StoreError::InvalidRequest(format!("{}: {}", status, message))
    } else {
        StoreError::Server {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn store(url: &str) -> Result<HttpStore, StoreError> {
        HttpStore::new(&ClientConfig::new(url))
    }

    #[test]
    fn test_new_http_and_https() {
        assert!(store("http://localhost:8080").is_ok());
        assert!(store("https://raven.example.com").is_ok());
    }

    #[test]
    fn test_new_rejects_bad_urls() {
        assert!(matches!(store("not a url"), Err(StoreError::InvalidUrl(_))));
        assert!(matches!(store("ftp://localhost"), Err(StoreError::InvalidUrl(_))));
    }

    #[test]
    fn test_scoped_urls() {
        let root = store("http://localhost:8080/").unwrap();
        assert_eq!(root.url(Scope::Database, "/docs/a"), "http://localhost:8080/docs/a");
        assert!(root.database().is_none());

        let tenant = root.for_database("music");
        assert_eq!(tenant.database(), Some("music"));
        assert_eq!(tenant.url(Scope::Database, "/docs/a"), "http://localhost:8080/databases/music/docs/a");
        assert_eq!(tenant.url(Scope::Root, "/databases"), "http://localhost:8080/databases");

        // Switching tenants starts from the root, not the previous tenant
        let other = tenant.for_database("films");
        assert_eq!(other.database_url(), "http://localhost:8080/databases/films");
    }

    #[test]
    fn test_header_etag_strips_quotes() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("\"00000000-0000-0000-0000-000000000005\""));
        assert_eq!(
            header_etag(&headers),
            Some(Etag::new("00000000-0000-0000-0000-000000000005"))
        );
        assert_eq!(header_etag(&HeaderMap::new()), None);
    }

    #[test]
    fn test_unexpected_status_mapping() {
        assert!(matches!(
            unexpected(StatusCode::BAD_REQUEST, b"bad"),
            StoreError::InvalidRequest(msg) if msg.contains("bad")
        ));
        assert!(matches!(
            unexpected(StatusCode::MOVED_PERMANENTLY, b""),
            StoreError::Server { status: 301, .. }
        ));
    }
}
