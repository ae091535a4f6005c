#![allow(dead_code)]

//! In-process stand-in for the document server used by the integration tests

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::{Mutex, MutexGuard};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const EMPTY_ETAG: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone)]
pub struct StoredDoc {
    pub etag: String,
    pub entity_name: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub if_none_match: Option<String>,
    pub entity_name: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    token: Option<String>,
    docs: HashMap<(Option<String>, String), StoredDoc>,
    indexes: HashMap<String, String>,
    next_etag: u64,
    pub stale_polls: u32,
    pub index_queries: u32,
    pub fail_next: u32,
    pub requests: Vec<RecordedRequest>,
}

pub struct MockServer {
    pub url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with_token(None).await
    }

    pub async fn start_with_token(token: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(MockState {
            token: token.map(|t| t.to_string()),
            ..Default::default()
        }));

        let server_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = server_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(handle(state, req).await) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    pub fn document(&self, database: Option<&str>, key: &str) -> Option<StoredDoc> {
        self.state()
            .docs
            .get(&(database.map(|d| d.to_string()), key.to_string()))
            .cloned()
    }

    pub fn insert_document(&self, database: Option<&str>, key: &str, entity: Option<&str>, body: Value) {
        let mut state = self.state();
        let etag = state.mint_etag();
        state.docs.insert(
            (database.map(|d| d.to_string()), key.to_string()),
            StoredDoc {
                etag,
                entity_name: entity.map(|e| e.to_string()),
                body,
            },
        );
    }

    /// Index `name` returns documents of entity type `entity`
    pub fn define_index(&self, name: &str, entity: &str) {
        self.state().indexes.insert(name.to_string(), entity.to_string());
    }

    pub fn fail_next(&self, count: u32) {
        self.state().fail_next = count;
    }

    pub fn set_stale_polls(&self, count: u32) {
        self.state().stale_polls = count;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    pub fn puts_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::PUT && r.path == path)
            .collect()
    }
}

async fn handle(state: Arc<Mutex<MockState>>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let bytes = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
    let mut state = state.lock();
    state.route(&parts, &bytes)
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn respond(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

impl MockState {
    fn mint_etag(&mut self) -> String {
        self.next_etag += 1;
        format!("00000000-0000-0000-0000-{:012}", self.next_etag)
    }

    fn route(&mut self, parts: &Parts, body: &[u8]) -> Response<Full<Bytes>> {
        let path = percent_decode_str(parts.uri.path()).decode_utf8_lossy().to_string();
        self.requests.push(RecordedRequest {
            method: parts.method.clone(),
            path: path.clone(),
            if_none_match: header(parts, "if-none-match"),
            entity_name: header(parts, "raven-entity-name"),
        });

        if let Some(token) = &self.token {
            if header(parts, "authorization") != Some(format!("Bearer {}", token)) {
                return respond(StatusCode::UNAUTHORIZED, json!({ "Error": "Unauthorized" }));
            }
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return respond(StatusCode::INTERNAL_SERVER_ERROR, json!({ "Error": "Simulated failure" }));
        }

        if parts.method == Method::GET && path == "/databases" {
            return self.list_databases();
        }

        let (database, rest) = match path.strip_prefix("/databases/") {
            Some(rest) => match rest.split_once('/') {
                Some((db, rest)) => (Some(db.to_string()), format!("/{}", rest)),
                None => return respond(StatusCode::NOT_FOUND, json!({})),
            },
            None => (None, path.clone()),
        };

        if let Some(key) = rest.strip_prefix("/docs/") {
            match parts.method {
                Method::GET => self.get_doc(database, key),
                Method::PUT => self.put_doc(database, key, parts, body),
                _ => respond(StatusCode::METHOD_NOT_ALLOWED, json!({})),
            }
        } else if let Some(index) = rest.strip_prefix("/indexes/") {
            self.query(database, index, parts.uri.query().unwrap_or(""))
        } else {
            respond(StatusCode::NOT_FOUND, json!({}))
        }
    }

    fn list_databases(&self) -> Response<Full<Bytes>> {
        let mut names: Vec<String> = self
            .docs
            .keys()
            .filter(|(db, _)| db.is_none())
            .filter_map(|(_, key)| key.strip_prefix("Raven/Databases/").map(|n| n.to_string()))
            .collect();
        names.sort();
        respond(StatusCode::OK, json!(names))
    }

    fn get_doc(&self, database: Option<String>, key: &str) -> Response<Full<Bytes>> {
        match self.docs.get(&(database, key.to_string())) {
            Some(doc) => {
                let mut builder = Response::builder()
                    .status(StatusCode::OK)
                    .header("content-type", "application/json")
                    .header("etag", format!("\"{}\"", doc.etag));
                if let Some(entity) = &doc.entity_name {
                    builder = builder.header("raven-entity-name", entity.as_str());
                }
                builder
                    .body(Full::new(Bytes::from(doc.body.to_string())))
                    .unwrap()
            }
            None => respond(StatusCode::NOT_FOUND, json!({})),
        }
    }

    fn put_doc(
        &mut self,
        database: Option<String>,
        key: &str,
        parts: &Parts,
        body: &[u8],
    ) -> Response<Full<Bytes>> {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return respond(StatusCode::BAD_REQUEST, json!({ "Error": "Invalid JSON" }));
        };

        let id = (database, key.to_string());
        let existing = self.docs.get(&id);
        if let Some(expected) = header(parts, "if-none-match") {
            let matches = match existing {
                Some(doc) => doc.etag == expected,
                None => expected == EMPTY_ETAG,
            };
            if !matches {
                return respond(StatusCode::CONFLICT, json!({ "Error": "Concurrency conflict" }));
            }
        }

        let status = if existing.is_some() { StatusCode::OK } else { StatusCode::CREATED };
        let entity_name = header(parts, "raven-entity-name")
            .or_else(|| existing.and_then(|d| d.entity_name.clone()));
        let etag = self.mint_etag();
        self.docs.insert(
            id,
            StoredDoc {
                etag: etag.clone(),
                entity_name,
                body: value,
            },
        );

        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .header("etag", format!("\"{}\"", etag))
            .body(Full::new(Bytes::from(json!({ "Key": key, "ETag": etag }).to_string())))
            .unwrap()
    }

    fn query(&mut self, database: Option<String>, index: &str, query_string: &str) -> Response<Full<Bytes>> {
        let Some(entity) = self.indexes.get(index).cloned() else {
            return respond(StatusCode::NOT_FOUND, json!({ "Error": "Index not found" }));
        };
        self.index_queries += 1;

        let query = url::form_urlencoded::parse(query_string.as_bytes())
            .find(|(name, _)| name == "query")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        let terms: Vec<(String, String)> = query
            .split_whitespace()
            .filter_map(|term| term.split_once(':'))
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();

        let mut results: Vec<Value> = self
            .docs
            .iter()
            .filter(|((db, _), doc)| *db == database && doc.entity_name.as_deref() == Some(entity.as_str()))
            .filter(|(_, doc)| {
                terms.iter().all(|(field, expected)| match doc.body.get(field) {
                    Some(Value::String(s)) => s == expected,
                    Some(other) => other.to_string() == *expected,
                    None => false,
                })
            })
            .map(|(_, doc)| doc.body.clone())
            .collect();
        results.sort_by_key(|v| v.to_string());

        let total = results.len();
        let is_stale = if self.stale_polls > 0 {
            self.stale_polls -= 1;
            true
        } else {
            false
        };

        respond(
            StatusCode::OK,
            json!({
                "Results": results,
                "Includes": [],
                "IsStale": is_stale,
                "TotalResults": total,
                "SkippedResults": 0,
                "IndexName": index,
            }),
        )
    }
}
