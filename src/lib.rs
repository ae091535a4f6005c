//! # raven-client
//!
//! An async client for a document database server, built around a Hi-Lo
//! document key generator.
//!
//! Keys such as `Album/1` are generated locally from ranges of ids reserved
//! on the server, so most new documents get their key without a round trip.
//! The generator works against any [`DocumentStore`]: the server over HTTP
//! ([`HttpStore`]) or an embedded sled database ([`SledStore`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use raven_client::{Client, IndexQuery};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:8080")?;
//!
//!     let body = json!({ "Title": "Revolver", "Artist": "Beatles" });
//!     let mut album = client.create_document("Album", body.as_object().cloned().unwrap_or_default());
//!     client.store(&mut album).await?;
//!
//!     let query = IndexQuery::new().term("Artist", "Beatles").wait_for_non_stale_results();
//!     if let Some(result) = client.query_index("AlbumsByArtist", &query).await? {
//!         println!("{} albums", result.total_results);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod hilo;
pub mod http;
pub mod storage;
pub mod store;
pub mod types;
pub mod util;

pub use client::Client;
pub use config::{ClientConfig, HiLoConfig};
pub use error::{AllocationError, ConfigurationError, ConflictError, Error, Result, StoreError};
pub use hilo::HiLoKeyGenerator;
pub use http::{HttpStore, Scope};
pub use storage::SledStore;
pub use store::{Body, Document, DocumentStore, Etag, Metadata, PutOutcome};
pub use types::{IndexQuery, QueryResult};
