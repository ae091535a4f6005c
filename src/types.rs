//! Request and response types for the Raven client

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A query against an index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexQuery {
    /// `(field, value)` terms, combined as `field:value` separated by spaces
    pub terms: Vec<(String, String)>,
    /// Re-issue the query until the index has caught up with recent writes
    pub wait_for_non_stale_results: bool,
}

impl IndexQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field:value` term
    pub fn term(mut self, field: &str, value: impl ToString) -> Self {
        self.terms.push((field.to_string(), value.to_string()));
        self
    }

    /// Wait for the index to become non-stale before returning results
    pub fn wait_for_non_stale_results(mut self) -> Self {
        self.wait_for_non_stale_results = true;
        self
    }
}

/// Response from an index query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueryResult {
    /// Matching documents
    pub results: Vec<Value>,
    /// Documents pulled in by include clauses
    pub includes: Vec<Value>,
    /// Whether the index was still catching up when queried
    pub is_stale: bool,
    /// Total number of matches
    pub total_results: u64,
    /// Matches skipped by the server
    pub skipped_results: u64,
    /// Name of the index that served the query
    pub index_name: Option<String>,
}

/// Settings document describing a tenant database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseDocument {
    pub settings: DatabaseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(rename = "Raven/DataDir")]
    pub data_dir: String,
}

impl DatabaseDocument {
    /// Settings for a tenant stored under `~/Tenants/<name>`
    pub fn for_tenant(name: &str) -> Self {
        Self {
            settings: DatabaseSettings {
                data_dir: format!("~/Tenants/{}", name),
            },
        }
    }
}
