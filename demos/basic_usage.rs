//! Basic usage example for the Raven client
//!
//! Run with: RAVEN_URL=http://localhost:8080 cargo run --example basic_usage

use raven_client::{Client, IndexQuery};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DATABASE: &str = "raven-client-sample";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut client = match Client::from_env() {
        Ok(client) => client,
        Err(_) => Client::new("http://localhost:8080")?,
    };

    if !client.ensure_database_exists(DATABASE).await? {
        return Err("Unable to create the sample database. Check the server is running.".into());
    }
    client.use_database(DATABASE)?;
    info!("Using {}", client.database_url());

    // Store a few documents; keys are generated from reserved ranges
    let albums = [
        ("Please Please Me", 1963),
        ("Help!", 1965),
        ("Revolver", 1966),
    ];
    for (title, year) in albums {
        let body = json!({ "Title": title, "Artist": "Beatles", "Year": year });
        let mut album = client.create_document("Album", body.as_object().cloned().unwrap_or_default());
        client.store(&mut album).await?;
        info!("Stored '{}' as {}", title, album.key.as_deref().unwrap_or("?"));
    }

    // Read one back
    if let Some(album) = client.get_document("Album/1").await? {
        info!("Album/1: {:?} (etag {:?})", album.get("Title"), album.etag());
    }

    // Query an index, waiting for it to catch up with the writes above
    let query = IndexQuery::new()
        .term("Artist", "Beatles")
        .wait_for_non_stale_results();
    match client.query_index("Raven/DocumentsByEntityName", &query).await? {
        Some(result) => info!("Query returned {} of {} results", result.results.len(), result.total_results),
        None => info!("Index not found"),
    }

    let databases = client.get_database_names().await?;
    info!("Databases on server: {:?}", databases);

    Ok(())
}
