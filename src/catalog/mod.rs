//! Catalog adapters.
//!
//! Each adapter owns its own session state and exposes only the calls the
//! migration needs. The orchestrator talks to the destination through
//! [`DestinationCatalog`], so tests can swap in an in-memory catalog.

pub mod spotify;
pub mod vk;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::CatalogError;
use crate::models::Track;

/// Most track identifiers one playlist-add call accepts.
pub const MAX_TRACKS_PER_ADD: usize = 100;

/// The catalog tracks are migrated into.
#[async_trait]
pub trait DestinationCatalog: Send {
    /// Tracks matching `query`, in the catalog's relevance order.
    async fn search(&mut self, query: &str) -> Result<Vec<Track>, CatalogError>;

    /// Create a playlist and return its identifier.
    async fn create_playlist(&mut self, name: &str) -> Result<String, CatalogError>;

    async fn add_to_playlist(&mut self, playlist_id: &str, ids: &[String])
        -> Result<(), CatalogError>;

    fn is_authenticated(&self) -> bool;
}

/// The catalog tracks are migrated from.
#[async_trait]
pub trait SourceCatalog: Send {
    /// Check the session and load the user profile.
    async fn verify(&mut self) -> Result<(), CatalogError>;

    async fn fetch_tracks(&mut self, owner_id: i64) -> Result<Vec<Track>, CatalogError>;

    fn is_authenticated(&self) -> bool;
}

/// Shared HTTP client. No automatic retries.
pub fn http_client() -> Result<Client, CatalogError> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("playlist-migrate/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(CatalogError::from)
}
