//! Core data models for playlist migration.
//!
//! This module contains the track value type shared by both catalogs and
//! the small wrappers the matching pipeline passes around.

use serde::{Deserialize, Serialize};

// ============================================================================
// Tracks
// ============================================================================

/// A track as returned by a catalog.
///
/// `search_string` is the display string used for querying and matching
/// ("Artist - Title"). `id` is only set for tracks that came back from a
/// catalog that addresses tracks by identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub search_string: String,
    pub artist: String,
    pub title: String,
    pub duration_ms: u64,
    pub id: Option<String>,
}

impl Track {
    /// Build a track and derive its search string from artist and title.
    pub fn new(artist: impl Into<String>, title: impl Into<String>, duration_ms: u64) -> Self {
        let artist = artist.into();
        let title = title.into();
        Self {
            search_string: format!("{} - {}", artist, title),
            artist,
            title,
            duration_ms,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Identifier if present and non-empty.
    pub fn catalog_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

// ============================================================================
// Matching
// ============================================================================

/// Ordered, de-duplicated search queries derived from one source track,
/// from least to most aggressively cleaned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchVariants(Vec<String>);

impl SearchVariants {
    /// Build from already ordered queries, dropping repeats (first one wins).
    pub fn from_ordered<I>(queries: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut out: Vec<String> = Vec::new();
        for query in queries {
            if !out.contains(&query) {
                out.push(query);
            }
        }
        Self(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// A candidate track from one catalog search, with its fuzzy score when the
/// fuzzy strategy ranked it (lower is better).
#[derive(Clone, Copy, Debug)]
pub struct MatchCandidate<'a> {
    pub track: &'a Track,
    pub score: Option<f64>,
}
