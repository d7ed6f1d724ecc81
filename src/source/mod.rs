//! Review sources.
//!
//! A review source returns a venue's metadata and raw reviews. Pagination
//! and rate limiting belong to the source; the pipeline treats a fetch as
//! one opaque call.

use crate::models::{Review, Venue};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// A venue together with the reviews the source returned for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueListing {
    #[serde(flatten)]
    pub venue: Venue,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// Provider of raw reviews keyed by venue id.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Fetch metadata and reviews for one venue.
    async fn fetch(&self, venue_id: &str) -> Result<VenueListing>;

    /// All venue ids the source knows about.
    async fn venue_ids(&self) -> Result<Vec<String>>;
}

/// On-disk export format: `{ "venues": [ ... ] }`.
#[derive(Debug, Deserialize)]
struct SourceFile {
    venues: Vec<VenueListing>,
}

/// Review source backed by a JSON export of scraped venues.
#[derive(Debug, Clone, Default)]
pub struct JsonFileSource {
    venues: BTreeMap<String, VenueListing>,
}

impl JsonFileSource {
    /// Load a source file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read review source: {}", path.display()))?;
        let source = Self::from_json(&content)
            .with_context(|| format!("Failed to parse review source: {}", path.display()))?;

        info!(
            "Loaded {} venues from {}",
            source.venues.len(),
            path.display()
        );
        Ok(source)
    }

    /// Parse a source document.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: SourceFile = serde_json::from_str(content)?;
        Ok(Self::from_listings(file.venues))
    }

    pub fn from_listings(listings: Vec<VenueListing>) -> Self {
        let venues = listings
            .into_iter()
            .map(|l| (l.venue.venue_id.clone(), l))
            .collect();
        Self { venues }
    }
}

#[async_trait]
impl ReviewSource for JsonFileSource {
    async fn fetch(&self, venue_id: &str) -> Result<VenueListing> {
        let listing = self
            .venues
            .get(venue_id)
            .cloned()
            .with_context(|| format!("Unknown venue: {}", venue_id))?;
        debug!(
            "Fetched {} reviews for {}",
            listing.reviews.len(),
            venue_id
        );
        Ok(listing)
    }

    async fn venue_ids(&self) -> Result<Vec<String>> {
        Ok(self.venues.keys().cloned().collect())
    }
}
