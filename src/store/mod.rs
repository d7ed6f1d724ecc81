//! Persistent venue store.
//!
//! The store holds, per venue, its metadata, the append-only review list,
//! the latest per-review annotations and the latest profile, plus the
//! audit trail of analysis runs.

use crate::models::{AuditRecord, Review, ReviewAnnotation, Venue, VenueProfile};
use crate::source::VenueListing;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Storage operations the pipeline needs.
#[async_trait]
pub trait VenueStore: Send + Sync {
    /// Upsert venue metadata and append reviews not seen before.
    ///
    /// Returns the number of newly stored reviews.
    async fn ingest(&self, listing: &VenueListing) -> Result<usize>;

    /// Full current review list of a venue.
    async fn reviews(&self, venue_id: &str) -> Result<Vec<Review>>;

    /// Latest stored profile of a venue.
    async fn profile(&self, venue_id: &str) -> Result<Option<VenueProfile>>;

    /// Replace a venue's profile and annotations in one write.
    async fn save_analysis(
        &self,
        venue_id: &str,
        profile: &VenueProfile,
        annotations: &[ReviewAnnotation],
    ) -> Result<()>;

    async fn append_audit(&self, record: AuditRecord) -> Result<()>;

    /// Audit records, optionally filtered to one venue, oldest first.
    async fn audit_trail(&self, venue_id: Option<&str>) -> Result<Vec<AuditRecord>>;
}

/// Everything stored for one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub venue: Venue,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub annotations: Vec<ReviewAnnotation>,
    #[serde(default)]
    pub profile: Option<VenueProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    venues: BTreeMap<String, VenueRecord>,
    #[serde(default)]
    audit: Vec<AuditRecord>,
}

/// Store kept as a single JSON document.
///
/// Opened from a path, every write is persisted by writing a temp file and
/// renaming it over the original. Created with [`JsonStore::in_memory`],
/// nothing touches disk.
pub struct JsonStore {
    path: Option<PathBuf>,
    doc: Mutex<StoreDocument>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: Mutex::new(StoreDocument::default()),
        }
    }

    /// Open a store file, starting empty if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read store: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse store: {}", path.display()))?
        } else {
            info!("Creating new store at {}", path.display());
            StoreDocument::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            doc: Mutex::new(doc),
        })
    }

    /// Load a store file but keep every later change in memory only.
    pub fn open_detached(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::in_memory());
        }
        let mut store = Self::open(path)?;
        store.path = None;
        Ok(store)
    }

    /// Apply a change to a copy of the document, persist it, then swap it in.
    ///
    /// A failed write leaves the in-memory document unchanged.
    async fn commit<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut StoreDocument) -> Result<T> + Send,
        T: Send,
    {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        let out = change(&mut next)?;

        if let Some(ref path) = self.path {
            let content = serde_json::to_string_pretty(&next).context("Failed to serialize store")?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, content)
                .await
                .with_context(|| format!("Failed to write store: {}", tmp.display()))?;
            tokio::fs::rename(&tmp, path)
                .await
                .with_context(|| format!("Failed to replace store: {}", path.display()))?;
            debug!("Persisted store to {}", path.display());
        }

        *doc = next;
        Ok(out)
    }
}

#[async_trait]
impl VenueStore for JsonStore {
    async fn ingest(&self, listing: &VenueListing) -> Result<usize> {
        self.commit(|doc| {
            let record = doc
                .venues
                .entry(listing.venue.venue_id.clone())
                .or_insert_with(|| VenueRecord {
                    venue: listing.venue.clone(),
                    reviews: Vec::new(),
                    annotations: Vec::new(),
                    profile: None,
                });
            record.venue = listing.venue.clone();

            let mut seen: HashSet<String> =
                record.reviews.iter().map(|r| r.review_id.clone()).collect();
            let mut added = 0;

            for review in &listing.reviews {
                if !(1..=5).contains(&review.rating) {
                    warn!(
                        "Skipping review {} of {}: rating {} outside 1-5",
                        review.review_id, listing.venue.venue_id, review.rating
                    );
                    continue;
                }
                if seen.insert(review.review_id.clone()) {
                    record.reviews.push(review.clone());
                    added += 1;
                }
            }

            Ok(added)
        })
        .await
    }

    async fn reviews(&self, venue_id: &str) -> Result<Vec<Review>> {
        let doc = self.doc.lock().await;
        Ok(doc
            .venues
            .get(venue_id)
            .map(|r| r.reviews.clone())
            .unwrap_or_default())
    }

    async fn profile(&self, venue_id: &str) -> Result<Option<VenueProfile>> {
        let doc = self.doc.lock().await;
        Ok(doc.venues.get(venue_id).and_then(|r| r.profile.clone()))
    }

    async fn save_analysis(
        &self,
        venue_id: &str,
        profile: &VenueProfile,
        annotations: &[ReviewAnnotation],
    ) -> Result<()> {
        self.commit(|doc| {
            let record = doc
                .venues
                .get_mut(venue_id)
                .with_context(|| format!("Unknown venue: {}", venue_id))?;
            record.profile = Some(profile.clone());
            record.annotations = annotations.to_vec();
            Ok(())
        })
        .await
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<()> {
        self.commit(|doc| {
            doc.audit.push(record);
            Ok(())
        })
        .await
    }

    async fn audit_trail(&self, venue_id: Option<&str>) -> Result<Vec<AuditRecord>> {
        let doc = self.doc.lock().await;
        Ok(doc
            .audit
            .iter()
            .filter(|r| venue_id.map_or(true, |id| r.venue_id == id))
            .cloned()
            .collect())
    }
}
