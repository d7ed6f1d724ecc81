//! Data models for the cafe scorer.
//!
//! This module contains the core data structures used throughout the
//! application: raw reviews, per-review annotations, the aggregated venue
//! profile, and the audit record written for every analysis run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single review as delivered by the review source.
///
/// Reviews are immutable once ingested; the provider-assigned `review_id`
/// is the de-duplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Provider-assigned identifier.
    pub review_id: String,
    /// Display name of the reviewer.
    #[serde(default)]
    pub author: String,
    /// Star rating. Values outside 1-5 are rejected at ingest.
    pub rating: i64,
    /// Free-form review text.
    #[serde(default)]
    pub text: String,
    /// Unix timestamp (seconds) of the review.
    pub timestamp: i64,
}

/// Venue metadata delivered alongside its reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub venue_id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// Aggregate provider rating (e.g. Google Maps stars).
    #[serde(default)]
    pub rating: Option<f64>,
}

/// Work-friendliness attribute extracted from review text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Wifi,
    /// Higher scores mean louder.
    Noise,
    Outlets,
    Seating,
    Laptop,
}

impl AttributeKind {
    /// All attribute kinds in canonical order.
    pub const ALL: [AttributeKind; 5] = [
        AttributeKind::Wifi,
        AttributeKind::Noise,
        AttributeKind::Outlets,
        AttributeKind::Seating,
        AttributeKind::Laptop,
    ];
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Wifi => write!(f, "WiFi"),
            AttributeKind::Noise => write!(f, "Noise"),
            AttributeKind::Outlets => write!(f, "Outlets"),
            AttributeKind::Seating => write!(f, "Seating"),
            AttributeKind::Laptop => write!(f, "Laptop"),
        }
    }
}

/// One attribute sub-score extracted from a single review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeScore {
    pub kind: AttributeKind,
    /// Score on the 1-10 scale.
    pub score: f64,
    /// Fixed confidence weight for this attribute kind.
    pub confidence: f64,
    /// Snippet of review text that produced the score.
    pub evidence: String,
}

/// Derived analysis attached to a review by one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAnnotation {
    pub review_id: String,
    pub work_related: bool,
    /// Distinct vocabulary terms found in the text.
    pub matched_terms: Vec<String>,
    /// Sentiment in [-1, 1].
    pub sentiment: f64,
    /// Extracted attribute scores (empty for non work-related reviews).
    pub attributes: Vec<AttributeScore>,
}

impl ReviewAnnotation {
    /// Returns the extracted score for an attribute, if any.
    pub fn attribute(&self, kind: AttributeKind) -> Option<&AttributeScore> {
        self.attributes.iter().find(|a| a.kind == kind)
    }
}

/// Categorical WiFi speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WifiSpeed {
    Fast,
    Adequate,
    Slow,
}

impl fmt::Display for WifiSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WifiSpeed::Fast => write!(f, "fast"),
            WifiSpeed::Adequate => write!(f, "adequate"),
            WifiSpeed::Slow => write!(f, "slow"),
        }
    }
}

/// Categorical noise level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseLevel {
    Quiet,
    Moderate,
    Loud,
}

impl fmt::Display for NoiseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoiseLevel::Quiet => write!(f, "quiet"),
            NoiseLevel::Moderate => write!(f, "moderate"),
            NoiseLevel::Loud => write!(f, "loud"),
        }
    }
}

/// Categorical laptop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaptopPolicy {
    Encouraged,
    Allowed,
    Discouraged,
}

impl fmt::Display for LaptopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaptopPolicy::Encouraged => write!(f, "encouraged"),
            LaptopPolicy::Allowed => write!(f, "allowed"),
            LaptopPolicy::Discouraged => write!(f, "discouraged"),
        }
    }
}

/// Where the profile summary sentence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Template,
    Model,
}

/// Per-attribute averages on the 1-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeAverages {
    pub wifi: f64,
    pub noise: f64,
    pub outlets: f64,
    pub seating: f64,
    pub laptop: f64,
}

impl AttributeAverages {
    pub fn get(&self, kind: AttributeKind) -> f64 {
        match kind {
            AttributeKind::Wifi => self.wifi,
            AttributeKind::Noise => self.noise,
            AttributeKind::Outlets => self.outlets,
            AttributeKind::Seating => self.seating,
            AttributeKind::Laptop => self.laptop,
        }
    }

    pub fn set(&mut self, kind: AttributeKind, value: f64) {
        match kind {
            AttributeKind::Wifi => self.wifi = value,
            AttributeKind::Noise => self.noise = value,
            AttributeKind::Outlets => self.outlets = value,
            AttributeKind::Seating => self.seating = value,
            AttributeKind::Laptop => self.laptop = value,
        }
    }
}

/// Aggregated work-friendliness profile of a venue.
///
/// Recomputed wholesale from the full review set on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueProfile {
    pub wifi_speed: WifiSpeed,
    pub noise_level: NoiseLevel,
    pub laptop_policy: LaptopPolicy,
    pub good_for_calls: bool,
    pub good_for_focus: bool,
    /// Overall work score (0-10, one decimal).
    pub work_score: f64,
    pub averages: AttributeAverages,
    /// Venue-wide sentiment in [-1, 1].
    pub sentiment: f64,
    pub summary: String,
    pub summary_source: SummarySource,
    pub tags: Vec<String>,
    /// Evidentiary support in [0, 1].
    pub confidence: f64,
    /// Reviews that contributed attribute evidence.
    pub work_related_reviews: usize,
    pub total_reviews: usize,
    pub analyzed_at: DateTime<Utc>,
}

impl VenueProfile {
    /// Returns true if two profiles agree on every deterministic field.
    ///
    /// The summary text and timestamp are excluded since a model-sourced
    /// summary is not reproducible.
    pub fn same_scores(&self, other: &VenueProfile) -> bool {
        self.wifi_speed == other.wifi_speed
            && self.noise_level == other.noise_level
            && self.laptop_policy == other.laptop_policy
            && self.good_for_calls == other.good_for_calls
            && self.good_for_focus == other.good_for_focus
            && self.work_score.to_bits() == other.work_score.to_bits()
            && self.averages == other.averages
            && self.sentiment.to_bits() == other.sentiment.to_bits()
            && self.tags == other.tags
            && self.confidence.to_bits() == other.confidence.to_bits()
            && self.work_related_reviews == other.work_related_reviews
            && self.total_reviews == other.total_reviews
    }
}

/// Outcome of one venue analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// Model summary was rejected; the template summary was used.
    SucceededWithFallback,
    FetchFailed,
    TimedOut,
    SummarizerFailed,
    PersistFailed,
}

impl RunStatus {
    /// Returns true if the venue profile was written.
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::SucceededWithFallback)
    }

    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "✅",
            RunStatus::SucceededWithFallback => "🟡",
            RunStatus::FetchFailed | RunStatus::TimedOut => "⏭️",
            RunStatus::SummarizerFailed | RunStatus::PersistFailed => "❌",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::SucceededWithFallback => write!(f, "succeeded (template fallback)"),
            RunStatus::FetchFailed => write!(f, "fetch failed"),
            RunStatus::TimedOut => write!(f, "timed out"),
            RunStatus::SummarizerFailed => write!(f, "summarizer failed"),
            RunStatus::PersistFailed => write!(f, "persist failed"),
        }
    }
}

/// One audit trail entry; exactly one is written per analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub venue_id: String,
    pub started_at: DateTime<Utc>,
    pub total_reviews: usize,
    /// Reviews newly ingested during this run.
    pub new_reviews: usize,
    pub work_related_reviews: usize,
    pub previous_score: Option<f64>,
    pub new_score: Option<f64>,
    pub confidence: Option<f64>,
    /// Estimated model cost in the configured currency unit.
    pub cost_estimate: f64,
    pub duration_ms: u64,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn averages(value: f64) -> AttributeAverages {
        AttributeAverages {
            wifi: value,
            noise: value,
            outlets: value,
            seating: value,
            laptop: value,
        }
    }

    #[test]
    fn test_averages_get_set() {
        let mut avg = averages(5.0);
        avg.set(AttributeKind::Outlets, 8.5);
        assert_eq!(avg.get(AttributeKind::Outlets), 8.5);
        assert_eq!(avg.get(AttributeKind::Wifi), 5.0);
    }

    #[test]
    fn test_run_status_success() {
        assert!(RunStatus::Succeeded.is_success());
        assert!(RunStatus::SucceededWithFallback.is_success());
        assert!(!RunStatus::FetchFailed.is_success());
        assert!(!RunStatus::PersistFailed.is_success());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::SucceededWithFallback).unwrap();
        assert_eq!(json, "\"succeeded_with_fallback\"");
    }

    #[test]
    fn test_same_scores_ignores_summary() {
        let profile = VenueProfile {
            wifi_speed: WifiSpeed::Fast,
            noise_level: NoiseLevel::Quiet,
            laptop_policy: LaptopPolicy::Allowed,
            good_for_calls: true,
            good_for_focus: true,
            work_score: 7.2,
            averages: averages(7.0),
            sentiment: 0.5,
            summary: "one".to_string(),
            summary_source: SummarySource::Template,
            tags: vec!["quiet".to_string()],
            confidence: 0.3,
            work_related_reviews: 3,
            total_reviews: 9,
            analyzed_at: Utc::now(),
        };
        let other = VenueProfile {
            summary: "two".to_string(),
            summary_source: SummarySource::Model,
            ..profile.clone()
        };
        assert!(profile.same_scores(&other));

        let changed = VenueProfile {
            work_score: 7.3,
            ..profile.clone()
        };
        assert!(!profile.same_scores(&changed));
    }

    #[test]
    fn test_review_deserializes_with_defaults() {
        let review: Review =
            serde_json::from_str(r#"{"review_id": "r1", "rating": 4, "timestamp": 1700000000}"#)
                .unwrap();
        assert_eq!(review.text, "");
        assert_eq!(review.author, "");
    }
}
