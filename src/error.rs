//! Error types for the analysis pipeline.
//!
//! Application plumbing (config, CLI, file IO) uses `anyhow`; these enums
//! cover the failures a venue run is classified by.

use crate::models::RunStatus;
use thiserror::Error;

/// Failures of the generative summarizer.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// The model could not be reached or answered with an error.
    #[error("summarizer request failed: {0}")]
    Transport(String),

    /// The model answered, but not with the expected JSON schema.
    #[error("summarizer response violated schema: {0}")]
    Schema(String),

    #[error("summarizer timed out after {0}s")]
    Timeout(u64),
}

/// Per-venue failures. None of these abort a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch reviews for {venue_id}: {message}")]
    Fetch { venue_id: String, message: String },

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error(transparent)]
    Summarizer(#[from] SummaryError),

    #[error("failed to persist analysis: {0}")]
    Persist(String),
}

impl PipelineError {
    /// Audit status recorded for this failure.
    pub fn status(&self) -> RunStatus {
        match self {
            PipelineError::Fetch { .. } => RunStatus::FetchFailed,
            PipelineError::Timeout { .. } => RunStatus::TimedOut,
            PipelineError::Summarizer(SummaryError::Timeout(_)) => RunStatus::TimedOut,
            PipelineError::Summarizer(_) => RunStatus::SummarizerFailed,
            PipelineError::Persist(_) => RunStatus::PersistFailed,
        }
    }
}
