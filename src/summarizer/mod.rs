//! Generative summaries.
//!
//! The model only supplies the one-sentence summary of a venue profile;
//! scores and categoricals always come from the deterministic aggregator.

pub mod client;
pub mod verdict;

use crate::error::SummaryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{OllamaConfig, OllamaSummarizer};
pub use verdict::{build_prompt, request_verdict, Usage};

/// A text model that completes a single prompt.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, SummaryError>;

    /// Model identifier, for logs and reports.
    fn model_name(&self) -> &str;
}

/// What to do when the model keeps answering outside the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Use the template summary and keep the run.
    #[default]
    Fallback,
    /// Fail the venue run and leave its stored profile untouched.
    Fail,
}
