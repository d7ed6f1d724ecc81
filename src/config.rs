//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.cafe-scorer.toml` files.

use crate::analysis::Tuning;
use crate::summarizer::FailurePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".cafe-scorer.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Generative summarizer settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Source, store and timeout settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Aggregation vocabularies, thresholds and weights.
    #[serde(default)]
    pub tuning: Tuning,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of venues analyzed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "cafe_report.md".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Generative model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ask the model for summaries instead of using templates.
    #[serde(default)]
    pub enabled: bool,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Total attempts when the response violates the schema.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// What to do after the last rejected attempt.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Reviews embedded in one prompt.
    #[serde(default = "default_max_prompt_reviews")]
    pub max_prompt_reviews: usize,

    /// Cost per 1000 tokens, for the audit trail.
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            max_attempts: default_max_attempts(),
            failure_policy: FailurePolicy::default(),
            max_prompt_reviews: default_max_prompt_reviews(),
            cost_per_1k_tokens: 0.0,
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    120
}

fn default_max_attempts() -> usize {
    2 // one retry
}

fn default_max_prompt_reviews() -> usize {
    50
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// JSON export of venues and reviews.
    #[serde(default = "default_source")]
    pub source: String,

    /// JSON store file.
    #[serde(default = "default_store")]
    pub store: String,

    /// Timeout for fetching one venue's reviews.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            store: default_store(),
            fetch_timeout_seconds: default_fetch_timeout(),
        }
    }
}

fn default_source() -> String {
    "reviews.json".to_string()
}

fn default_store() -> String {
    "cafe_store.json".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .tuning
            .validate()
            .with_context(|| format!("Invalid tuning in {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref source) = args.source {
            self.pipeline.source = source.display().to_string();
        }
        if let Some(ref store) = args.store {
            self.pipeline.store = store.display().to_string();
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(policy) = args.on_model_failure {
            self.model.failure_policy = policy;
        }

        // Model mode - only override if explicitly provided via CLI flags
        if args.use_model {
            self.model.enabled = true;
        } else if args.no_model {
            self.model.enabled = false;
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
