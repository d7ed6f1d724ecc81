//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Options left unset fall back to the config file.

use crate::summarizer::FailurePolicy;
use clap::Parser;
use std::path::PathBuf;

/// cafe-scorer - work-friendliness profiles from cafe reviews
///
/// Reads scraped venue reviews, scores WiFi, noise, outlets, seating and
/// laptop friendliness, and writes a Markdown/JSON report. Summaries come
/// from templates or a local Ollama model.
///
/// Examples:
///   cafe-scorer --source reviews.json
///   cafe-scorer --source reviews.json --venue v1,v2 --use-model
///   cafe-scorer --source reviews.json --format json --output report.json
///   cafe-scorer --source reviews.json --dry-run
///   cafe-scorer --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// JSON export of venues and their reviews
    ///
    /// Default: from config or reviews.json
    #[arg(short, long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// JSON store holding reviews, profiles and the audit trail
    ///
    /// Default: from config or cafe_store.json
    #[arg(long, value_name = "FILE")]
    pub store: Option<PathBuf>,

    /// Venue ids to analyze (comma-separated)
    ///
    /// If not specified, every venue in the source is analyzed.
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub venue: Option<Vec<String>>,

    /// Ollama model used for summaries
    #[arg(short, long, env = "CAFE_SCORER_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Ask the model for summaries
    ///
    /// Overrides config file setting.
    #[arg(long, conflicts_with = "no_model")]
    pub use_model: bool,

    /// Always use template summaries
    ///
    /// Overrides config file setting.
    #[arg(long, conflicts_with = "use_model")]
    pub no_model: bool,

    /// Temperature for model responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Model request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// What to do when the model keeps returning invalid summaries
    #[arg(long, value_name = "POLICY")]
    pub on_model_failure: Option<FailurePolicy>,

    /// Number of venues analyzed concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .cafe-scorer.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: score venues without calling the model or writing the store
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with code 2 if any venue failed
    #[arg(long)]
    pub strict: bool,

    /// Generate a default .cafe-scorer.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref venues) = self.venue {
            if venues.iter().any(|v| v.trim().is_empty()) {
                return Err("Venue ids must not be empty".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref source) = self.source {
            if !source.is_file() {
                return Err(format!("Source file does not exist: {}", source.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the config file's `general.verbose`; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
