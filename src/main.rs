//! cafe-scorer - work-friendliness profiles for cafes
//!
//! A CLI tool that turns scraped venue reviews into WiFi, noise, outlet,
//! seating and laptop scores, with template or model-written summaries.
//!
//! Exit codes:
//!   0 - Success (or failures present without --strict)
//!   1 - Runtime error (config, source, store, etc.)
//!   2 - At least one venue failed and --strict was set

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod report;
mod source;
mod store;
mod summarizer;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use pipeline::{AnalysisContext, PipelineSettings};
use report::{BatchReport, BatchSummary, ReportMetadata};
use source::{JsonFileSource, ReviewSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use store::{JsonStore, VenueStore};
use summarizer::{OllamaConfig, OllamaSummarizer, Summarizer};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so `general.verbose` can set the log level
    let (mut config, config_warning) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("cafe-scorer v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    if let Some(warning) = config_warning {
        warn!("{}", warning);
    }

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .cafe-scorer.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the model, thresholds, weights and vocabularies.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete batch workflow. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let source_path = PathBuf::from(&config.pipeline.source);
    let store_path = PathBuf::from(&config.pipeline.store);

    println!("📥 Loading reviews: {}", source_path.display());
    let source = Arc::new(JsonFileSource::load(&source_path)?);

    let store = if args.dry_run {
        println!("🔍 Dry run: no model calls, store left untouched");
        JsonStore::open_detached(&store_path)?
    } else {
        JsonStore::open(&store_path)?
    };
    let store = Arc::new(store);

    let summarizer = build_summarizer(&config, args.dry_run)?;
    let model_used = summarizer.as_ref().map(|s| s.model_name().to_string());

    let venue_ids: Vec<String> = match args.venue {
        Some(ref ids) => ids.iter().map(|id| id.trim().to_string()).collect(),
        None => source.venue_ids().await?,
    };
    if venue_ids.is_empty() {
        warn!("No venues to analyze in {}", source_path.display());
    }

    let ctx = AnalysisContext {
        tuning: config.tuning.clone(),
        source: source.clone() as Arc<dyn ReviewSource>,
        store: store.clone() as Arc<dyn VenueStore>,
        summarizer,
        settings: PipelineSettings::from(&config),
    };

    println!(
        "\n🔬 Analyzing {} venues ({} at a time)...",
        venue_ids.len(),
        ctx.settings.concurrency
    );

    let progress = if args.quiet {
        None
    } else {
        Some(create_progress_bar(venue_ids.len() as u64))
    };

    let outcomes = pipeline::run_batch(&ctx, venue_ids, progress.as_ref()).await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match store.audit_trail(None).await {
        Ok(trail) => debug!("Audit trail holds {} records", trail.len()),
        Err(e) => warn!("Failed to read audit trail: {:#}", e),
    }

    // Build the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let summary = BatchSummary::from_outcomes(&outcomes);

    let report = BatchReport {
        metadata: ReportMetadata {
            source: source_path.display().to_string(),
            analysis_date: Utc::now(),
            model_used,
            venues_analyzed: summary.total,
            venues_failed: summary.failed,
            duration_seconds: duration,
        },
        summary: summary.clone(),
        venues: outcomes,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = PathBuf::from(&config.general.output);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Print summary
    println!("\n📊 Batch Summary:");
    println!("   Venues: {}", summary.total);
    println!(
        "   - ✅ Succeeded: {} | 📝 Template fallback: {} | ❌ Failed: {}",
        summary.succeeded, summary.fallback, summary.failed
    );
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );

    if args.strict && summary.failed > 0 {
        eprintln!(
            "\n⛔ {} venue(s) failed. Failing (exit code 2).",
            summary.failed
        );
        return Ok(2);
    }

    Ok(0)
}

/// Build the model summarizer when enabled and not in a dry run.
fn build_summarizer(config: &Config, dry_run: bool) -> Result<Option<Arc<dyn Summarizer>>> {
    if !config.model.enabled || dry_run {
        debug!("Using template summaries");
        return Ok(None);
    }

    println!("🤖 Model summaries enabled");
    println!("   Model: {}", config.model.name);
    println!("   Ollama: {}", config.model.ollama_url);
    println!("   Timeout: {}s", config.model.timeout_seconds);

    let client: Arc<dyn Summarizer> = Arc::new(OllamaSummarizer::new(OllamaConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: config.model.name.clone(),
        temperature: config.model.temperature,
        timeout_seconds: config.model.timeout_seconds,
    })?);

    Ok(Some(client))
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is initialized, so a default config that fails to
/// parse is returned as a warning to log afterwards.
fn load_config(args: &Args) -> Result<(Config, Option<String>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, None));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, None)),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => Ok((
            Config::default(),
            Some(format!("Failed to load config, using defaults: {:#}", e)),
        )),
    }
}
