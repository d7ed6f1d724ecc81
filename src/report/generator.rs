//! Batch report generation.
//!
//! Renders the outcomes of a batch run as Markdown or JSON.

use crate::models::{AttributeKind, RunStatus, VenueProfile};
use crate::pipeline::VenueOutcome;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metadata about the batch run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub source: String,
    pub analysis_date: DateTime<Utc>,
    /// Model used for summaries, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub venues_analyzed: usize,
    pub venues_failed: usize,
    pub duration_seconds: f64,
}

/// Counts of venue runs by status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub fallback: usize,
    pub failed: usize,
    pub by_status: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[VenueOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            if !outcome.status.is_success() {
                summary.failed += 1;
            } else if outcome.status == RunStatus::SucceededWithFallback {
                summary.fallback += 1;
            } else {
                summary.succeeded += 1;
            }
            *summary
                .by_status
                .entry(outcome.status.to_string())
                .or_insert(0) += 1;
        }

        summary
    }
}

/// The complete batch report.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub metadata: ReportMetadata,
    pub summary: BatchSummary,
    pub venues: Vec<VenueOutcome>,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &BatchReport) -> String {
    let mut output = String::new();

    output.push_str("# Cafe Work Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.summary, &report.venues));
    output.push_str(&generate_venues_section(&report.venues));
    output.push_str("---\n\n*Report generated by cafe-scorer*\n");

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match metadata.model_used {
        Some(ref model) => section.push_str(&format!("- **Summaries:** model `{}`\n", model)),
        None => section.push_str("- **Summaries:** template\n"),
    }
    section.push_str(&format!(
        "- **Venues Analyzed:** {}\n",
        metadata.venues_analyzed
    ));
    if metadata.venues_failed > 0 {
        section.push_str(&format!("- **Venues Failed:** {}\n", metadata.venues_failed));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_summary_section(summary: &BatchSummary, venues: &[VenueOutcome]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Venue | Status | Work Score | Change | Confidence |\n");
    section.push_str("|:---|:---|:---:|:---:|:---:|\n");

    let mut ranked: Vec<&VenueOutcome> = venues.iter().collect();
    ranked.sort_by(|a, b| {
        let score = |o: &VenueOutcome| o.profile.as_ref().map(|p| p.work_score).unwrap_or(-1.0);
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for outcome in ranked {
        let name = outcome.venue_name.as_deref().unwrap_or(&outcome.venue_id);
        let (score, confidence) = match outcome.profile {
            Some(ref p) => (format!("{:.1}", p.work_score), format!("{:.2}", p.confidence)),
            None => ("-".to_string(), "-".to_string()),
        };
        section.push_str(&format!(
            "| {} | {} {} | {} | {} | {} |\n",
            name,
            outcome.status.emoji(),
            outcome.status,
            score,
            score_change(outcome),
            confidence
        ));
    }
    section.push('\n');

    section.push_str(&format!(
        "**{}** venues: {} succeeded, {} with template fallback, {} failed.\n\n",
        summary.total, summary.succeeded, summary.fallback, summary.failed
    ));

    section
}

fn score_change(outcome: &VenueOutcome) -> String {
    match (outcome.previous_score, outcome.profile.as_ref()) {
        (Some(prev), Some(p)) => format!("{:+.1}", p.work_score - prev),
        (None, Some(_)) => "new".to_string(),
        _ => "-".to_string(),
    }
}

fn generate_venues_section(venues: &[VenueOutcome]) -> String {
    let mut section = String::new();

    section.push_str("## Venues\n\n");

    for outcome in venues {
        let name = outcome.venue_name.as_deref().unwrap_or(&outcome.venue_id);
        section.push_str(&format!("### {}\n\n", name));

        match outcome.profile {
            Some(ref profile) => section.push_str(&generate_profile_block(profile)),
            None => section.push_str(&format!(
                "> {} **{}**: {}\n\n",
                outcome.status.emoji(),
                outcome.status,
                outcome.error.as_deref().unwrap_or("no details")
            )),
        }

        if outcome.status == RunStatus::SucceededWithFallback {
            if let Some(ref error) = outcome.error {
                section.push_str(&format!("> Model summary rejected: {}\n\n", error));
            }
        }
    }

    section
}

/// Generate the block describing one venue profile.
fn generate_profile_block(profile: &VenueProfile) -> String {
    let mut block = String::new();

    block.push_str(&format!("{}\n\n", profile.summary));
    block.push_str(&format!(
        "- **Work Score:** {:.1}/10 (confidence {:.2}, {} of {} reviews work-related)\n",
        profile.work_score,
        profile.confidence,
        profile.work_related_reviews,
        profile.total_reviews
    ));
    block.push_str(&format!(
        "- **WiFi:** {} | **Noise:** {} | **Laptops:** {}\n",
        profile.wifi_speed, profile.noise_level, profile.laptop_policy
    ));
    block.push_str(&format!(
        "- **Good for calls:** {} | **Good for focus:** {}\n",
        yes_no(profile.good_for_calls),
        yes_no(profile.good_for_focus)
    ));
    let averages: Vec<String> = AttributeKind::ALL
        .iter()
        .map(|kind| format!("{} {:.1}", kind, profile.averages.get(*kind)))
        .collect();
    block.push_str(&format!("- **Averages:** {}\n", averages.join(", ")));
    block.push_str(&format!("- **Sentiment:** {:+.2}\n", profile.sentiment));
    if !profile.tags.is_empty() {
        block.push_str(&format!("- **Tags:** {}\n", profile.tags.join(", ")));
    }
    block.push('\n');

    block
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &BatchReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
