//! Venue analysis pipeline.
//!
//! Each venue runs fetch → ingest → aggregate → summarize → persist as one
//! sequential unit and ends with exactly one audit record, whatever the
//! outcome. A batch runs venues with bounded concurrency; a failed venue
//! never stops the others.

use crate::analysis::{aggregate, Tuning};
use crate::config::Config;
use crate::error::{PipelineError, SummaryError};
use crate::models::{AuditRecord, RunStatus, SummarySource, VenueProfile};
use crate::source::ReviewSource;
use crate::store::VenueStore;
use crate::summarizer::{build_prompt, request_verdict, FailurePolicy, Summarizer, Usage};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Pipeline knobs, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub fetch_timeout: Duration,
    pub model_timeout: Duration,
    pub max_attempts: usize,
    pub failure_policy: FailurePolicy,
    pub max_prompt_reviews: usize,
    pub cost_per_1k_tokens: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.general.concurrency.max(1),
            fetch_timeout: Duration::from_secs(config.pipeline.fetch_timeout_seconds),
            model_timeout: Duration::from_secs(config.model.timeout_seconds),
            max_attempts: config.model.max_attempts,
            failure_policy: config.model.failure_policy,
            max_prompt_reviews: config.model.max_prompt_reviews,
            cost_per_1k_tokens: config.model.cost_per_1k_tokens,
        }
    }
}

/// Everything a venue run needs, constructed once and passed down.
pub struct AnalysisContext {
    pub tuning: Tuning,
    pub source: Arc<dyn ReviewSource>,
    pub store: Arc<dyn VenueStore>,
    /// `None` selects template summaries.
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub settings: PipelineSettings,
}

/// Result of one venue run, as shown in the batch report.
#[derive(Debug, Clone, Serialize)]
pub struct VenueOutcome {
    pub venue_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_name: Option<String>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<VenueProfile>,
    pub previous_score: Option<f64>,
    pub new_reviews: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Facts gathered while a run progresses, for the audit record.
#[derive(Debug, Default)]
struct RunState {
    venue_name: Option<String>,
    total_reviews: usize,
    new_reviews: usize,
    work_related_reviews: usize,
    previous_score: Option<f64>,
    usage: Usage,
    /// Model error that was absorbed by the fallback policy.
    fallback_error: Option<String>,
}

/// Analyze one venue and append its audit record.
pub async fn analyze_venue(ctx: &AnalysisContext, venue_id: &str) -> VenueOutcome {
    let started_at = Utc::now();
    let start = Instant::now();
    let mut state = RunState::default();

    let result = run_venue(ctx, venue_id, &mut state).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let (status, profile, error) = match result {
        Ok((profile, status)) => {
            info!(
                "Scored {}: {:.1}/10 (confidence {:.2}, {} of {} reviews work-related)",
                venue_id,
                profile.work_score,
                profile.confidence,
                profile.work_related_reviews,
                profile.total_reviews
            );
            (status, Some(profile), state.fallback_error.clone())
        }
        Err(e) => {
            match e {
                PipelineError::Persist(_) => error!("Venue {} failed: {}", venue_id, e),
                _ => warn!("Venue {} skipped: {}", venue_id, e),
            }
            (e.status(), None, Some(e.to_string()))
        }
    };

    let record = AuditRecord {
        venue_id: venue_id.to_string(),
        started_at,
        total_reviews: state.total_reviews,
        new_reviews: state.new_reviews,
        work_related_reviews: state.work_related_reviews,
        previous_score: state.previous_score,
        new_score: profile.as_ref().map(|p| p.work_score),
        confidence: profile.as_ref().map(|p| p.confidence),
        cost_estimate: state.usage.cost(ctx.settings.cost_per_1k_tokens),
        duration_ms,
        status,
        error: error.clone(),
    };

    if let Err(e) = ctx.store.append_audit(record).await {
        error!("Failed to append audit record for {}: {:#}", venue_id, e);
    }

    VenueOutcome {
        venue_id: venue_id.to_string(),
        venue_name: state.venue_name,
        status,
        profile,
        previous_score: state.previous_score,
        new_reviews: state.new_reviews,
        duration_ms,
        error,
    }
}

async fn run_venue(
    ctx: &AnalysisContext,
    venue_id: &str,
    state: &mut RunState,
) -> Result<(VenueProfile, RunStatus), PipelineError> {
    let settings = &ctx.settings;

    // Step 1: fetch
    let listing = tokio::time::timeout(settings.fetch_timeout, ctx.source.fetch(venue_id))
        .await
        .map_err(|_| PipelineError::Timeout {
            stage: "review fetch",
            seconds: settings.fetch_timeout.as_secs(),
        })?
        .map_err(|e| PipelineError::Fetch {
            venue_id: venue_id.to_string(),
            message: format!("{:#}", e),
        })?;
    state.venue_name = Some(listing.venue.name.clone());

    // Step 2: ingest, then read back the full review set
    let previous = ctx
        .store
        .profile(venue_id)
        .await
        .map_err(|e| PipelineError::Persist(format!("{:#}", e)))?;
    state.previous_score = previous.as_ref().map(|p| p.work_score);

    state.new_reviews = ctx
        .store
        .ingest(&listing)
        .await
        .map_err(|e| PipelineError::Persist(format!("{:#}", e)))?;

    let reviews = ctx
        .store
        .reviews(venue_id)
        .await
        .map_err(|e| PipelineError::Persist(format!("{:#}", e)))?;
    debug!(
        "{}: {} reviews ({} new)",
        venue_id,
        reviews.len(),
        state.new_reviews
    );

    // Step 3: aggregate
    let aggregation = aggregate(&reviews, &ctx.tuning);
    let mut profile = aggregation.profile;
    state.total_reviews = profile.total_reviews;
    state.work_related_reviews = profile.work_related_reviews;
    if previous.as_ref().is_some_and(|p| p.same_scores(&profile)) {
        debug!("{}: scores unchanged since last run", venue_id);
    }

    // Step 4: model summary, only worth asking for when there is evidence
    let mut status = RunStatus::Succeeded;
    if let Some(ref summarizer) = ctx.summarizer {
        if profile.work_related_reviews > 0 {
            let prompt = build_prompt(
                &listing.venue,
                &reviews,
                &ctx.tuning,
                settings.max_prompt_reviews,
            );
            let verdict = request_verdict(
                summarizer.as_ref(),
                &prompt,
                settings.model_timeout,
                settings.max_attempts,
                &mut state.usage,
            )
            .await;

            match verdict {
                Ok(verdict) => {
                    profile.summary = verdict.summary.trim().to_string();
                    profile.summary_source = SummarySource::Model;
                }
                Err(SummaryError::Timeout(secs)) => {
                    return Err(PipelineError::Summarizer(SummaryError::Timeout(secs)));
                }
                Err(e) => match settings.failure_policy {
                    FailurePolicy::Fallback => {
                        warn!(
                            "{}: {} failed, using template summary: {}",
                            venue_id,
                            summarizer.model_name(),
                            e
                        );
                        state.fallback_error = Some(e.to_string());
                        status = RunStatus::SucceededWithFallback;
                    }
                    FailurePolicy::Fail => return Err(PipelineError::Summarizer(e)),
                },
            }
        }
    }

    // Step 5: persist profile and annotations together
    ctx.store
        .save_analysis(venue_id, &profile, &aggregation.annotations)
        .await
        .map_err(|e| PipelineError::Persist(format!("{:#}", e)))?;

    Ok((profile, status))
}

/// Analyze a batch of venues with bounded concurrency.
///
/// Outcomes are returned sorted by venue id.
pub async fn run_batch(
    ctx: &AnalysisContext,
    venue_ids: Vec<String>,
    progress: Option<&ProgressBar>,
) -> Vec<VenueOutcome> {
    info!(
        "Analyzing {} venues ({} at a time)",
        venue_ids.len(),
        ctx.settings.concurrency
    );

    let mut outcomes: Vec<VenueOutcome> = stream::iter(venue_ids)
        .map(|venue_id| async move { analyze_venue(ctx, &venue_id).await })
        .buffer_unordered(ctx.settings.concurrency.max(1))
        .inspect(|outcome| {
            if let Some(pb) = progress {
                pb.set_message(outcome.venue_id.clone());
                pb.inc(1);
            }
        })
        .collect()
        .await;

    outcomes.sort_by(|a, b| a.venue_id.cmp(&b.venue_id));
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditRecord, Review, ReviewAnnotation, Venue};
    use crate::source::{JsonFileSource, VenueListing};
    use crate::store::JsonStore;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn review(id: &str, text: &str) -> Review {
        Review {
            review_id: id.to_string(),
            author: String::new(),
            rating: 4,
            text: text.to_string(),
            timestamp: 1_700_000_000,
        }
    }

    fn listing(id: &str, texts: &[&str]) -> VenueListing {
        VenueListing {
            venue: Venue {
                venue_id: id.to_string(),
                name: format!("Cafe {}", id),
                address: String::new(),
                latitude: 0.0,
                longitude: 0.0,
                rating: Some(4.0),
            },
            reviews: texts
                .iter()
                .enumerate()
                .map(|(i, t)| review(&format!("{}-{}", id, i), t))
                .collect(),
        }
    }

    fn source() -> Arc<JsonFileSource> {
        Arc::new(JsonFileSource::from_listings(vec![
            listing(
                "good",
                &[
                    "Quiet with fast wifi and plenty of outlets, perfect for laptop work",
                    "Nice pastries",
                ],
            ),
            listing("plain", &["Nice pastries", "Lovely cake"]),
        ]))
    }

    fn context(
        source: Arc<dyn ReviewSource>,
        store: Arc<dyn VenueStore>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> AnalysisContext {
        AnalysisContext {
            tuning: Tuning::default(),
            source,
            store,
            summarizer,
            settings: PipelineSettings {
                fetch_timeout: Duration::from_millis(200),
                model_timeout: Duration::from_millis(200),
                ..PipelineSettings::default()
            },
        }
    }

    /// Always answers with the same text.
    struct FixedModel {
        response: String,
        calls: AtomicUsize,
    }

    impl FixedModel {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Summarizer for FixedModel {
        async fn complete(&self, _prompt: &str) -> Result<String, SummaryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Model that never answers in time.
    struct StalledModel;

    #[async_trait]
    impl Summarizer for StalledModel {
        async fn complete(&self, _prompt: &str) -> Result<String, SummaryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(SummaryError::Transport("unreachable".to_string()))
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    /// Never answers in time.
    struct StalledSource;

    #[async_trait]
    impl ReviewSource for StalledSource {
        async fn fetch(&self, _venue_id: &str) -> Result<VenueListing> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(anyhow!("unreachable"))
        }

        async fn venue_ids(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    /// Accepts everything except analysis writes.
    struct ReadOnlyStore(JsonStore);

    #[async_trait]
    impl VenueStore for ReadOnlyStore {
        async fn ingest(&self, listing: &VenueListing) -> Result<usize> {
            self.0.ingest(listing).await
        }

        async fn reviews(&self, venue_id: &str) -> Result<Vec<Review>> {
            self.0.reviews(venue_id).await
        }

        async fn profile(&self, venue_id: &str) -> Result<Option<VenueProfile>> {
            self.0.profile(venue_id).await
        }

        async fn save_analysis(
            &self,
            _venue_id: &str,
            _profile: &VenueProfile,
            _annotations: &[ReviewAnnotation],
        ) -> Result<()> {
            Err(anyhow!("disk full"))
        }

        async fn append_audit(&self, record: AuditRecord) -> Result<()> {
            self.0.append_audit(record).await
        }

        async fn audit_trail(&self, venue_id: Option<&str>) -> Result<Vec<AuditRecord>> {
            self.0.audit_trail(venue_id).await
        }
    }

    const VALID: &str =
        r#"```json
{"work_score": 8, "summary": "Bright, quiet and made for laptops.", "confidence": "high"}
```"#;

    #[tokio::test]
    async fn test_successful_run_persists_and_audits() {
        let store = Arc::new(JsonStore::in_memory());
        let ctx = context(source(), store.clone(), None);

        let outcome = analyze_venue(&ctx, "good").await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(outcome.new_reviews, 2);
        assert_eq!(outcome.venue_name.as_deref(), Some("Cafe good"));
        let stored = store.profile("good").await.unwrap().unwrap();
        assert_eq!(stored.work_related_reviews, 1);
        assert_eq!(stored.summary_source, SummarySource::Template);

        let audit = store.audit_trail(Some("good")).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, RunStatus::Succeeded);
        assert_eq!(audit[0].new_score, Some(stored.work_score));
        assert_eq!(audit[0].previous_score, None);
    }

    #[tokio::test]
    async fn test_rerun_ingests_nothing_new_and_keeps_scores() {
        let store = Arc::new(JsonStore::in_memory());
        let ctx = context(source(), store.clone(), None);

        let first = analyze_venue(&ctx, "good").await;
        let second = analyze_venue(&ctx, "good").await;

        assert_eq!(second.new_reviews, 0);
        assert_eq!(second.previous_score, first.profile.as_ref().map(|p| p.work_score));
        assert!(first
            .profile
            .unwrap()
            .same_scores(&second.profile.unwrap()));
        assert_eq!(store.audit_trail(Some("good")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_model_summary_is_used() {
        let store = Arc::new(JsonStore::in_memory());
        let model = FixedModel::new(VALID);
        let ctx = context(
            source(),
            store.clone(),
            Some(model.clone() as Arc<dyn Summarizer>),
        );

        let outcome = analyze_venue(&ctx, "good").await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        let profile = outcome.profile.unwrap();
        assert_eq!(profile.summary, "Bright, quiet and made for laptops.");
        assert_eq!(profile.summary_source, SummarySource::Model);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_skipped_without_evidence() {
        let store = Arc::new(JsonStore::in_memory());
        let model = FixedModel::new(VALID);
        let ctx = context(
            source(),
            store.clone(),
            Some(model.clone() as Arc<dyn Summarizer>),
        );

        let outcome = analyze_venue(&ctx, "plain").await;

        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert_eq!(outcome.profile.unwrap().confidence, 0.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_model_falls_back_to_template() {
        let store = Arc::new(JsonStore::in_memory());
        let model = FixedModel::new("I think this cafe is lovely!");
        let ctx = context(
            source(),
            store.clone(),
            Some(model.clone() as Arc<dyn Summarizer>),
        );

        let outcome = analyze_venue(&ctx, "good").await;

        assert_eq!(outcome.status, RunStatus::SucceededWithFallback);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        let profile = store.profile("good").await.unwrap().unwrap();
        assert_eq!(profile.summary_source, SummarySource::Template);

        let audit = store.audit_trail(Some("good")).await.unwrap();
        assert_eq!(audit[0].status, RunStatus::SucceededWithFallback);
        assert!(audit[0].error.is_some());
    }

    #[tokio::test]
    async fn test_fail_policy_leaves_profile_untouched() {
        let store = Arc::new(JsonStore::in_memory());
        let ctx = context(source(), store.clone(), None);
        analyze_venue(&ctx, "good").await;
        let before = store.profile("good").await.unwrap().unwrap();

        let mut strict = context(
            source(),
            store.clone(),
            Some(FixedModel::new("{\"oops\": true}") as Arc<dyn Summarizer>),
        );
        strict.settings.failure_policy = FailurePolicy::Fail;
        let outcome = analyze_venue(&strict, "good").await;

        assert_eq!(outcome.status, RunStatus::SummarizerFailed);
        assert!(outcome.profile.is_none());
        assert_eq!(store.profile("good").await.unwrap().unwrap(), before);

        let audit = store.audit_trail(Some("good")).await.unwrap();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[1].status, RunStatus::SummarizerFailed);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_audited() {
        let store = Arc::new(JsonStore::in_memory());
        let ctx = context(source(), store.clone(), None);

        let outcome = analyze_venue(&ctx, "missing").await;

        assert_eq!(outcome.status, RunStatus::FetchFailed);
        assert!(store.profile("missing").await.unwrap().is_none());
        let audit = store.audit_trail(Some("missing")).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, RunStatus::FetchFailed);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_audited() {
        let store = Arc::new(JsonStore::in_memory());
        let ctx = context(Arc::new(StalledSource), store.clone(), None);

        let outcome = analyze_venue(&ctx, "slow").await;

        assert_eq!(outcome.status, RunStatus::TimedOut);
        let audit = store.audit_trail(Some("slow")).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, RunStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_model_timeout_stores_nothing() {
        let store = Arc::new(JsonStore::in_memory());
        let ctx = context(
            source(),
            store.clone(),
            Some(Arc::new(StalledModel) as Arc<dyn Summarizer>),
        );

        let outcome = analyze_venue(&ctx, "good").await;

        assert_eq!(outcome.status, RunStatus::TimedOut);
        assert!(outcome.profile.is_none());
        assert!(store.profile("good").await.unwrap().is_none());
        let audit = store.audit_trail(Some("good")).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, RunStatus::TimedOut);
        assert!(audit[0].new_score.is_none());
    }

    #[tokio::test]
    async fn test_model_timeout_keeps_previous_profile_despite_fallback() {
        let store = Arc::new(JsonStore::in_memory());
        analyze_venue(&context(source(), store.clone(), None), "good").await;
        let before = store.profile("good").await.unwrap().unwrap();

        let mut ctx = context(
            source(),
            store.clone(),
            Some(Arc::new(StalledModel) as Arc<dyn Summarizer>),
        );
        ctx.settings.failure_policy = FailurePolicy::Fallback;
        let outcome = analyze_venue(&ctx, "good").await;

        assert_eq!(outcome.status, RunStatus::TimedOut);
        assert_eq!(store.profile("good").await.unwrap().unwrap(), before);
        assert_eq!(store.audit_trail(Some("good")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let store = Arc::new(ReadOnlyStore(JsonStore::in_memory()));
        let ctx = context(source(), store.clone(), None);

        let outcome = analyze_venue(&ctx, "good").await;

        assert_eq!(outcome.status, RunStatus::PersistFailed);
        assert!(outcome.error.unwrap().contains("disk full"));
        assert_eq!(store.audit_trail(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let store = Arc::new(JsonStore::in_memory());
        let ctx = context(source(), store.clone(), None);

        let outcomes = run_batch(
            &ctx,
            vec!["plain".to_string(), "missing".to_string(), "good".to_string()],
            None,
        )
        .await;

        let statuses: Vec<_> = outcomes
            .iter()
            .map(|o| (o.venue_id.as_str(), o.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("good", RunStatus::Succeeded),
                ("missing", RunStatus::FetchFailed),
                ("plain", RunStatus::Succeeded),
            ]
        );
        assert_eq!(store.audit_trail(None).await.unwrap().len(), 3);
    }
}
