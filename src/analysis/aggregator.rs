//! Review aggregation.
//!
//! Turns a venue's reviews into a work-friendliness profile:
//!
//! 1. Relevance filter: a review is work-related when it mentions enough
//!    distinct vocabulary terms.
//! 2. Extraction: work-related reviews are scanned for attribute cues and
//!    scored through each attribute's decision table.
//! 3. Sentiment: positive and negative phrases are counted over all reviews.
//! 4. Aggregation: per-attribute means are mapped to categoricals, the work
//!    score, booleans, tags and a confidence.
//!
//! Everything here is a pure function of the reviews and the [`Tuning`]
//! table, so re-running on an unchanged review set yields identical scores.

use crate::analysis::summary::template_summary;
use crate::analysis::tuning::{AttributeRules, TagMetric, Thresholds, Tuning};
use crate::models::{
    AttributeAverages, AttributeKind, AttributeScore, LaptopPolicy, NoiseLevel, Review,
    ReviewAnnotation, SummarySource, VenueProfile, WifiSpeed,
};
use chrono::Utc;

/// Result of aggregating one venue's reviews.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub profile: VenueProfile,
    /// One annotation per input review, in input order.
    pub annotations: Vec<ReviewAnnotation>,
}

/// Distinct vocabulary terms contained in already-lowercased text.
pub fn matched_terms(text: &str, vocabulary: &[String]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for term in vocabulary {
        if text.contains(term.as_str()) && !found.contains(term) {
            found.push(term.clone());
        }
    }
    found
}

/// Returns true if the review text clears the relevance threshold.
pub fn is_work_related(text: &str, tuning: &Tuning) -> bool {
    matched_terms(&text.to_lowercase(), &tuning.work_vocabulary).len()
        >= tuning.relevance_threshold
}

/// Count how many of `phrases` occur in already-lowercased text.
fn count_phrases(text: &str, phrases: &[String]) -> usize {
    phrases.iter().filter(|p| text.contains(p.as_str())).count()
}

/// Sentiment from phrase counts, clamped to [-1, 1].
pub fn sentiment_score(positive: usize, negative: usize) -> f64 {
    let diff = positive as f64 - negative as f64;
    let total = (positive + negative).max(1) as f64;
    (diff / total).clamp(-1.0, 1.0)
}

/// Byte range of `radius` bytes around a match, widened to char boundaries.
fn window_around(text: &str, start: usize, len: usize, radius: usize) -> (usize, usize) {
    let mut lo = start.saturating_sub(radius);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (start + len + radius).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    (lo, hi)
}

/// Cut a snippet of `radius` bytes around a match, respecting char boundaries.
fn snippet_around(text: &str, start: usize, len: usize, radius: usize) -> String {
    let (lo, hi) = window_around(text, start, len, radius);
    text[lo..hi].trim().to_string()
}

/// First occurrence of any term: (byte offset, term length).
fn find_any(text: &str, terms: &[String]) -> Option<(usize, usize)> {
    terms
        .iter()
        .find_map(|term| text.find(term.as_str()).map(|idx| (idx, term.len())))
}

/// Score one attribute from lowercased text, or `None` if no cue is present.
///
/// Refining terms only count within `cue_radius` bytes of a cue, so a
/// complaint about something else later in the review does not score it.
fn extract_attribute(
    text: &str,
    rules: &AttributeRules,
    cue_radius: usize,
    snippet_radius: usize,
) -> Option<AttributeScore> {
    let mut cues: Vec<(usize, usize)> = rules
        .cues
        .iter()
        .filter_map(|cue| text.find(cue.as_str()).map(|idx| (idx, cue.len())))
        .collect();
    cues.sort_unstable();
    let (cue_at, cue_len) = *cues.first()?;

    let windows: Vec<(usize, usize)> = cues
        .iter()
        .map(|&(at, len)| window_around(text, at, len, cue_radius))
        .collect();

    // Rule order still decides: the first rule with a term near any cue wins.
    let refined = rules.rules.iter().find_map(|rule| {
        windows.iter().find_map(|&(lo, hi)| {
            find_any(&text[lo..hi], &rule.terms).map(|(at, len)| (rule.score, (lo + at, len)))
        })
    });

    let (score, (at, len)) = refined.unwrap_or((rules.default_score, (cue_at, cue_len)));

    Some(AttributeScore {
        kind: rules.kind,
        score,
        confidence: rules.confidence,
        evidence: snippet_around(text, at, len, snippet_radius),
    })
}

/// Extract every attribute with a cue present in the text.
pub fn extract_attributes(text: &str, tuning: &Tuning) -> Vec<AttributeScore> {
    let lower = text.to_lowercase();
    AttributeKind::ALL
        .iter()
        .filter_map(|kind| tuning.rules_for(*kind))
        .filter_map(|rules| {
            extract_attribute(&lower, rules, tuning.cue_radius, tuning.snippet_radius)
        })
        .collect()
}

struct ReviewAnalysis {
    annotation: ReviewAnnotation,
    positive: usize,
    negative: usize,
}

fn analyze_review(review: &Review, tuning: &Tuning) -> ReviewAnalysis {
    let lower = review.text.to_lowercase();

    // Step 1: relevance
    let terms = matched_terms(&lower, &tuning.work_vocabulary);
    let work_related = terms.len() >= tuning.relevance_threshold;

    // Step 2: extraction, work-related reviews only
    let attributes = if work_related {
        extract_attributes(&review.text, tuning)
    } else {
        Vec::new()
    };

    // Step 3: sentiment, all reviews
    let positive = count_phrases(&lower, &tuning.positive_phrases);
    let negative = count_phrases(&lower, &tuning.negative_phrases);

    ReviewAnalysis {
        annotation: ReviewAnnotation {
            review_id: review.review_id.clone(),
            work_related,
            matched_terms: terms,
            sentiment: sentiment_score(positive, negative),
            attributes,
        },
        positive,
        negative,
    }
}

pub fn wifi_speed(average: f64, thresholds: &Thresholds) -> WifiSpeed {
    match average {
        a if a >= thresholds.wifi_fast => WifiSpeed::Fast,
        a if a >= thresholds.wifi_adequate => WifiSpeed::Adequate,
        _ => WifiSpeed::Slow,
    }
}

pub fn noise_level(average: f64, thresholds: &Thresholds) -> NoiseLevel {
    match average {
        a if a <= thresholds.noise_quiet => NoiseLevel::Quiet,
        a if a <= thresholds.noise_moderate => NoiseLevel::Moderate,
        _ => NoiseLevel::Loud,
    }
}

pub fn laptop_policy(average: f64, thresholds: &Thresholds) -> LaptopPolicy {
    match average {
        a if a >= thresholds.laptop_encouraged => LaptopPolicy::Encouraged,
        a if a >= thresholds.laptop_allowed => LaptopPolicy::Allowed,
        _ => LaptopPolicy::Discouraged,
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Weighted work score in `[0, max_score]`, rounded to one decimal.
pub fn work_score(averages: &AttributeAverages, tuning: &Tuning) -> f64 {
    let w = &tuning.weights;
    let raw = w.wifi * averages.wifi
        + w.noise * (w.noise_inversion_base - averages.noise)
        + w.outlets * averages.outlets
        + w.seating * averages.seating
        + w.laptop * averages.laptop;
    round_one_decimal((raw * w.scale).clamp(0.0, w.max_score))
}

fn baseline_averages(tuning: &Tuning) -> AttributeAverages {
    AttributeAverages {
        wifi: tuning.baseline(AttributeKind::Wifi),
        noise: tuning.baseline(AttributeKind::Noise),
        outlets: tuning.baseline(AttributeKind::Outlets),
        seating: tuning.baseline(AttributeKind::Seating),
        laptop: tuning.baseline(AttributeKind::Laptop),
    }
}

fn tags_for(
    averages: &AttributeAverages,
    work_score: f64,
    sentiment: f64,
    tuning: &Tuning,
) -> Vec<String> {
    tuning
        .tag_rules
        .iter()
        .filter(|rule| {
            let value = match rule.metric {
                TagMetric::Wifi => averages.wifi,
                TagMetric::Noise => averages.noise,
                TagMetric::Outlets => averages.outlets,
                TagMetric::Seating => averages.seating,
                TagMetric::Laptop => averages.laptop,
                TagMetric::WorkScore => work_score,
                TagMetric::Sentiment => sentiment,
            };
            rule.matches(value)
        })
        .map(|rule| rule.tag.clone())
        .collect()
}

/// The profile reported when there is no work-related evidence.
///
/// Attributes sit at their baselines, confidence is zero and no tags are
/// derived.
pub fn default_profile(tuning: &Tuning, total_reviews: usize, sentiment: f64) -> VenueProfile {
    let averages = baseline_averages(tuning);
    let t = &tuning.thresholds;

    let mut profile = VenueProfile {
        wifi_speed: wifi_speed(averages.wifi, t),
        noise_level: noise_level(averages.noise, t),
        laptop_policy: laptop_policy(averages.laptop, t),
        good_for_calls: false,
        good_for_focus: false,
        work_score: tuning.weights.default_work_score,
        averages,
        sentiment,
        summary: String::new(),
        summary_source: SummarySource::Template,
        tags: Vec::new(),
        confidence: 0.0,
        work_related_reviews: 0,
        total_reviews,
        analyzed_at: Utc::now(),
    };
    profile.summary = template_summary(&profile);
    profile
}

/// Aggregate a venue's reviews into a profile and per-review annotations.
///
/// An empty review set yields the default profile rather than an error.
pub fn aggregate(reviews: &[Review], tuning: &Tuning) -> Aggregation {
    let analyses: Vec<ReviewAnalysis> =
        reviews.iter().map(|r| analyze_review(r, tuning)).collect();

    let positive: usize = analyses.iter().map(|a| a.positive).sum();
    let negative: usize = analyses.iter().map(|a| a.negative).sum();
    let sentiment = sentiment_score(positive, negative);

    let annotations: Vec<ReviewAnnotation> = analyses.into_iter().map(|a| a.annotation).collect();
    let work_related = annotations.iter().filter(|a| a.work_related).count();

    if work_related == 0 {
        return Aggregation {
            profile: default_profile(tuning, reviews.len(), sentiment),
            annotations,
        };
    }

    // Step 4: per-attribute means, baseline when no review spoke to it
    let mut averages = baseline_averages(tuning);
    for kind in AttributeKind::ALL {
        let samples: Vec<f64> = annotations
            .iter()
            .filter_map(|a| a.attribute(kind))
            .map(|s| s.score)
            .collect();
        if !samples.is_empty() {
            averages.set(kind, samples.iter().sum::<f64>() / samples.len() as f64);
        }
    }

    let t = &tuning.thresholds;
    let score = work_score(&averages, tuning);

    let mut profile = VenueProfile {
        wifi_speed: wifi_speed(averages.wifi, t),
        noise_level: noise_level(averages.noise, t),
        laptop_policy: laptop_policy(averages.laptop, t),
        good_for_calls: averages.noise < t.calls_max_noise,
        good_for_focus: averages.noise < t.focus_max_noise && averages.wifi > t.focus_min_wifi,
        work_score: score,
        averages,
        sentiment,
        summary: String::new(),
        summary_source: SummarySource::Template,
        tags: tags_for(&averages, score, sentiment, tuning),
        confidence: (work_related as f64 / tuning.confidence_normalization).min(1.0),
        work_related_reviews: work_related,
        total_reviews: reviews.len(),
        analyzed_at: Utc::now(),
    };
    profile.summary = template_summary(&profile);

    Aggregation {
        profile,
        annotations,
    }
}
