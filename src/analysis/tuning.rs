//! Tuning table for review aggregation.
//!
//! Every vocabulary list, cue decision table, threshold and weight used by
//! the aggregator lives here. The table is serializable so it can be tuned
//! from the `[tuning]` section of `.cafe-scorer.toml` without touching the
//! algorithm.

use crate::models::AttributeKind;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Root tuning table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Distinct vocabulary matches needed for a review to be work-related.
    pub relevance_threshold: usize,
    /// Work-related review count at which confidence reaches 1.0.
    pub confidence_normalization: f64,
    /// Characters kept on each side of a match in evidence snippets.
    pub snippet_radius: usize,
    /// Bytes on each side of a cue searched for refining terms.
    pub cue_radius: usize,
    /// Work-relevance vocabulary (lowercase substrings).
    pub work_vocabulary: Vec<String>,
    /// Phrases counted as positive sentiment.
    pub positive_phrases: Vec<String>,
    /// Phrases counted as negative sentiment.
    pub negative_phrases: Vec<String>,
    pub thresholds: Thresholds,
    pub weights: ScoreWeights,
    /// One rule set per attribute kind.
    pub attributes: Vec<AttributeRules>,
    /// Tags appended in order when their condition holds.
    pub tag_rules: Vec<TagRule>,
}

/// Cue terms and decision table for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRules {
    pub kind: AttributeKind,
    /// Score when a cue is present but no rule matches.
    pub default_score: f64,
    /// Average used when no review produced a value.
    pub baseline: f64,
    /// Fixed confidence weight attached to every extracted score.
    pub confidence: f64,
    /// Terms whose presence triggers extraction.
    pub cues: Vec<String>,
    /// Refining rules, first match wins.
    pub rules: Vec<CueRule>,
}

/// A refining rule: any of `terms` present assigns `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueRule {
    pub terms: Vec<String>,
    pub score: f64,
}

/// Categorical and boolean thresholds (1-10 scale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub wifi_fast: f64,
    pub wifi_adequate: f64,
    pub noise_quiet: f64,
    pub noise_moderate: f64,
    pub laptop_encouraged: f64,
    pub laptop_allowed: f64,
    /// Noise average must be below this to be good for calls.
    pub calls_max_noise: f64,
    /// Noise average must be below this to be good for focus.
    pub focus_max_noise: f64,
    /// WiFi average must be above this to be good for focus.
    pub focus_min_wifi: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            wifi_fast: 7.0,
            wifi_adequate: 4.0,
            noise_quiet: 3.0,
            noise_moderate: 7.0,
            laptop_encouraged: 7.0,
            laptop_allowed: 4.0,
            calls_max_noise: 5.0,
            focus_max_noise: 4.0,
            focus_min_wifi: 6.0,
        }
    }
}

/// Linear weights of the overall work score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub wifi: f64,
    /// Applied to the inverted noise average.
    pub noise: f64,
    pub outlets: f64,
    pub seating: f64,
    pub laptop: f64,
    /// Noise is inverted as `noise_inversion_base - noise`.
    pub noise_inversion_base: f64,
    /// Multiplier mapping the weighted sum into the output range.
    pub scale: f64,
    pub max_score: f64,
    /// Work score reported when there is no work-related evidence.
    pub default_work_score: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            wifi: 0.30,
            noise: 0.20,
            outlets: 0.20,
            seating: 0.10,
            laptop: 0.20,
            noise_inversion_base: 10.0,
            scale: 1.0,
            max_score: 10.0,
            default_work_score: 5.0,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.wifi + self.noise + self.outlets + self.seating + self.laptop
    }
}

/// Value a tag rule is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMetric {
    Wifi,
    Noise,
    Outlets,
    Seating,
    Laptop,
    WorkScore,
    Sentiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    AtLeast,
    AtMost,
}

/// Appends `tag` when `metric` compares true against `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub metric: TagMetric,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl TagRule {
    pub fn matches(&self, value: f64) -> bool {
        match self.comparison {
            Comparison::AtLeast => value >= self.threshold,
            Comparison::AtMost => value <= self.threshold,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn rule(terms: &[&str], score: f64) -> CueRule {
    CueRule {
        terms: strings(terms),
        score,
    }
}

fn tag(tag: &str, metric: TagMetric, comparison: Comparison, threshold: f64) -> TagRule {
    TagRule {
        tag: tag.to_string(),
        metric,
        comparison,
        threshold,
    }
}

fn default_attributes() -> Vec<AttributeRules> {
    vec![
        AttributeRules {
            kind: AttributeKind::Wifi,
            default_score: 5.0,
            baseline: 5.0,
            confidence: 0.8,
            cues: strings(&["wifi", "wi-fi", "internet", "connection"]),
            rules: vec![
                rule(&["slow", "spotty", "unreliable", "weak", "no wifi", "drops"], 2.0),
                rule(&["fast", "reliable", "strong", "quick", "great wifi"], 9.0),
            ],
        },
        AttributeRules {
            kind: AttributeKind::Noise,
            default_score: 5.0,
            baseline: 5.0,
            confidence: 0.7,
            cues: strings(&[
                "quiet", "loud", "noise", "noisy", "calm", "peaceful", "music", "busy",
            ]),
            rules: vec![
                rule(&["loud", "noisy", "busy", "crowded", "blasting"], 8.0),
                rule(&["quiet", "calm", "peaceful", "silent"], 2.0),
            ],
        },
        AttributeRules {
            kind: AttributeKind::Outlets,
            default_score: 5.0,
            baseline: 5.0,
            confidence: 0.8,
            cues: strings(&["outlet", "power", "plug", "socket", "charging", "charger"]),
            rules: vec![
                rule(
                    &["no outlet", "no power", "no plug", "few outlet", "lack of outlet"],
                    2.0,
                ),
                rule(&["plenty", "lots of", "many", "every table", "available"], 9.0),
            ],
        },
        AttributeRules {
            kind: AttributeKind::Seating,
            default_score: 5.0,
            baseline: 5.0,
            confidence: 0.6,
            cues: strings(&["seating", "seats", "chair", "desk", "couch", "sofa", "bench"]),
            rules: vec![
                rule(
                    &[
                        "uncomfortable",
                        "cramped",
                        "hard chair",
                        "limited seating",
                        "no seating",
                    ],
                    3.0,
                ),
                rule(
                    &["comfortable", "comfy", "spacious", "plenty of seating", "big table"],
                    8.0,
                ),
            ],
        },
        AttributeRules {
            kind: AttributeKind::Laptop,
            default_score: 5.0,
            baseline: 5.0,
            confidence: 0.7,
            cues: strings(&["laptop", "work", "computer", "remote", "study", "productive"]),
            rules: vec![
                rule(
                    &[
                        "no laptop",
                        "laptops not allowed",
                        "laptop-free",
                        "no computers",
                        "time limit",
                    ],
                    2.0,
                ),
                rule(
                    &[
                        "laptop friendly",
                        "laptop-friendly",
                        "great for work",
                        "great for laptop",
                        "perfect for work",
                        "work from",
                        "remote work",
                        "productive",
                    ],
                    9.0,
                ),
            ],
        },
    ]
}

fn default_tag_rules() -> Vec<TagRule> {
    vec![
        tag("fast-wifi", TagMetric::Wifi, Comparison::AtLeast, 7.0),
        tag("quiet", TagMetric::Noise, Comparison::AtMost, 3.0),
        tag("plenty-of-outlets", TagMetric::Outlets, Comparison::AtLeast, 7.0),
        tag("comfortable-seating", TagMetric::Seating, Comparison::AtLeast, 7.0),
        tag("laptop-friendly", TagMetric::Laptop, Comparison::AtLeast, 7.0),
        tag("great-for-work", TagMetric::WorkScore, Comparison::AtLeast, 7.5),
        tag("well-loved", TagMetric::Sentiment, Comparison::AtLeast, 0.5),
    ]
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            relevance_threshold: 2,
            confidence_normalization: 10.0,
            snippet_radius: 40,
            cue_radius: 20,
            work_vocabulary: strings(&[
                "wifi",
                "wi-fi",
                "internet",
                "laptop",
                "outlet",
                "power",
                "plug",
                "charging",
                "quiet",
                "loud",
                "noise",
                "noisy",
                "focus",
                "meeting",
                "work",
                "study",
                "remote",
                "productive",
                "seating",
                "desk",
                "computer",
                "zoom",
            ]),
            positive_phrases: strings(&[
                "great",
                "love",
                "amazing",
                "excellent",
                "perfect",
                "nice",
                "cozy",
                "friendly",
                "recommend",
                "best",
                "good",
            ]),
            negative_phrases: strings(&[
                "bad",
                "terrible",
                "awful",
                "rude",
                "dirty",
                "worst",
                "overpriced",
                "disappoint",
                "slow",
                "loud",
            ]),
            thresholds: Thresholds::default(),
            weights: ScoreWeights::default(),
            attributes: default_attributes(),
            tag_rules: default_tag_rules(),
        }
    }
}

impl Tuning {
    /// Returns the rule set for an attribute kind.
    pub fn rules_for(&self, kind: AttributeKind) -> Option<&AttributeRules> {
        self.attributes.iter().find(|r| r.kind == kind)
    }

    /// Baseline average for an attribute kind (mid-scale when unconfigured).
    pub fn baseline(&self, kind: AttributeKind) -> f64 {
        self.rules_for(kind).map(|r| r.baseline).unwrap_or(5.0)
    }

    /// Check the table for inconsistencies that would make results meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.relevance_threshold == 0 {
            bail!("tuning.relevance_threshold must be at least 1");
        }
        if self.confidence_normalization <= 0.0 {
            bail!("tuning.confidence_normalization must be positive");
        }

        let t = &self.thresholds;
        if t.wifi_adequate > t.wifi_fast {
            bail!("tuning.thresholds: wifi_adequate must not exceed wifi_fast");
        }
        if t.noise_quiet > t.noise_moderate {
            bail!("tuning.thresholds: noise_quiet must not exceed noise_moderate");
        }
        if t.laptop_allowed > t.laptop_encouraged {
            bail!("tuning.thresholds: laptop_allowed must not exceed laptop_encouraged");
        }

        let w = &self.weights;
        if [w.wifi, w.noise, w.outlets, w.seating, w.laptop]
            .iter()
            .any(|v| *v < 0.0)
        {
            bail!("tuning.weights must be non-negative");
        }
        if w.sum() <= 0.0 {
            bail!("tuning.weights must not all be zero");
        }
        if w.max_score <= 0.0 {
            bail!("tuning.weights.max_score must be positive");
        }

        for kind in AttributeKind::ALL {
            let count = self.attributes.iter().filter(|r| r.kind == kind).count();
            if count != 1 {
                bail!(
                    "tuning.attributes must define {} exactly once (found {})",
                    kind,
                    count
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuning_is_valid() {
        assert!(Tuning::default().validate().is_ok());
    }

    #[test]
    fn test_weights_sum_to_one() {
        let weights = ScoreWeights::default();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_vocabulary_terms_do_not_overlap() {
        // One mention must never count as two distinct terms.
        let vocab = Tuning::default().work_vocabulary;
        for a in &vocab {
            for b in &vocab {
                if a != b {
                    assert!(!a.contains(b.as_str()), "{} contains {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_every_kind_has_rules() {
        let tuning = Tuning::default();
        for kind in AttributeKind::ALL {
            assert!(tuning.rules_for(kind).is_some());
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_kind() {
        let mut tuning = Tuning::default();
        let wifi = tuning.attributes[0].clone();
        tuning.attributes.push(wifi);
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_all_zero_weights() {
        let mut tuning = Tuning::default();
        tuning.weights.wifi = 0.0;
        tuning.weights.noise = 0.0;
        tuning.weights.outlets = 0.0;
        tuning.weights.seating = 0.0;
        tuning.weights.laptop = 0.0;
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut tuning = Tuning::default();
        tuning.thresholds.wifi_adequate = 8.0;
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_tag_rule_comparison() {
        let at_least = tag("x", TagMetric::Wifi, Comparison::AtLeast, 7.0);
        assert!(at_least.matches(7.0));
        assert!(!at_least.matches(6.99));

        let at_most = tag("y", TagMetric::Noise, Comparison::AtMost, 3.0);
        assert!(at_most.matches(3.0));
        assert!(!at_most.matches(3.01));
    }

    #[test]
    fn test_partial_tuning_from_toml() {
        let tuning: Tuning = toml::from_str(
            r#"
relevance_threshold = 3

[weights]
scale = 10.0
max_score = 100.0
"#,
        )
        .unwrap();
        assert_eq!(tuning.relevance_threshold, 3);
        assert_eq!(tuning.weights.scale, 10.0);
        assert_eq!(tuning.weights.wifi, 0.30);
        assert_eq!(tuning.work_vocabulary, Tuning::default().work_vocabulary);
    }
}
