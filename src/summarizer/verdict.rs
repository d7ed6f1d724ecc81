//! Prompt building and response validation for model summaries.
//!
//! The model is asked for a JSON verdict. Responses are unwrapped from code
//! fences, parsed, and checked against the schema; a schema violation is
//! retried before the caller's failure policy takes over.

use crate::analysis::{is_work_related, Tuning};
use crate::error::SummaryError;
use crate::models::{Review, Venue};
use crate::summarizer::Summarizer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Structured verdict expected from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVerdict {
    /// Overall work score (0-10).
    pub work_score: f64,
    #[serde(default)]
    pub wifi: Option<f64>,
    #[serde(default)]
    pub noise: Option<f64>,
    #[serde(default)]
    pub outlets: Option<f64>,
    #[serde(default)]
    pub seating: Option<f64>,
    #[serde(default)]
    pub laptop: Option<f64>,
    /// One-sentence summary.
    pub summary: String,
    /// "low", "medium" or "high".
    pub confidence: String,
}

impl ModelVerdict {
    fn validate(&self) -> Result<(), SummaryError> {
        if !(0.0..=10.0).contains(&self.work_score) {
            return Err(SummaryError::Schema(format!(
                "work_score {} outside 0-10",
                self.work_score
            )));
        }

        let subscores = [
            ("wifi", self.wifi),
            ("noise", self.noise),
            ("outlets", self.outlets),
            ("seating", self.seating),
            ("laptop", self.laptop),
        ];
        for (name, value) in subscores {
            if let Some(v) = value {
                if !(1.0..=10.0).contains(&v) {
                    return Err(SummaryError::Schema(format!("{} {} outside 1-10", name, v)));
                }
            }
        }

        if self.summary.trim().is_empty() {
            return Err(SummaryError::Schema("summary is empty".to_string()));
        }

        match self.confidence.to_lowercase().as_str() {
            "low" | "medium" | "high" => Ok(()),
            other => Err(SummaryError::Schema(format!(
                "unknown confidence label '{}'",
                other
            ))),
        }
    }
}

/// Characters sent and received, for cost estimation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub prompt_chars: usize,
    pub response_chars: usize,
    pub attempts: usize,
}

impl Usage {
    /// Rough cost assuming four characters per token.
    pub fn cost(&self, cost_per_1k_tokens: f64) -> f64 {
        let tokens = (self.prompt_chars + self.response_chars) as f64 / 4.0;
        tokens / 1000.0 * cost_per_1k_tokens
    }
}

/// Strip markdown code fences and surrounding chatter from a JSON reply.
pub fn strip_code_fences(response: &str) -> &str {
    let mut text = response.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the language tag line, e.g. ```json
        text = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
        text = text.trim();
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parse and validate a raw model reply.
pub fn parse_verdict(response: &str) -> Result<ModelVerdict, SummaryError> {
    let json = strip_code_fences(response);
    let verdict: ModelVerdict =
        serde_json::from_str(json).map_err(|e| SummaryError::Schema(e.to_string()))?;
    verdict.validate()?;
    Ok(verdict)
}

/// Build the summary prompt for a venue.
///
/// Work-related reviews are listed first so they survive the review cap.
pub fn build_prompt(
    venue: &Venue,
    reviews: &[Review],
    tuning: &Tuning,
    max_reviews: usize,
) -> String {
    let (mut selected, rest): (Vec<&Review>, Vec<&Review>) = reviews
        .iter()
        .partition(|r| is_work_related(&r.text, tuning));
    selected.extend(rest);
    selected.truncate(max_reviews);

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Judge how good \"{}\" ({}) is for remote work based on these reviews.\n\n",
        venue.name, venue.address
    ));
    prompt.push_str("Respond with exactly this JSON format:\n");
    prompt.push_str(
        r#"{"work_score": 7.5, "wifi": 8, "noise": 3, "outlets": 6, "seating": 7, "laptop": 8, "summary": "One sentence about working here.", "confidence": "medium"}"#,
    );
    prompt.push_str(
        "\n\nwork_score is 0-10. Sub-scores are 1-10 (noise: 10 is loudest) and may be null when the reviews say nothing. confidence is low, medium or high.\n\n",
    );
    prompt.push_str("=== REVIEWS ===\n\n");

    for review in selected {
        let text = review.text.replace('\n', " ");
        prompt.push_str(&format!("- [{}/5] {}\n", review.rating, text.trim()));
    }

    prompt.push_str("\n=== END OF REVIEWS ===\n\nNow output the JSON verdict:");
    prompt
}

/// Ask the model for a verdict, retrying schema violations.
///
/// Each attempt is bounded by `timeout`. Transport errors and
/// timeouts are returned immediately; only malformed responses are retried,
/// up to `max_attempts` in total.
pub async fn request_verdict(
    summarizer: &dyn Summarizer,
    prompt: &str,
    timeout: Duration,
    max_attempts: usize,
    usage: &mut Usage,
) -> Result<ModelVerdict, SummaryError> {
    let attempts = max_attempts.max(1);
    let mut last_error = SummaryError::Schema("no attempts made".to_string());

    for attempt in 1..=attempts {
        usage.attempts += 1;
        usage.prompt_chars += prompt.len();

        let response = tokio::time::timeout(timeout, summarizer.complete(prompt))
            .await
            .map_err(|_| SummaryError::Timeout(timeout.as_secs()))??;

        usage.response_chars += response.len();

        match parse_verdict(&response) {
            Ok(verdict) => {
                debug!("Model verdict accepted on attempt {}", attempt);
                return Ok(verdict);
            }
            Err(e) => {
                warn!(
                    "Model response rejected (attempt {}/{}): {}",
                    attempt, attempts, e
                );
                last_error = e;
            }
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses in order.
    struct Scripted {
        responses: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(responses: &[&str]) -> Self {
            let mut responses: Vec<String> = responses.iter().map(|s| s.to_string()).collect();
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl Summarizer for Scripted {
        async fn complete(&self, _prompt: &str) -> Result<String, SummaryError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| SummaryError::Transport("script exhausted".to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    const VALID: &str = r#"{"work_score": 7.5, "wifi": 8, "noise": null, "summary": "Solid laptop spot.", "confidence": "medium"}"#;

    fn venue() -> Venue {
        Venue {
            venue_id: "v1".to_string(),
            name: "Bean There".to_string(),
            address: "1 Main St".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            rating: Some(4.5),
        }
    }

    fn review(id: &str, text: &str) -> Review {
        Review {
            review_id: id.to_string(),
            author: String::new(),
            rating: 4,
            text: text.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_strip_code_fences() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"a\": 1}");

        let bare_fence = "```\n{\"a\": 1}\n```\n";
        assert_eq!(strip_code_fences(bare_fence), "{\"a\": 1}");

        let chatter = "Sure! Here it is: {\"a\": 1} Hope that helps.";
        assert_eq!(strip_code_fences(chatter), "{\"a\": 1}");

        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_valid_verdict() {
        let verdict = parse_verdict(&format!("```json\n{}\n```", VALID)).unwrap();
        assert_eq!(verdict.work_score, 7.5);
        assert_eq!(verdict.wifi, Some(8.0));
        assert_eq!(verdict.noise, None);
        assert_eq!(verdict.summary, "Solid laptop spot.");
    }

    #[test]
    fn test_parse_rejects_schema_violations() {
        assert!(matches!(
            parse_verdict("not json at all"),
            Err(SummaryError::Schema(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"work_score": 12, "summary": "x", "confidence": "low"}"#),
            Err(SummaryError::Schema(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"work_score": 5, "summary": "  ", "confidence": "low"}"#),
            Err(SummaryError::Schema(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"work_score": 5, "summary": "ok", "confidence": "certain"}"#),
            Err(SummaryError::Schema(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"work_score": 5, "wifi": 0, "summary": "ok", "confidence": "low"}"#),
            Err(SummaryError::Schema(_))
        ));
    }

    #[test]
    fn test_prompt_lists_work_reviews_first() {
        let reviews = vec![
            review("a", "Nice pastries"),
            review("b", "Fast wifi and quiet, great for laptop work"),
        ];
        let prompt = build_prompt(&venue(), &reviews, &Tuning::default(), 1);

        assert!(prompt.contains("Bean There"));
        assert!(prompt.contains("Fast wifi"));
        assert!(!prompt.contains("Nice pastries"));
        assert!(prompt.contains("\"confidence\""));
    }

    #[tokio::test]
    async fn test_retry_once_then_accept() {
        let model = Scripted::new(&["garbage", VALID]);
        let mut usage = Usage::default();
        let verdict = request_verdict(&model, "prompt", TIMEOUT, 2, &mut usage)
            .await
            .unwrap();

        assert_eq!(verdict.summary, "Solid laptop spot.");
        assert_eq!(usage.attempts, 2);
        assert_eq!(usage.prompt_chars, 12);
    }

    #[tokio::test]
    async fn test_two_violations_fail() {
        let model = Scripted::new(&["garbage", "```json\n{}\n```", VALID]);
        let mut usage = Usage::default();
        let result = request_verdict(&model, "prompt", TIMEOUT, 2, &mut usage).await;

        assert!(matches!(result, Err(SummaryError::Schema(_))));
        assert_eq!(usage.attempts, 2);
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let model = Scripted::new(&[]);
        let mut usage = Usage::default();
        let result = request_verdict(&model, "prompt", TIMEOUT, 2, &mut usage).await;

        assert!(matches!(result, Err(SummaryError::Transport(_))));
        assert_eq!(usage.attempts, 1);
    }

    #[test]
    fn test_usage_cost() {
        let usage = Usage {
            prompt_chars: 3000,
            response_chars: 1000,
            attempts: 1,
        };
        assert!((usage.cost(0.5) - 0.5).abs() < 1e-12);
        assert_eq!(usage.cost(0.0), 0.0);
    }
}
