//! Deterministic template summaries.
//!
//! Picks a lead phrase by work-score bracket and appends the categorical
//! attributes, so the same profile always reads the same way.

use crate::models::VenueProfile;

/// Lead phrases by minimum work score, highest bracket first.
const SCORE_BRACKETS: [(f64, &str); 4] = [
    (7.5, "Excellent spot for remote work"),
    (5.5, "Decent place to get some work done"),
    (3.5, "Workable for a short session"),
    (f64::NEG_INFINITY, "Better suited to a coffee break than a work session"),
];

const NO_EVIDENCE: &str = "Not enough work-related reviews to judge this spot yet.";

/// Build the one-sentence template summary for a profile.
pub fn template_summary(profile: &VenueProfile) -> String {
    if profile.work_related_reviews == 0 {
        return NO_EVIDENCE.to_string();
    }

    let lead = SCORE_BRACKETS
        .iter()
        .find(|(min, _)| profile.work_score >= *min)
        .map(|(_, phrase)| *phrase)
        .unwrap_or(SCORE_BRACKETS[SCORE_BRACKETS.len() - 1].1);

    let mut extras = Vec::new();
    if profile.good_for_focus {
        extras.push("good for deep focus");
    } else if profile.good_for_calls {
        extras.push("calm enough for calls");
    }

    let mut summary = format!(
        "{}: {} WiFi, {} noise, laptops {}",
        lead, profile.wifi_speed, profile.noise_level, profile.laptop_policy
    );
    for extra in extras {
        summary.push_str(", ");
        summary.push_str(extra);
    }
    summary.push('.');
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::aggregate;
    use crate::analysis::tuning::Tuning;
    use crate::models::Review;

    fn review(text: &str) -> Review {
        Review {
            review_id: "r1".to_string(),
            author: String::new(),
            rating: 5,
            text: text.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_no_evidence_summary() {
        let result = aggregate(&[], &Tuning::default());
        assert_eq!(result.profile.summary, NO_EVIDENCE);
    }

    #[test]
    fn test_summary_mentions_categoricals() {
        let result = aggregate(
            &[review("Fast wifi, great for laptop work")],
            &Tuning::default(),
        );
        let summary = template_summary(&result.profile);
        assert!(summary.contains("fast WiFi"));
        assert!(summary.contains("moderate noise"));
        assert!(summary.ends_with('.'));
    }

    #[test]
    fn test_summary_is_stable() {
        let result = aggregate(
            &[review("Quiet, fast wifi and plenty of outlets for laptop work")],
            &Tuning::default(),
        );
        assert_eq!(
            template_summary(&result.profile),
            template_summary(&result.profile)
        );
        assert!(result.profile.summary.starts_with("Excellent spot"));
    }
}
