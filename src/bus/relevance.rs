use chrono::{Duration, Utc};

use super::types::{context_mentions_element, AgentMessage, RecipientContext};

/// Score how relevant `message` is to a recipient, in `[0.0, 1.0]`.
///
/// Base 0.5, then +0.2 element match, +0.2 known pattern, +0.1 high urgency,
/// +0.15 same subject, +0.1 younger than 24h. A message without a timestamp
/// counts as fresh.
pub fn relevance_score(message: &AgentMessage, recipient: &RecipientContext) -> f64 {
    let mut score = 0.5;

    if let Some(element) = recipient.element.as_deref() {
        if context_mentions_element(&message.context, element) {
            score += 0.2;
        }
    }

    if let Some(pattern_id) = message.context_str("pattern_id") {
        if recipient.patterns.iter().any(|p| p == pattern_id) {
            score += 0.2;
        }
    }

    if message.context_str("urgency") == Some("high") {
        score += 0.1;
    }

    if let (Some(theirs), Some(ours)) = (message.context_str("subject_id"), recipient.subject_id.as_deref()) {
        if theirs == ours {
            score += 0.15;
        }
    }

    let fresh = message
        .timestamp
        .map_or(true, |ts| Utc::now() - ts < Duration::hours(24));
    if fresh {
        score += 0.1;
    }

    f64::clamp(score, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::types::MessageKind;

    fn message() -> AgentMessage {
        AgentMessage::new("FireAgent", "WaterAgent", MessageKind::Wisdom, "stay with the feeling")
    }

    #[test]
    fn fresh_message_with_no_overlap_scores_base_plus_recency() {
        let score = relevance_score(&message(), &RecipientContext::default());
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn stale_message_gets_no_recency_bonus() {
        let msg = message().with_timestamp(Utc::now() - Duration::hours(25));
        let score = relevance_score(&msg, &RecipientContext::default());
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_never_count_as_matches() {
        // Neither side names an element or subject.
        let recipient = RecipientContext {
            element: None,
            patterns: vec![],
            subject_id: None,
        };
        let msg = message().with_timestamp(Utc::now() - Duration::days(3));
        assert!((relevance_score(&msg, &recipient) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn element_and_subject_bonuses_stack() {
        let msg = message()
            .with_context("element", "water")
            .with_context("subject_id", "user-1");
        let recipient = RecipientContext {
            element: Some("water".into()),
            patterns: vec![],
            subject_id: Some("user-1".into()),
        };
        let score = relevance_score(&msg, &recipient);
        assert!((score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_when_every_bonus_matches() {
        let msg = message()
            .with_context("element", "water")
            .with_context("pattern_id", "p-1")
            .with_context("urgency", "high")
            .with_context("subject_id", "user-1");
        let recipient = RecipientContext {
            element: Some("water".into()),
            patterns: vec!["p-1".into()],
            subject_id: Some("user-1".into()),
        };
        let score = relevance_score(&msg, &recipient);
        assert_eq!(score, 1.0);
    }
}
