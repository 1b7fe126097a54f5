//! Confidence-threshold scoring policy

use crate::models::{Decision, SampleStatus, SystemSettings};

/// Result of evaluating one prediction
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub status: SampleStatus,
    pub decision: Decision,
    pub label: String,
}

/// Maps a top score to a decision using the thresholds in `settings`.
///
/// Boundaries are inclusive: a score equal to the high threshold is accepted and
/// a score equal to the low threshold is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringPolicy;

impl ScoringPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        score: f32,
        predicted_label: &str,
        settings: &SystemSettings,
    ) -> PolicyOutcome {
        let (status, decision) = if score >= settings.auto_threshold_high {
            (SampleStatus::Scored, Decision::AutoAccept)
        } else if score <= settings.auto_threshold_low {
            (SampleStatus::Scored, Decision::AutoReject)
        } else {
            (SampleStatus::PendingReview, Decision::PendingReview)
        };

        PolicyOutcome {
            status,
            decision,
            label: predicted_label.to_string(),
        }
    }
}
