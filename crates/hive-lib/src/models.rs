//! Core data models for the hive agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Label assigned to images that show pollen on the bee
pub const LABEL_POLLEN: &str = "Pollen";

/// Label assigned to images without pollen
pub const LABEL_NO_POLLEN: &str = "NoPollen";

/// Placeholder label returned by a classifier with no usable model
pub const LABEL_UNKNOWN: &str = "Unknown";

/// Kind of question a sample is meant to answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Pollen,
    Health,
}

/// Lifecycle status of a sample
///
/// `Queued -> Processing -> {Scored | PendingReview}`, `PendingReview -> Reviewed`
/// by a human, and `Failed` from any active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Queued,
    Processing,
    Scored,
    PendingReview,
    Reviewed,
    Failed,
}

impl SampleStatus {
    /// Statuses a sample can still leave through normal flow
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SampleStatus::Queued | SampleStatus::Processing | SampleStatus::PendingReview
        )
    }
}

impl fmt::Display for SampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleStatus::Queued => write!(f, "queued"),
            SampleStatus::Processing => write!(f, "processing"),
            SampleStatus::Scored => write!(f, "scored"),
            SampleStatus::PendingReview => write!(f, "pending_review"),
            SampleStatus::Reviewed => write!(f, "reviewed"),
            SampleStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of the scoring policy for one prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoAccept,
    AutoReject,
    PendingReview,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::AutoAccept => write!(f, "auto_accept"),
            Decision::AutoReject => write!(f, "auto_reject"),
            Decision::PendingReview => write!(f, "pending_review"),
        }
    }
}

/// One hive-camera image and its lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: Uuid,
    pub hive_id: Uuid,
    pub image_path: String,
    pub captured_at: DateTime<Utc>,
    pub label: Option<String>,
    pub task_type: TaskType,
    pub status: SampleStatus,
    /// Set when the sample was claimed for scoring
    #[serde(default)]
    pub processing_since: Option<DateTime<Utc>>,
}

impl Sample {
    /// Create a new queued sample
    pub fn queued(hive_id: Uuid, image_path: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hive_id,
            image_path: image_path.into(),
            captured_at,
            label: None,
            task_type: TaskType::Pollen,
            status: SampleStatus::Queued,
            processing_since: None,
        }
    }

    /// Claim the sample for scoring. Only a queued sample can be claimed.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> Result<(), SampleStatus> {
        if self.status != SampleStatus::Queued {
            return Err(self.status);
        }
        self.status = SampleStatus::Processing;
        self.processing_since = Some(now);
        Ok(())
    }

    /// A reviewed sample with a non-empty label is training data
    pub fn is_gold(&self) -> bool {
        self.status == SampleStatus::Reviewed
            && self.label.as_deref().map(|l| !l.is_empty()).unwrap_or(false)
    }
}

/// Immutable record of one scoring event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub model_version: Option<String>,
    pub score: f32,
    pub predicted_label: String,
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
}

/// Process-wide singleton settings and retraining state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub new_gold_since_last_train: u32,
    pub retrain_gold_threshold: u32,
    pub auto_threshold_high: f32,
    pub auto_threshold_low: f32,
    pub is_retrain_enabled: bool,
    pub active_model_version: Option<String>,
    /// Bumped on every mutation, used for optimistic concurrency
    #[serde(default)]
    pub version: u64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            new_gold_since_last_train: 0,
            retrain_gold_threshold: 50,
            auto_threshold_high: 0.90,
            auto_threshold_low: 0.15,
            is_retrain_enabled: true,
            active_model_version: None,
            version: 0,
        }
    }
}

impl SystemSettings {
    /// Whether the retrain agent would train on its next cycle
    pub fn retrain_due(&self) -> bool {
        self.is_retrain_enabled && self.new_gold_since_last_train >= self.retrain_gold_threshold
    }

    /// Thresholds must satisfy `0 <= low < high <= 1`
    pub fn validate(&self) -> Result<(), String> {
        let (low, high) = (self.auto_threshold_low, self.auto_threshold_high);
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) {
            return Err(format!("thresholds must lie in [0, 1], got low={} high={}", low, high));
        }
        if low >= high {
            return Err(format!("low threshold {} must be below high threshold {}", low, high));
        }
        Ok(())
    }
}
