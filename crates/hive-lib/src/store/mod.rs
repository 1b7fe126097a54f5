//! Shared state store consumed by both agents
//!
//! Every operation is atomic on its own: a store applies it under a single
//! write guard or transaction, so per-sample transitions and settings
//! read-modify-writes cannot interleave with another caller.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{Prediction, Sample, SampleStatus, SystemSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Number of samples per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub scored: usize,
    pub pending_review: usize,
    pub reviewed: usize,
    pub failed: usize,
    pub predictions: usize,
}

impl StatusCounts {
    pub fn count(&mut self, status: SampleStatus) {
        self.total += 1;
        match status {
            SampleStatus::Queued => self.queued += 1,
            SampleStatus::Processing => self.processing += 1,
            SampleStatus::Scored => self.scored += 1,
            SampleStatus::PendingReview => self.pending_review += 1,
            SampleStatus::Reviewed => self.reviewed += 1,
            SampleStatus::Failed => self.failed += 1,
        }
    }
}

/// Outcome of an administrative reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub deleted_samples: usize,
    pub deleted_predictions: usize,
}

/// Partial update of the tunable settings; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub auto_threshold_high: Option<f32>,
    pub auto_threshold_low: Option<f32>,
    pub retrain_gold_threshold: Option<u32>,
    pub is_retrain_enabled: Option<bool>,
}

impl SettingsUpdate {
    pub fn apply_to(&self, settings: &mut SystemSettings) {
        if let Some(high) = self.auto_threshold_high {
            settings.auto_threshold_high = high;
        }
        if let Some(low) = self.auto_threshold_low {
            settings.auto_threshold_low = low;
        }
        if let Some(threshold) = self.retrain_gold_threshold {
            settings.retrain_gold_threshold = threshold;
        }
        if let Some(enabled) = self.is_retrain_enabled {
            settings.is_retrain_enabled = enabled;
        }
    }
}

/// Transactional store for samples, predictions and the settings singleton
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Add a new sample (ingestion boundary)
    async fn insert_sample(&self, sample: Sample) -> StoreResult<()>;

    async fn get_sample(&self, id: Uuid) -> StoreResult<Option<Sample>>;

    /// Oldest queued sample by capture time
    async fn find_one_queued_oldest(&self) -> StoreResult<Option<Sample>>;

    /// Conditional `Queued -> Processing` transition.
    ///
    /// Fails with `InvalidState` when the sample is in any other status, so two
    /// callers racing for the same sample cannot both win.
    async fn mark_processing(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Sample>;

    /// Persist a prediction and the sample's new status as one unit.
    /// The sample must be `Processing`.
    async fn commit_scoring(
        &self,
        sample_id: Uuid,
        new_status: SampleStatus,
        prediction: Prediction,
    ) -> StoreResult<Sample>;

    /// Release a claim: `Processing -> Queued`, so the sample is scored again
    async fn requeue(&self, id: Uuid) -> StoreResult<Sample>;

    /// Move an active sample to `Failed`
    async fn mark_failed(&self, id: Uuid) -> StoreResult<Sample>;

    /// Gold training set: reviewed samples with a non-empty label
    async fn find_all_reviewed_with_label(&self) -> StoreResult<Vec<Sample>>;

    /// Samples newest first
    async fn find_by_status(&self, status: SampleStatus) -> StoreResult<Vec<Sample>>;

    /// Samples claimed at or before `older_than` that never left `Processing`
    async fn find_stuck_processing(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<Sample>>;

    /// Predictions for one sample, newest first
    async fn predictions_for(&self, sample_id: Uuid) -> StoreResult<Vec<Prediction>>;

    async fn find_settings(&self) -> StoreResult<Option<SystemSettings>>;

    /// Create the settings singleton if absent and return the stored value
    async fn ensure_settings(&self, defaults: SystemSettings) -> StoreResult<SystemSettings>;

    /// Set the gold counter to zero if the settings are still at `expected_version`
    async fn reset_gold_counter(&self, expected_version: u64) -> StoreResult<SystemSettings>;

    /// Subtract `count` from the gold counter, saturating at zero
    async fn consume_gold(&self, count: u32) -> StoreResult<SystemSettings>;

    async fn set_active_model(&self, version: &str) -> StoreResult<SystemSettings>;

    /// Change thresholds or the retrain switch. The result must still satisfy
    /// `0 <= low < high <= 1`, otherwise nothing is written.
    async fn update_settings(&self, update: SettingsUpdate) -> StoreResult<SystemSettings>;

    /// Administrative override of the gold counter
    async fn set_gold_counter(&self, value: u32) -> StoreResult<SystemSettings>;

    /// Human review: label the sample, mark it `Reviewed` and count it as new
    /// gold in the same unit. Relabelling an already reviewed sample does not
    /// count again.
    async fn record_review(
        &self,
        sample_id: Uuid,
        label: &str,
    ) -> StoreResult<(Sample, Option<SystemSettings>)>;

    async fn status_counts(&self) -> StoreResult<StatusCounts>;

    /// Delete every sample and prediction and zero the gold counter
    async fn reset(&self) -> StoreResult<ResetSummary>;
}
