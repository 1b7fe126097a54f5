//! In-memory store with optional JSON snapshot persistence
//!
//! All state sits behind one `RwLock`; mutations run against a copy that is
//! written to disk (temp file + rename) before it replaces the live state, so a
//! failed write leaves both memory and disk at the previous commit.

use super::{ResetSummary, SampleStore, SettingsUpdate, StatusCounts, StoreResult};
use crate::error::StoreError;
use crate::models::{Prediction, Sample, SampleStatus, SystemSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    samples: HashMap<Uuid, Sample>,
    predictions: Vec<Prediction>,
    settings: Option<SystemSettings>,
}

impl StoreState {
    fn sample_mut(&mut self, id: Uuid) -> StoreResult<&mut Sample> {
        self.samples.get_mut(&id).ok_or(StoreError::NotFound(id))
    }

    fn settings_mut(&mut self) -> StoreResult<&mut SystemSettings> {
        self.settings.as_mut().ok_or(StoreError::SettingsMissing)
    }
}

/// Store backed by process memory, optionally snapshotted to a JSON file
pub struct MemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store without persistence
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            snapshot_path: None,
        }
    }

    /// Create a store persisted to `path`, loading the existing snapshot if any
    pub fn with_snapshot(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let state = load_snapshot(&path)?;
            info!(
                path = %path.display(),
                samples = state.samples.len(),
                predictions = state.predictions.len(),
                "Loaded store snapshot"
            );
            state
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::io(format!("Failed to create data directory {:?}", parent), e)
                })?;
            }
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Apply `f` as one atomic unit
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = self.state.write().await;

        match &self.snapshot_path {
            Some(path) => {
                let mut next = state.clone();
                let out = f(&mut next)?;
                save_snapshot(path, &next)?;
                *state = next;
                Ok(out)
            }
            None => f(&mut state),
        }
    }
}

fn load_snapshot(path: &Path) -> StoreResult<StoreState> {
    let data = fs::read(path)
        .map_err(|e| StoreError::io(format!("Failed to read snapshot {:?}", path), e))?;
    Ok(serde_json::from_slice(&data)?)
}

fn save_snapshot(path: &Path, state: &StoreState) -> StoreResult<()> {
    let json = serde_json::to_vec(state)?;

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .map_err(|e| StoreError::io(format!("Failed to create {:?}", temp_path), e))?;
    file.write_all(&json)
        .map_err(|e| StoreError::io("Failed to write snapshot", e))?;
    file.sync_all()
        .map_err(|e| StoreError::io("Failed to sync snapshot", e))?;

    fs::rename(&temp_path, path).map_err(|e| {
        StoreError::io(format!("Failed to rename {:?} to {:?}", temp_path, path), e)
    })?;

    debug!(path = %path.display(), bytes = json.len(), "Store snapshot written");
    Ok(())
}

fn bump(settings: &mut SystemSettings) -> SystemSettings {
    settings.version += 1;
    settings.clone()
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn insert_sample(&self, sample: Sample) -> StoreResult<()> {
        self.mutate(|state| {
            state.samples.insert(sample.id, sample);
            Ok(())
        })
        .await
    }

    async fn get_sample(&self, id: Uuid) -> StoreResult<Option<Sample>> {
        Ok(self.state.read().await.samples.get(&id).cloned())
    }

    async fn find_one_queued_oldest(&self) -> StoreResult<Option<Sample>> {
        let state = self.state.read().await;
        Ok(state
            .samples
            .values()
            .filter(|s| s.status == SampleStatus::Queued)
            .min_by_key(|s| (s.captured_at, s.id))
            .cloned())
    }

    async fn mark_processing(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Sample> {
        self.mutate(|state| {
            let sample = state.sample_mut(id)?;
            sample
                .mark_processing(now)
                .map_err(|status| StoreError::InvalidState {
                    id,
                    status,
                    expected: SampleStatus::Queued,
                })?;
            Ok(sample.clone())
        })
        .await
    }

    async fn commit_scoring(
        &self,
        sample_id: Uuid,
        new_status: SampleStatus,
        prediction: Prediction,
    ) -> StoreResult<Sample> {
        self.mutate(|state| {
            let sample = state.sample_mut(sample_id)?;
            if sample.status != SampleStatus::Processing {
                return Err(StoreError::InvalidState {
                    id: sample_id,
                    status: sample.status,
                    expected: SampleStatus::Processing,
                });
            }
            sample.status = new_status;
            sample.processing_since = None;
            let updated = sample.clone();

            state.predictions.push(Prediction {
                sample_id,
                ..prediction
            });
            Ok(updated)
        })
        .await
    }

    async fn requeue(&self, id: Uuid) -> StoreResult<Sample> {
        self.mutate(|state| {
            let sample = state.sample_mut(id)?;
            if sample.status != SampleStatus::Processing {
                return Err(StoreError::InvalidState {
                    id,
                    status: sample.status,
                    expected: SampleStatus::Processing,
                });
            }
            sample.status = SampleStatus::Queued;
            sample.processing_since = None;
            Ok(sample.clone())
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid) -> StoreResult<Sample> {
        self.mutate(|state| {
            let sample = state.sample_mut(id)?;
            if !sample.status.is_active() {
                return Err(StoreError::InvalidState {
                    id,
                    status: sample.status,
                    expected: SampleStatus::Processing,
                });
            }
            sample.status = SampleStatus::Failed;
            sample.processing_since = None;
            Ok(sample.clone())
        })
        .await
    }

    async fn find_all_reviewed_with_label(&self) -> StoreResult<Vec<Sample>> {
        let state = self.state.read().await;
        let mut gold: Vec<Sample> = state
            .samples
            .values()
            .filter(|s| s.is_gold())
            .cloned()
            .collect();
        gold.sort_by_key(|s| s.captured_at);
        Ok(gold)
    }

    async fn find_by_status(&self, status: SampleStatus) -> StoreResult<Vec<Sample>> {
        let state = self.state.read().await;
        let mut samples: Vec<Sample> = state
            .samples
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        samples.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(samples)
    }

    async fn find_stuck_processing(&self, older_than: DateTime<Utc>) -> StoreResult<Vec<Sample>> {
        let state = self.state.read().await;
        Ok(state
            .samples
            .values()
            .filter(|s| s.status == SampleStatus::Processing)
            .filter(|s| s.processing_since.map(|t| t <= older_than).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn predictions_for(&self, sample_id: Uuid) -> StoreResult<Vec<Prediction>> {
        let state = self.state.read().await;
        let mut predictions: Vec<Prediction> = state
            .predictions
            .iter()
            .filter(|p| p.sample_id == sample_id)
            .cloned()
            .collect();
        predictions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(predictions)
    }

    async fn find_settings(&self) -> StoreResult<Option<SystemSettings>> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn ensure_settings(&self, defaults: SystemSettings) -> StoreResult<SystemSettings> {
        if let Some(existing) = self.find_settings().await? {
            return Ok(existing);
        }
        self.mutate(|state| Ok(state.settings.get_or_insert(defaults).clone()))
            .await
    }

    async fn reset_gold_counter(&self, expected_version: u64) -> StoreResult<SystemSettings> {
        self.mutate(|state| {
            let settings = state.settings_mut()?;
            if settings.version != expected_version {
                return Err(StoreError::VersionConflict {
                    expected: expected_version,
                    actual: settings.version,
                });
            }
            settings.new_gold_since_last_train = 0;
            Ok(bump(settings))
        })
        .await
    }

    async fn consume_gold(&self, count: u32) -> StoreResult<SystemSettings> {
        self.mutate(|state| {
            let settings = state.settings_mut()?;
            settings.new_gold_since_last_train =
                settings.new_gold_since_last_train.saturating_sub(count);
            Ok(bump(settings))
        })
        .await
    }

    async fn set_active_model(&self, version: &str) -> StoreResult<SystemSettings> {
        self.mutate(|state| {
            let settings = state.settings_mut()?;
            settings.active_model_version = Some(version.to_string());
            Ok(bump(settings))
        })
        .await
    }

    async fn update_settings(&self, update: SettingsUpdate) -> StoreResult<SystemSettings> {
        self.mutate(|state| {
            let settings = state.settings_mut()?;
            let mut next = settings.clone();
            update.apply_to(&mut next);
            next.validate().map_err(StoreError::InvalidSettings)?;
            *settings = next;
            Ok(bump(settings))
        })
        .await
    }

    async fn set_gold_counter(&self, value: u32) -> StoreResult<SystemSettings> {
        self.mutate(|state| {
            let settings = state.settings_mut()?;
            settings.new_gold_since_last_train = value;
            Ok(bump(settings))
        })
        .await
    }

    async fn record_review(
        &self,
        sample_id: Uuid,
        label: &str,
    ) -> StoreResult<(Sample, Option<SystemSettings>)> {
        self.mutate(|state| {
            let sample = state.sample_mut(sample_id)?;
            let first_review = match sample.status {
                SampleStatus::PendingReview | SampleStatus::Scored => true,
                SampleStatus::Reviewed => false,
                status => {
                    return Err(StoreError::InvalidState {
                        id: sample_id,
                        status,
                        expected: SampleStatus::PendingReview,
                    })
                }
            };
            sample.label = Some(label.to_string());
            sample.status = SampleStatus::Reviewed;
            let reviewed = sample.clone();

            let settings = match state.settings.as_mut() {
                Some(settings) if first_review => {
                    settings.new_gold_since_last_train += 1;
                    Some(bump(settings))
                }
                Some(settings) => Some(settings.clone()),
                None => None,
            };
            Ok((reviewed, settings))
        })
        .await
    }

    async fn status_counts(&self) -> StoreResult<StatusCounts> {
        let state = self.state.read().await;
        let mut counts = StatusCounts::default();
        for sample in state.samples.values() {
            counts.count(sample.status);
        }
        counts.predictions = state.predictions.len();
        Ok(counts)
    }

    async fn reset(&self) -> StoreResult<ResetSummary> {
        self.mutate(|state| {
            let summary = ResetSummary {
                deleted_samples: state.samples.len(),
                deleted_predictions: state.predictions.len(),
            };
            state.samples.clear();
            state.predictions.clear();
            if let Some(settings) = state.settings.as_mut() {
                settings.new_gold_since_last_train = 0;
                bump(settings);
            }
            Ok(summary)
        })
        .await
    }
}
