//! Shared fixtures for the end-to-end tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hive_lib::{
    ClassifierError, ImageClassifier, LabelScores, MemoryStore, ModelTrainer, ModelVersion,
    Sample, SampleStatus, SampleStore, SystemSettings, TrainOutcome, TrainerError,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Classifier that always reports one label at a fixed score
pub struct FixedClassifier {
    label: String,
    score: f32,
}

impl FixedClassifier {
    pub fn new(label: &str, score: f32) -> Self {
        Self {
            label: label.to_string(),
            score,
        }
    }
}

#[async_trait]
impl ImageClassifier for FixedClassifier {
    async fn predict(&self, _image_path: &str) -> Result<LabelScores, ClassifierError> {
        Ok(LabelScores::from([(self.label.clone(), self.score)]))
    }

    fn has_model(&self) -> bool {
        true
    }

    fn model_version(&self) -> Option<String> {
        Some("v-fixed".to_string())
    }
}

/// Trainer that succeeds and remembers the batch size of each call
#[derive(Default)]
pub struct RecordingTrainer {
    calls: AtomicUsize,
    batches: Mutex<Vec<usize>>,
}

impl RecordingTrainer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelTrainer for RecordingTrainer {
    async fn train(&self, gold_samples: &[Sample]) -> Result<TrainOutcome, TrainerError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.batches.lock().unwrap().push(gold_samples.len());
        let version = format!("v{}", n);
        Ok(TrainOutcome::Trained(ModelVersion {
            path: PathBuf::from(format!("/models/model_{}.json", version)),
            version,
            checksum: String::new(),
            size_bytes: 0,
            saved_at: 0,
        }))
    }

    fn model_exists(&self) -> bool {
        self.calls() > 0
    }
}

pub async fn store_with(settings: SystemSettings) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.ensure_settings(settings).await.unwrap();
    store
}

pub async fn queue(store: &MemoryStore, captured_at: DateTime<Utc>) -> Sample {
    let sample = Sample::queued(Uuid::new_v4(), "/hive/cam-01/frame.jpg", captured_at);
    store.insert_sample(sample.clone()).await.unwrap();
    sample
}

pub async fn add_reviewed(store: &MemoryStore, label: &str, count: usize) {
    for _ in 0..count {
        let mut sample = Sample::queued(Uuid::new_v4(), "/hive/cam-01/gold.jpg", Utc::now());
        sample.status = SampleStatus::Reviewed;
        sample.label = Some(label.to_string());
        store.insert_sample(sample).await.unwrap();
    }
}
