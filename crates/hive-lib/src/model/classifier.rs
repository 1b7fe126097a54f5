//! Centroid classifier with hot model reload

use super::features::extract_histogram;
use super::registry::ModelVersion;
use super::{CentroidModel, ImageClassifier, LabelScores};
use crate::error::ClassifierError;
use crate::models::LABEL_UNKNOWN;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Classifier that follows the model registry's update channel.
///
/// `refresh` (also run at the start of every `predict`) checks the channel and
/// swaps in a newly published model, so retraining takes effect without
/// restarting the process.
pub struct CentroidClassifier {
    model: RwLock<Option<Arc<CentroidModel>>>,
    updates: Mutex<watch::Receiver<Option<ModelVersion>>>,
}

impl CentroidClassifier {
    /// Create a classifier and load the model currently announced on `updates`
    pub fn new(mut updates: watch::Receiver<Option<ModelVersion>>) -> Self {
        let initial = updates.borrow_and_update().clone();
        let model = initial.and_then(|v| match load_model(&v) {
            Ok(model) => Some(Arc::new(model)),
            Err(e) => {
                error!(version = %v.version, error = %e, "Failed to load model");
                None
            }
        });

        if model.is_none() {
            warn!("No trained model yet, predictions return a placeholder until the first training run");
        }

        Self {
            model: RwLock::new(model),
            updates: Mutex::new(updates),
        }
    }

    fn loaded(&self) -> Option<Arc<CentroidModel>> {
        self.model.read().ok().and_then(|m| m.clone())
    }
}

fn load_model(version: &ModelVersion) -> Result<CentroidModel, ClassifierError> {
    let bytes = std::fs::read(&version.path).map_err(|e| {
        ClassifierError::Model(format!("Failed to read {:?}: {}", version.path, e))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ClassifierError::Model(format!("Failed to parse model: {}", e)))
}

fn placeholder() -> LabelScores {
    LabelScores::from([(LABEL_UNKNOWN.to_string(), 0.0)])
}

#[async_trait]
impl ImageClassifier for CentroidClassifier {
    async fn predict(&self, image_path: &str) -> Result<LabelScores, ClassifierError> {
        self.refresh().await;

        let Some(model) = self.loaded() else {
            debug!(image = %image_path, "Prediction skipped, no trained model");
            return Ok(placeholder());
        };

        let path = PathBuf::from(image_path);
        let features = tokio::task::spawn_blocking(move || extract_histogram(&path))
            .await
            .map_err(|e| ClassifierError::Model(format!("Feature extraction aborted: {}", e)))??;

        let scores = model.scores(&features);
        debug!(
            image = %image_path,
            version = %model.version,
            scores = ?scores,
            "Prediction completed"
        );
        Ok(scores)
    }

    async fn refresh(&self) {
        let mut updates = self.updates.lock().await;
        if !updates.has_changed().unwrap_or(false) {
            return;
        }

        let Some(version) = updates.borrow_and_update().clone() else {
            return;
        };

        match load_model(&version) {
            Ok(model) => {
                info!(
                    event = "model_reloaded",
                    version = %model.version,
                    labels = ?model.labels,
                    "Classifier switched to new model"
                );
                if let Ok(mut current) = self.model.write() {
                    *current = Some(Arc::new(model));
                }
            }
            Err(e) => {
                warn!(
                    version = %version.version,
                    error = %e,
                    "Failed to load new model, keeping previous version"
                );
            }
        }
    }

    fn has_model(&self) -> bool {
        self.loaded().is_some()
    }

    fn model_version(&self) -> Option<String> {
        self.loaded().map(|m| m.version.clone())
    }
}
