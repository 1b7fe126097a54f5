//! Centroid model trainer

use super::features::extract_histogram;
use super::registry::ModelRegistry;
use super::{CentroidModel, ModelTrainer, SkipReason, TrainOutcome};
use crate::error::TrainerError;
use crate::models::{Sample, LABEL_NO_POLLEN, LABEL_POLLEN};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Minimum number of gold images present on disk before training
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// Configuration for the trainer
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub min_samples: usize,
    /// Softmax temperature stored in trained models
    pub temperature: f32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_TRAINING_SAMPLES,
            temperature: 0.05,
        }
    }
}

/// Trains a [`CentroidModel`] and publishes it through the registry
pub struct CentroidTrainer {
    registry: Arc<ModelRegistry>,
    config: TrainerConfig,
}

impl CentroidTrainer {
    pub fn new(registry: Arc<ModelRegistry>, config: TrainerConfig) -> Self {
        Self { registry, config }
    }

    fn next_version() -> String {
        format!("v{}", chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f"))
    }
}

#[async_trait]
impl ModelTrainer for CentroidTrainer {
    async fn train(&self, gold_samples: &[Sample]) -> Result<TrainOutcome, TrainerError> {
        let label_count =
            |wanted: &str| gold_samples.iter().filter(|s| s.label.as_deref() == Some(wanted)).count();
        let pollen = label_count(LABEL_POLLEN);
        let no_pollen = label_count(LABEL_NO_POLLEN);

        info!(
            pollen = pollen,
            no_pollen = no_pollen,
            total = gold_samples.len(),
            "Starting model training"
        );

        if pollen == 0 || no_pollen == 0 {
            warn!("Training skipped, one of the classes has no samples");
            return Ok(TrainOutcome::Skipped(SkipReason::InsufficientClassData));
        }

        let valid: Vec<(String, PathBuf)> = gold_samples
            .iter()
            .filter_map(|s| {
                let label = s.label.clone()?;
                let path = PathBuf::from(&s.image_path);
                path.exists().then_some((label, path))
            })
            .collect();

        if valid.len() < self.config.min_samples {
            warn!(
                valid = valid.len(),
                required = self.config.min_samples,
                "Training skipped, too few images on disk"
            );
            return Ok(TrainOutcome::Skipped(SkipReason::InsufficientClassData));
        }

        let start = Instant::now();
        let version = Self::next_version();
        let temperature = self.config.temperature;
        let fit_version = version.clone();

        let model = tokio::task::spawn_blocking(move || {
            let examples: Vec<(String, Vec<f32>)> = valid
                .into_iter()
                .filter_map(|(label, path)| match extract_histogram(Path::new(&path)) {
                    Ok(features) => Some((label, features)),
                    Err(e) => {
                        warn!(error = %e, "Skipping training image");
                        None
                    }
                })
                .collect();
            CentroidModel::fit(fit_version, &examples, temperature)
        })
        .await
        .map_err(|e| TrainerError::Join(e.to_string()))?;

        let Some(model) = model else {
            warn!("Training failed, no usable features extracted");
            return Ok(TrainOutcome::Skipped(SkipReason::TrainingFailed));
        };

        if model.labels.len() < 2 {
            warn!(labels = ?model.labels, "Training failed, fewer than two classes survived feature extraction");
            return Ok(TrainOutcome::Skipped(SkipReason::TrainingFailed));
        }

        let bytes = match serde_json::to_vec(&model) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize model");
                return Ok(TrainOutcome::Skipped(SkipReason::SaveFailed));
            }
        };

        let saved = match self.registry.save(&version, &bytes).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Failed to save model");
                return Ok(TrainOutcome::Skipped(SkipReason::SaveFailed));
            }
        };

        info!(
            version = %saved.version,
            trained_on = model.trained_on,
            elapsed_ms = start.elapsed().as_millis(),
            "Model training completed"
        );

        Ok(TrainOutcome::Trained(saved))
    }

    fn model_exists(&self) -> bool {
        self.registry.model_exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CentroidClassifier, ImageClassifier, ModelRegistryConfig};
    use crate::models::SampleStatus;
    use chrono::Utc;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use uuid::Uuid;

    struct Fixture {
        temp_dir: TempDir,
        registry: Arc<ModelRegistry>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let registry = Arc::new(
                ModelRegistry::new(ModelRegistryConfig {
                    model_dir: temp_dir.path().join("models"),
                    ..Default::default()
                })
                .unwrap(),
            );
            Self { temp_dir, registry }
        }

        fn gold(&self, name: &str, label: &str, colour: [u8; 3]) -> Sample {
            let path = self.temp_dir.path().join(format!("{}.png", name));
            RgbImage::from_pixel(8, 8, Rgb(colour)).save(&path).unwrap();
            self.gold_at(path.to_str().unwrap(), label)
        }

        fn gold_at(&self, path: &str, label: &str) -> Sample {
            let mut sample = Sample::queued(Uuid::new_v4(), path, Utc::now());
            sample.status = SampleStatus::Reviewed;
            sample.label = Some(label.to_string());
            sample
        }

        fn balanced(&self, per_class: usize) -> Vec<Sample> {
            let mut samples = Vec::new();
            for i in 0..per_class {
                samples.push(self.gold(&format!("p{}", i), LABEL_POLLEN, [250, 200, 10]));
                samples.push(self.gold(&format!("n{}", i), LABEL_NO_POLLEN, [90, 90, 90]));
            }
            samples
        }
    }

    #[tokio::test]
    async fn test_skips_when_class_missing() {
        let fixture = Fixture::new();
        let trainer = CentroidTrainer::new(fixture.registry.clone(), TrainerConfig::default());
        let samples: Vec<Sample> = (0..12)
            .map(|i| fixture.gold(&format!("p{}", i), LABEL_POLLEN, [250, 200, 10]))
            .collect();

        let outcome = trainer.train(&samples).await.unwrap();
        assert!(matches!(
            outcome,
            TrainOutcome::Skipped(SkipReason::InsufficientClassData)
        ));
        assert!(!trainer.model_exists());
    }

    #[tokio::test]
    async fn test_skips_when_images_missing_on_disk() {
        let fixture = Fixture::new();
        let trainer = CentroidTrainer::new(fixture.registry.clone(), TrainerConfig::default());
        let mut samples = fixture.balanced(2);
        for i in 0..10 {
            samples.push(fixture.gold_at(&format!("/gone/{}.png", i), LABEL_POLLEN));
        }

        let outcome = trainer.train(&samples).await.unwrap();
        assert!(matches!(
            outcome,
            TrainOutcome::Skipped(SkipReason::InsufficientClassData)
        ));
    }

    #[tokio::test]
    async fn test_trains_and_publishes() {
        let fixture = Fixture::new();
        let trainer = CentroidTrainer::new(fixture.registry.clone(), TrainerConfig::default());
        let classifier = CentroidClassifier::new(fixture.registry.subscribe());
        let samples = fixture.balanced(6);

        let outcome = trainer.train(&samples).await.unwrap();
        let version = match outcome {
            TrainOutcome::Trained(version) => version,
            other => panic!("expected a trained model, got {:?}", other),
        };
        assert!(version.version.starts_with('v'));
        assert!(trainer.model_exists());

        let probe = fixture.gold("probe", LABEL_POLLEN, [255, 210, 0]);
        let scores = classifier.predict(&probe.image_path).await.unwrap();
        assert_eq!(classifier.model_version(), Some(version.version));
        assert!(scores[LABEL_POLLEN] > scores[LABEL_NO_POLLEN]);
    }

    #[tokio::test]
    async fn test_undecodable_class_fails_training() {
        let fixture = Fixture::new();
        let trainer = CentroidTrainer::new(fixture.registry.clone(), TrainerConfig::default());
        let mut samples: Vec<Sample> = (0..10)
            .map(|i| fixture.gold(&format!("p{}", i), LABEL_POLLEN, [250, 200, 10]))
            .collect();
        let broken = fixture.temp_dir.path().join("broken.png");
        std::fs::write(&broken, b"not an image").unwrap();
        samples.push(fixture.gold_at(broken.to_str().unwrap(), LABEL_NO_POLLEN));

        let outcome = trainer.train(&samples).await.unwrap();
        assert!(matches!(
            outcome,
            TrainOutcome::Skipped(SkipReason::TrainingFailed)
        ));
    }
}
