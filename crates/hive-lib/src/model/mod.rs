//! Image classification model: contracts and a colour-histogram implementation
//!
//! The agents only see [`ImageClassifier`] and [`ModelTrainer`]. The concrete
//! pair shipped here trains per-label centroids over colour histograms, saves
//! them through the [`ModelRegistry`] and hot-swaps them into the classifier
//! via a watch channel.

mod centroid;
mod classifier;
mod features;
mod registry;
mod trainer;

pub use centroid::CentroidModel;
pub use classifier::CentroidClassifier;
pub use features::{extract_histogram, histogram_from_image, BINS_PER_CHANNEL, FEATURE_LEN};
pub use registry::{ModelRegistry, ModelRegistryConfig, ModelVersion};
pub use trainer::{CentroidTrainer, TrainerConfig, MIN_TRAINING_SAMPLES};

use crate::error::{ClassifierError, TrainerError};
use crate::models::Sample;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// Label to probability mapping returned by a classifier
pub type LabelScores = HashMap<String, f32>;

/// Trait for image classifier implementations
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Classify the image at `image_path`.
    ///
    /// Without a usable model this returns a placeholder mapping
    /// (`{"Unknown": 0.0}`) instead of failing.
    async fn predict(&self, image_path: &str) -> Result<LabelScores, ClassifierError>;

    /// Pick up a model published since the last call.
    ///
    /// Called before `has_model` is consulted, so a classifier that started
    /// without a model notices the first one even when nothing is predicted.
    async fn refresh(&self) {}

    /// Whether a trained model is loaded
    fn has_model(&self) -> bool;

    /// Version tag of the loaded model
    fn model_version(&self) -> Option<String>;
}

/// Why a training run was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A class is missing or too few images exist on disk
    InsufficientClassData,
    TrainingFailed,
    SaveFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientClassData => write!(f, "insufficient-class-data"),
            SkipReason::TrainingFailed => write!(f, "training-failed"),
            SkipReason::SaveFailed => write!(f, "save-failed"),
        }
    }
}

/// Result of a training run
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    Trained(ModelVersion),
    Skipped(SkipReason),
}

/// Trait for model trainer implementations
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    /// Train a new model on the gold samples
    async fn train(&self, gold_samples: &[Sample]) -> Result<TrainOutcome, TrainerError>;

    /// Whether a trained model has been persisted
    fn model_exists(&self) -> bool;
}
