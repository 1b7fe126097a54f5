use crate::error::{ClassifierError, TrainerError};
use crate::model::{
    ImageClassifier, LabelScores, ModelTrainer, ModelVersion, SkipReason, TrainOutcome,
};
use crate::models::{Sample, LABEL_POLLEN, LABEL_UNKNOWN};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// What the mock classifier answers with
#[derive(Debug, Clone)]
pub enum MockPrediction {
    Scores(LabelScores),
    Missing,
    Unavailable,
}

pub struct MockClassifier {
    prediction: Mutex<MockPrediction>,
    has_model: AtomicBool,
    published: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockClassifier {
    pub fn scoring(label: &str, score: f32) -> Self {
        Self::with(MockPrediction::Scores(LabelScores::from([(
            label.to_string(),
            score,
        )])))
    }

    pub fn with(prediction: MockPrediction) -> Self {
        Self {
            prediction: Mutex::new(prediction),
            has_model: AtomicBool::new(true),
            published: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Behave like an adapter before its first model
    pub fn without_model() -> Self {
        let classifier = Self::scoring(LABEL_UNKNOWN, 0.0);
        classifier.has_model.store(false, Ordering::SeqCst);
        classifier
    }

    /// Announce a model, loaded on the next `refresh`
    pub fn publish(&self, prediction: MockPrediction) {
        self.set(prediction);
        self.published.store(true, Ordering::SeqCst);
    }

    pub fn set(&self, prediction: MockPrediction) {
        *self.prediction.lock().unwrap() = prediction;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageClassifier for MockClassifier {
    async fn predict(&self, image_path: &str) -> Result<LabelScores, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.prediction.lock().unwrap().clone() {
            MockPrediction::Scores(scores) => Ok(scores),
            MockPrediction::Missing => Err(ClassifierError::ImageNotFound(image_path.to_string())),
            MockPrediction::Unavailable => Err(ClassifierError::Model("model locked".to_string())),
        }
    }

    async fn refresh(&self) {
        if self.published.swap(false, Ordering::SeqCst) {
            self.has_model.store(true, Ordering::SeqCst);
        }
    }

    fn has_model(&self) -> bool {
        self.has_model.load(Ordering::SeqCst)
    }

    fn model_version(&self) -> Option<String> {
        self.has_model().then(|| "v-mock".to_string())
    }
}

/// Trainer answering with a fixed outcome and recording what it saw
pub struct MockTrainer {
    skip: Mutex<Option<SkipReason>>,
    fail: AtomicBool,
    pub calls: AtomicUsize,
    pub last_batch: Mutex<Vec<Sample>>,
}

impl MockTrainer {
    pub fn succeeding() -> Self {
        Self {
            skip: Mutex::new(None),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_batch: Mutex::new(Vec::new()),
        }
    }

    pub fn skipping(reason: SkipReason) -> Self {
        let trainer = Self::succeeding();
        *trainer.skip.lock().unwrap() = Some(reason);
        trainer
    }

    pub fn failing() -> Self {
        let trainer = Self::succeeding();
        trainer.fail.store(true, Ordering::SeqCst);
        trainer
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_batch_len(&self) -> usize {
        self.last_batch.lock().unwrap().len()
    }

    pub fn pollen_in_last_batch(&self) -> usize {
        self.last_batch
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.label.as_deref() == Some(LABEL_POLLEN))
            .count()
    }
}

#[async_trait]
impl ModelTrainer for MockTrainer {
    async fn train(&self, gold_samples: &[Sample]) -> Result<TrainOutcome, TrainerError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_batch.lock().unwrap() = gold_samples.to_vec();

        if self.fail.load(Ordering::SeqCst) {
            return Err(TrainerError::Internal("out of memory".to_string()));
        }
        if let Some(reason) = *self.skip.lock().unwrap() {
            return Ok(TrainOutcome::Skipped(reason));
        }

        let version = format!("v-mock-{}", n);
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
