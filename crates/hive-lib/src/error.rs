//! Error types for the hive agent
//!
//! "No work" is never an error: agents return `Ok(None)` for it. Everything
//! here is either a rejected transition or a fault the worker loop backs off from.

use crate::models::SampleStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a sample store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Sample not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid transition for sample {id}: status is {status}, expected {expected}")]
    InvalidState {
        id: Uuid,
        status: SampleStatus,
        expected: SampleStatus,
    },

    #[error("Settings version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("System settings have not been created")]
    SettingsMissing,

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised by an image classifier
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Failed to decode image {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Model error: {0}")]
    Model(String),
}

impl ClassifierError {
    /// Errors tied to the sample itself; retrying the same image cannot succeed.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::ImageNotFound(_) | Self::Decode { .. })
    }
}

/// Errors raised by a model trainer outside its skip outcomes
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Training task aborted: {0}")]
    Join(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors surfaced by an agent step
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Trainer(#[from] TrainerError),

    #[error("Classifier returned no labels for sample {0}")]
    EmptyPrediction(Uuid),
}

impl AgentError {
    /// Rejected transitions are step-fatal; everything else is worth a retry
    /// after backoff.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Store(StoreError::InvalidState { .. }) | Self::EmptyPrediction(_)
        )
    }

    /// The store could not persist its state
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Io { .. } | StoreError::Serialization(_))
        )
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(StoreError::InvalidState { .. }) => "invalid_state",
            Self::Store(StoreError::VersionConflict { .. }) => "version_conflict",
            Self::Store(_) => "store",
            Self::Classifier(_) => "classifier",
            Self::Trainer(_) => "trainer",
            Self::EmptyPrediction(_) => "empty_prediction",
        }
    }
}

/// Result type alias for agent steps.
pub type Result<T> = std::result::Result<T, AgentError>;
