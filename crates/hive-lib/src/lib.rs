//! Hive-camera pollen pipeline
//!
//! This crate provides the core functionality for:
//! - Scoring queued hive images against a confidence-threshold policy
//! - Retraining the image model once enough human-confirmed samples exist
//! - A transactional sample store shared by both agents
//! - Worker loops, health checks and observability

pub mod agent;
pub mod error;
pub mod health;
pub mod model;
pub mod models;
pub mod observability;
pub mod policy;
pub mod store;
pub mod worker;

pub use agent::{
    Agent, NoModelPolicy, RetrainAgent, RetrainResult, ScoringAgent, ScoringConfig,
    ScoringStepResult,
};
pub use error::{AgentError, ClassifierError, Result, StoreError, TrainerError};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use model::{
    CentroidClassifier, CentroidTrainer, ImageClassifier, LabelScores, ModelRegistry,
    ModelRegistryConfig, ModelTrainer, ModelVersion, SkipReason, TrainOutcome, TrainerConfig,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use policy::{PolicyOutcome, ScoringPolicy};
pub use store::{MemoryStore, SampleStore, SettingsUpdate, StatusCounts, StoreResult};
pub use worker::{AgentWorker, WorkerSchedule, WorkerStats};
