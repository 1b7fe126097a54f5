//! Scoring agent: moves queued samples through classification and policy

use super::Agent;
use crate::error::{AgentError, Result};
use crate::health::{Component, HealthRegistry};
use crate::model::{ImageClassifier, LabelScores};
use crate::models::{Decision, Prediction, SampleStatus};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::policy::ScoringPolicy;
use crate::store::SampleStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What to do with queued samples while the classifier has no trained model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoModelPolicy {
    /// Score the placeholder result like any other prediction
    Score,
    /// Leave samples queued until a model exists
    Defer,
    /// Score, but route every result to human review
    #[default]
    Review,
}

/// Configuration for the scoring agent
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub no_model_policy: NoModelPolicy,
    /// Samples claimed longer ago than this are reported as stuck
    pub stuck_after_secs: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            no_model_policy: NoModelPolicy::default(),
            stuck_after_secs: 300,
        }
    }
}

/// Observability record for one scored (or failed) sample
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringStepResult {
    pub sample_id: Uuid,
    pub old_status: SampleStatus,
    pub new_status: SampleStatus,
    pub score: Option<f32>,
    pub label: Option<String>,
    pub decision: Option<Decision>,
}

pub struct ScoringAgent {
    store: Arc<dyn SampleStore>,
    classifier: Arc<dyn ImageClassifier>,
    policy: ScoringPolicy,
    config: ScoringConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl ScoringAgent {
    pub fn new(
        store: Arc<dyn SampleStore>,
        classifier: Arc<dyn ImageClassifier>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            policy: ScoringPolicy::new(),
            config,
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new("scoring"),
            health: None,
        }
    }

    /// Report stuck samples on the queue health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Count samples that have sat in `Processing` past the stuck threshold.
    ///
    /// They are reported, never reclaimed: recovering them is an operator
    /// decision.
    pub async fn sweep_stuck(&self) -> Result<usize> {
        let older_than = Utc::now() - chrono::Duration::seconds(self.config.stuck_after_secs);
        let stuck = self.store.find_stuck_processing(older_than).await?;
        let counts = self.store.status_counts().await?;

        self.metrics.set_stuck_samples(stuck.len() as i64);
        self.metrics.set_queued_samples(counts.queued as i64);

        if stuck.is_empty() {
            if let Some(health) = &self.health {
                health.set_healthy(Component::Queue).await;
            }
        } else {
            self.logger
                .log_stuck_samples(stuck.len(), self.config.stuck_after_secs);
            if let Some(health) = &self.health {
                health
                    .set_degraded(
                        Component::Queue,
                        format!("{} samples stuck in processing", stuck.len()),
                    )
                    .await;
            }
        }

        Ok(stuck.len())
    }

    async fn fail_sample(
        &self,
        sample_id: Uuid,
        old_status: SampleStatus,
        reason: &str,
    ) -> Result<ScoringStepResult> {
        self.store.mark_failed(sample_id).await?;
        self.logger.log_sample_failed(sample_id, reason);
        Ok(ScoringStepResult {
            sample_id,
            old_status,
            new_status: SampleStatus::Failed,
            score: None,
            label: None,
            decision: None,
        })
    }
}

/// Highest scoring label; ties go to the lexically smaller label
fn top_label(scores: &LabelScores) -> Option<(&str, f32)> {
    scores
        .iter()
        .max_by(|a, b| {
            a.1.partial_cmp(b.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.0.cmp(a.0))
        })
        .map(|(label, score)| (label.as_str(), *score))
}

#[async_trait]
impl Agent for ScoringAgent {
    type Output = ScoringStepResult;

    fn name(&self) -> &'static str {
        "scoring"
    }

    async fn step(&self) -> Result<Option<ScoringStepResult>> {
        self.classifier.refresh().await;
        if self.config.no_model_policy == NoModelPolicy::Defer && !self.classifier.has_model() {
            debug!("No trained model yet, leaving samples queued");
            return Ok(None);
        }

        let Some(candidate) = self.store.find_one_queued_oldest().await? else {
            return Ok(None);
        };
        let old_status = candidate.status;

        // Claim before classifying so no other step can select this sample
        let sample = self.store.mark_processing(candidate.id, Utc::now()).await?;

        let scores = match self.classifier.predict(&sample.image_path).await {
            Ok(scores) => scores,
            Err(e) if e.is_unrecoverable() => {
                return self
                    .fail_sample(sample.id, old_status, &e.to_string())
                    .await
                    .map(Some);
            }
            Err(e) => {
                warn!(sample_id = %sample.id, error = %e, "Classification failed, releasing sample");
                self.store.requeue(sample.id).await?;
                return Err(e.into());
            }
        };

        let Some((label, score)) = top_label(&scores) else {
            self.fail_sample(sample.id, old_status, "classifier returned no labels")
                .await?;
            return Err(AgentError::EmptyPrediction(sample.id));
        };

        let settings = self.store.find_settings().await?.unwrap_or_default();
        let mut outcome = self.policy.evaluate(score, label, &settings);

        if self.config.no_model_policy == NoModelPolicy::Review && !self.classifier.has_model() {
            outcome.status = SampleStatus::PendingReview;
            outcome.decision = Decision::PendingReview;
        }

        let prediction = Prediction {
            id: Uuid::new_v4(),
            sample_id: sample.id,
            model_version: self.classifier.model_version(),
            score,
            predicted_label: outcome.label.clone(),
            decision: outcome.decision,
            created_at: Utc::now(),
        };

        self.store
            .commit_scoring(sample.id, outcome.status, prediction.clone())
            .await?;

        self.metrics.inc_decision(outcome.decision);
        self.logger
            .log_sample_scored(&prediction, old_status, outcome.status);

        Ok(Some(ScoringStepResult {
            sample_id: sample.id,
            old_status,
            new_status: outcome.status,
            score: Some(score),
            label: Some(outcome.label),
            decision: Some(outcome.decision),
        }))
    }

    async fn on_idle(&self) -> Result<()> {
        self.sweep_stuck().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mocks::{MockClassifier, MockPrediction};
    use crate::error::StoreError;
    use crate::health::ComponentStatus;
    use crate::models::{Sample, SystemSettings, LABEL_NO_POLLEN, LABEL_POLLEN, LABEL_UNKNOWN};
    use crate::store::{MemoryStore, SettingsUpdate};
    use chrono::{DateTime, Duration};

    struct Fixture {
        store: Arc<MemoryStore>,
        classifier: Arc<MockClassifier>,
    }

    impl Fixture {
        async fn new(classifier: MockClassifier) -> Self {
            let store = Arc::new(MemoryStore::new());
            store
                .ensure_settings(SystemSettings::default())
                .await
                .unwrap();
            Self {
                store,
                classifier: Arc::new(classifier),
            }
        }

        fn agent(&self, no_model_policy: NoModelPolicy) -> ScoringAgent {
            ScoringAgent::new(
                self.store.clone(),
                self.classifier.clone(),
                ScoringConfig {
                    no_model_policy,
                    ..Default::default()
                },
            )
        }

        async fn queue_at(&self, captured_at: DateTime<Utc>) -> Sample {
            let sample = Sample::queued(Uuid::new_v4(), "/hive/cam.jpg", captured_at);
            self.store.insert_sample(sample.clone()).await.unwrap();
            sample
        }

        async fn status_of(&self, id: Uuid) -> SampleStatus {
            self.store.get_sample(id).await.unwrap().unwrap().status
        }
    }

    #[tokio::test]
    async fn test_no_work_when_queue_empty() {
        let fixture = Fixture::new(MockClassifier::scoring(LABEL_POLLEN, 0.95)).await;
        let agent = fixture.agent(NoModelPolicy::Score);

        assert!(agent.step().await.unwrap().is_none());
        assert_eq!(fixture.classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_high_score_auto_accepts() {
        let fixture = Fixture::new(MockClassifier::scoring(LABEL_POLLEN, 0.95)).await;
        let sample = fixture.queue_at(Utc::now()).await;

        let result = fixture
            .agent(NoModelPolicy::Score)
            .step()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.sample_id, sample.id);
        assert_eq!(result.old_status, SampleStatus::Queued);
        assert_eq!(result.new_status, SampleStatus::Scored);
        assert_eq!(result.decision, Some(Decision::AutoAccept));

        let predictions = fixture.store.predictions_for(sample.id).await.unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].predicted_label, LABEL_POLLEN);
        assert_eq!(predictions[0].model_version.as_deref(), Some("v-mock"));
    }

    #[tokio::test]
    async fn test_picks_top_label() {
        let scores = LabelScores::from([
            (LABEL_POLLEN.to_string(), 0.08),
            (LABEL_NO_POLLEN.to_string(), 0.92),
        ]);
        let fixture = Fixture::new(MockClassifier::with(MockPrediction::Scores(scores))).await;
        fixture.queue_at(Utc::now()).await;

        let result = fixture
            .agent(NoModelPolicy::Score)
            .step()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.label.as_deref(), Some(LABEL_NO_POLLEN));
        assert_eq!(result.score, Some(0.92));
    }

    #[tokio::test]
    async fn test_oldest_sample_first() {
        let fixture = Fixture::new(MockClassifier::scoring(LABEL_POLLEN, 0.5)).await;
        let now = Utc::now();
        let t2 = fixture.queue_at(now + Duration::seconds(2)).await;
        let t1 = fixture.queue_at(now + Duration::seconds(1)).await;
        let t3 = fixture.queue_at(now + Duration::seconds(3)).await;
        let agent = fixture.agent(NoModelPolicy::Score);

        let mut order = Vec::new();
        while let Some(result) = agent.step().await.unwrap() {
            order.push(result.sample_id);
        }

        assert_eq!(order, vec![t1.id, t2.id, t3.id]);
    }

    #[tokio::test]
    async fn test_thresholds_read_fresh_each_step() {
        let fixture = Fixture::new(MockClassifier::scoring(LABEL_POLLEN, 0.85)).await;
        let agent = fixture.agent(NoModelPolicy::Score);

        fixture.queue_at(Utc::now()).await;
        let first = agent.step().await.unwrap().unwrap();
        assert_eq!(first.decision, Some(Decision::PendingReview));

        fixture
            .store
            .update_settings(SettingsUpdate {
                auto_threshold_high: Some(0.80),
                ..Default::default()
            })
            .await
            .unwrap();

        fixture.queue_at(Utc::now()).await;
        let second = agent.step().await.unwrap().unwrap();
        assert_eq!(second.decision, Some(Decision::AutoAccept));
    }

    #[tokio::test]
    async fn test_missing_settings_fall_back_to_defaults() {
        let store = Arc::new(MemoryStore::new());
        let classifier = Arc::new(MockClassifier::scoring(LABEL_POLLEN, 0.95));
        let sample = Sample::queued(Uuid::new_v4(), "/hive/cam.jpg", Utc::now());
        store.insert_sample(sample.clone()).await.unwrap();

        let agent = ScoringAgent::new(store.clone(), classifier, ScoringConfig::default());
        let result = agent.step().await.unwrap().unwrap();

        assert_eq!(result.decision, Some(Decision::AutoAccept));
    }

    #[tokio::test]
    async fn test_claimed_sample_not_scored_twice() {
        let fixture = Fixture::new(MockClassifier::scoring(LABEL_POLLEN, 0.95)).await;
        let sample = fixture.queue_at(Utc::now()).await;
        fixture
            .store
            .mark_processing(sample.id, Utc::now())
            .await
            .unwrap();

        let result = fixture.agent(NoModelPolicy::Score).step().await.unwrap();

        assert!(result.is_none());
        assert_eq!(fixture.classifier.calls(), 0);
        assert_eq!(fixture.status_of(sample.id).await, SampleStatus::Processing);
    }

    #[tokio::test]
    async fn test_missing_image_marks_failed() {
        let fixture = Fixture::new(MockClassifier::with(MockPrediction::Missing)).await;
        let sample = fixture.queue_at(Utc::now()).await;

        let result = fixture
            .agent(NoModelPolicy::Score)
            .step()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.new_status, SampleStatus::Failed);
        assert_eq!(fixture.status_of(sample.id).await, SampleStatus::Failed);
        assert!(fixture
            .store
            .predictions_for(sample.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_transient_classifier_error_requeues() {
        let fixture = Fixture::new(MockClassifier::with(MockPrediction::Unavailable)).await;
        let sample = fixture.queue_at(Utc::now()).await;
        let agent = fixture.agent(NoModelPolicy::Score);

        let err = agent.step().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(fixture.status_of(sample.id).await, SampleStatus::Queued);

        fixture
            .classifier
            .set(MockPrediction::Scores(LabelScores::from([(
                LABEL_POLLEN.to_string(),
                0.95,
            )])));
        let result = agent.step().await.unwrap().unwrap();
        assert_eq!(result.sample_id, sample.id);
    }

    #[tokio::test]
    async fn test_empty_mapping_is_contract_violation() {
        let fixture =
            Fixture::new(MockClassifier::with(MockPrediction::Scores(LabelScores::new()))).await;
        let sample = fixture.queue_at(Utc::now()).await;

        let err = fixture
            .agent(NoModelPolicy::Score)
            .step()
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::EmptyPrediction(id) if id == sample.id));
        assert_eq!(fixture.status_of(sample.id).await, SampleStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_model_score_policy_auto_rejects_placeholder() {
        let fixture = Fixture::new(MockClassifier::without_model()).await;
        fixture.queue_at(Utc::now()).await;

        let result = fixture
            .agent(NoModelPolicy::Score)
            .step()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.label.as_deref(), Some(LABEL_UNKNOWN));
        assert_eq!(result.decision, Some(Decision::AutoReject));
    }

    #[tokio::test]
    async fn test_no_model_review_policy_routes_to_review() {
        let fixture = Fixture::new(MockClassifier::without_model()).await;
        let sample = fixture.queue_at(Utc::now()).await;

        let result = fixture
            .agent(NoModelPolicy::Review)
            .step()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.decision, Some(Decision::PendingReview));
        assert_eq!(
            fixture.status_of(sample.id).await,
            SampleStatus::PendingReview
        );
    }

    #[tokio::test]
    async fn test_no_model_defer_policy_leaves_queue() {
        let fixture = Fixture::new(MockClassifier::without_model()).await;
        let sample = fixture.queue_at(Utc::now()).await;

        let result = fixture.agent(NoModelPolicy::Defer).step().await.unwrap();

        assert!(result.is_none());
        assert_eq!(fixture.classifier.calls(), 0);
        assert_eq!(fixture.status_of(sample.id).await, SampleStatus::Queued);
    }

    #[tokio::test]
    async fn test_deferred_scoring_resumes_once_model_published() {
        let fixture = Fixture::new(MockClassifier::without_model()).await;
        let sample = fixture.queue_at(Utc::now()).await;
        let agent = fixture.agent(NoModelPolicy::Defer);

        assert!(agent.step().await.unwrap().is_none());

        fixture
            .classifier
            .publish(MockPrediction::Scores(LabelScores::from([(
                LABEL_POLLEN.to_string(),
                0.97,
            )])));
        let result = agent.step().await.unwrap().unwrap();

        assert_eq!(result.sample_id, sample.id);
        assert_eq!(result.decision, Some(Decision::AutoAccept));
        assert_eq!(fixture.classifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_sweep_reports_stuck_samples() {
        let fixture = Fixture::new(MockClassifier::scoring(LABEL_POLLEN, 0.95)).await;
        let health = HealthRegistry::new();
        let agent = fixture.agent(NoModelPolicy::Score).with_health(health.clone());

        let stuck = fixture.queue_at(Utc::now()).await;
        fixture
            .store
            .mark_processing(stuck.id, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        let fresh = fixture.queue_at(Utc::now()).await;
        fixture
            .store
            .mark_processing(fresh.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(agent.sweep_stuck().await.unwrap(), 1);
        let queue_health = health.component(Component::Queue).await.unwrap();
        assert_eq!(queue_health.status, ComponentStatus::Degraded);
        // Reported only, never reclaimed
        assert_eq!(fixture.status_of(stuck.id).await, SampleStatus::Processing);
    }

    #[tokio::test]
    async fn test_reclaiming_failed_sample_is_step_fatal() {
        let fixture = Fixture::new(MockClassifier::scoring(LABEL_POLLEN, 0.95)).await;
        let sample = fixture.queue_at(Utc::now()).await;
        fixture
            .store
            .mark_processing(sample.id, Utc::now())
            .await
            .unwrap();
        fixture.store.mark_failed(sample.id).await.unwrap();

        let err = fixture
            .store
            .mark_processing(sample.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));
        assert!(!AgentError::from(err).is_transient());
    }

    #[test]
    fn test_top_label_tie_is_deterministic() {
        let scores = LabelScores::from([
            (LABEL_POLLEN.to_string(), 0.5),
            (LABEL_NO_POLLEN.to_string(), 0.5),
        ]);
        assert_eq!(top_label(&scores), Some((LABEL_NO_POLLEN, 0.5)));
        assert_eq!(top_label(&LabelScores::new()), None);
    }
}
