//! Retrain agent: trains a new model once enough gold samples accumulated

use super::Agent;
use crate::error::{Result, StoreError};
use crate::model::{ModelTrainer, TrainOutcome};
use crate::models::SystemSettings;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::store::SampleStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Observability record for one completed training run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrainResult {
    pub new_model_version: String,
    pub training_count: usize,
}

pub struct RetrainAgent {
    store: Arc<dyn SampleStore>,
    trainer: Arc<dyn ModelTrainer>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl RetrainAgent {
    pub fn new(store: Arc<dyn SampleStore>, trainer: Arc<dyn ModelTrainer>) -> Self {
        Self {
            store,
            trainer,
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new("retrain"),
        }
    }

    /// Zero the counter observed at step start. Reviews that landed while
    /// training ran bump the version, in which case only the observed amount
    /// is consumed and the newer reviews keep counting toward the next run.
    async fn reset_counter(&self, observed: &SystemSettings) -> Result<SystemSettings> {
        match self.store.reset_gold_counter(observed.version).await {
            Ok(settings) => Ok(settings),
            Err(StoreError::VersionConflict { expected, actual }) => {
                debug!(
                    expected = expected,
                    actual = actual,
                    "Settings changed during training, consuming observed gold only"
                );
                Ok(self
                    .store
                    .consume_gold(observed.new_gold_since_last_train)
                    .await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Agent for RetrainAgent {
    type Output = RetrainResult;

    fn name(&self) -> &'static str {
        "retrain"
    }

    async fn step(&self) -> Result<Option<RetrainResult>> {
        let Some(settings) = self.store.find_settings().await? else {
            debug!("No settings yet, nothing to retrain");
            return Ok(None);
        };
        if !settings.is_retrain_enabled {
            return Ok(None);
        }

        self.metrics
            .set_gold_since_last_train(i64::from(settings.new_gold_since_last_train));

        if settings.new_gold_since_last_train < settings.retrain_gold_threshold {
            debug!(
                gold = settings.new_gold_since_last_train,
                threshold = settings.retrain_gold_threshold,
                "Below retrain threshold"
            );
            return Ok(None);
        }

        // Re-derived every cycle; labels may have changed since the last run
        let gold = self.store.find_all_reviewed_with_label().await?;
        if gold.is_empty() {
            warn!(
                gold = settings.new_gold_since_last_train,
                "Gold counter is set but no reviewed samples exist"
            );
            return Ok(None);
        }

        info!(
            samples = gold.len(),
            gold = settings.new_gold_since_last_train,
            threshold = settings.retrain_gold_threshold,
            "Retrain threshold reached"
        );

        let version = match self.trainer.train(&gold).await? {
            TrainOutcome::Trained(version) => version,
            TrainOutcome::Skipped(reason) => {
                self.metrics.inc_retrain_run(&reason.to_string());
                self.logger
                    .log_retrain_skipped(&reason.to_string(), settings.new_gold_since_last_train);
                return Ok(None);
            }
        };

        let reset = self.reset_counter(&settings).await?;
        self.store.set_active_model(&version.version).await?;

        self.metrics.inc_retrain_run("trained");
        self.metrics
            .set_gold_since_last_train(i64::from(reset.new_gold_since_last_train));
        self.metrics.set_model_version(&version.version);
        self.logger
            .log_retrain_completed(&version.version, gold.len());

        Ok(Some(RetrainResult {
            new_model_version: version.version,
            training_count: gold.len(),
        }))
    }
}
