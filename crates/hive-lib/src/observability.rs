//! Observability infrastructure for the hive agent
//!
//! Provides:
//! - Prometheus metrics (step latency and outcomes, decisions, retraining, queue state)
//! - Structured JSON logging with tracing

use crate::models::{Decision, Prediction, SampleStatus};
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    GaugeVec, HistogramVec, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Histogram buckets for step latency (in seconds); training steps land in the tail
const STEP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0, 120.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    step_latency_seconds: HistogramVec,
    step_outcomes: IntCounterVec,
    decisions: IntCounterVec,
    retrain_runs: IntCounterVec,
    gold_since_last_train: IntGauge,
    queued_samples: IntGauge,
    stuck_samples: IntGauge,
    model_version_info: GaugeVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            step_latency_seconds: register_histogram_vec!(
                "hive_agent_step_latency_seconds",
                "Time spent in one agent step",
                &["agent"],
                STEP_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register step_latency_seconds"),

            step_outcomes: register_int_counter_vec!(
                "hive_agent_step_outcomes_total",
                "Agent steps by outcome (work, idle, error)",
                &["agent", "outcome"]
            )
            .expect("Failed to register step_outcomes"),

            decisions: register_int_counter_vec!(
                "hive_agent_decisions_total",
                "Scoring decisions by type",
                &["decision"]
            )
            .expect("Failed to register decisions"),

            retrain_runs: register_int_counter_vec!(
                "hive_agent_retrain_runs_total",
                "Training runs by result",
                &["result"]
            )
            .expect("Failed to register retrain_runs"),

            gold_since_last_train: register_int_gauge!(
                "hive_agent_gold_since_last_train",
                "Human-confirmed samples accumulated since the last training run"
            )
            .expect("Failed to register gold_since_last_train"),

            queued_samples: register_int_gauge!(
                "hive_agent_queued_samples",
                "Samples waiting to be scored"
            )
            .expect("Failed to register queued_samples"),

            stuck_samples: register_int_gauge!(
                "hive_agent_stuck_processing_samples",
                "Samples left in processing longer than the stuck threshold"
            )
            .expect("Failed to register stuck_samples"),

            model_version_info: register_gauge_vec!(
                "hive_agent_model_version_info",
                "Information about the currently active model",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_step_latency(&self, agent: &str, duration_secs: f64) {
        self.inner()
            .step_latency_seconds
            .with_label_values(&[agent])
            .observe(duration_secs);
    }

    /// Count a step outcome: `work`, `idle` or `error`
    pub fn inc_step_outcome(&self, agent: &str, outcome: &str) {
        self.inner()
            .step_outcomes
            .with_label_values(&[agent, outcome])
            .inc();
    }

    pub fn inc_decision(&self, decision: Decision) {
        self.inner()
            .decisions
            .with_label_values(&[&decision.to_string()])
            .inc();
    }

    pub fn inc_retrain_run(&self, result: &str) {
        self.inner().retrain_runs.with_label_values(&[result]).inc();
    }

    pub fn set_gold_since_last_train(&self, count: i64) {
        self.inner().gold_since_last_train.set(count);
    }

    pub fn set_queued_samples(&self, count: i64) {
        self.inner().queued_samples.set(count);
    }

    pub fn set_stuck_samples(&self, count: i64) {
        self.inner().stuck_samples.set(count);
    }

    /// Update model version info
    pub fn set_model_version(&self, version: &str) {
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for scoring, retraining
/// and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a completed scoring step
    pub fn log_sample_scored(
        &self,
        prediction: &Prediction,
        old_status: SampleStatus,
        new_status: SampleStatus,
    ) {
        info!(
            event = "sample_scored",
            instance = %self.instance,
            sample_id = %prediction.sample_id,
            old_status = %old_status,
            new_status = %new_status,
            score = prediction.score,
            label = %prediction.predicted_label,
            decision = %prediction.decision,
            model_version = prediction.model_version.as_deref().unwrap_or("none"),
            "Sample scored"
        );
    }

    /// Log a sample moved to the failed state
    pub fn log_sample_failed(&self, sample_id: Uuid, reason: &str) {
        warn!(
            event = "sample_failed",
            instance = %self.instance,
            sample_id = %sample_id,
            reason = %reason,
            "Sample marked failed"
        );
    }

    pub fn log_retrain_completed(&self, version: &str, trained_on: usize) {
        info!(
            event = "retrain_completed",
            instance = %self.instance,
            version = %version,
            trained_on = trained_on,
            "Model retrained"
        );
    }

    pub fn log_retrain_skipped(&self, reason: &str, gold_since_last_train: u32) {
        warn!(
            event = "retrain_skipped",
            instance = %self.instance,
            reason = %reason,
            gold_since_last_train = gold_since_last_train,
            "Retraining skipped, counter preserved"
        );
    }

    /// Log samples that never left processing
    pub fn log_stuck_samples(&self, count: usize, stuck_after_secs: i64) {
        warn!(
            event = "stuck_samples_detected",
            instance = %self.instance,
            count = count,
            stuck_after_secs = stuck_after_secs,
            "Samples stuck in processing need reconciliation"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, model_version: Option<&str>) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            model_version = model_version.unwrap_or("none"),
            "Hive agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Hive agent shutting down"
        );
    }
}
