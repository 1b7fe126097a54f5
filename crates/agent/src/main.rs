//! Hive agent - pollen scoring and retraining daemon
//!
//! Runs the scoring and retrain worker loops against a shared store and
//! serves health, metrics and the human review API.

use anyhow::{Context, Result};
use hive_agent::{api, config::AgentConfig};
use hive_lib::{
    health::{Component, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    AgentWorker, CentroidClassifier, CentroidTrainer, MemoryStore, ModelRegistry,
    ModelRegistryConfig, RetrainAgent, SampleStore, ScoringAgent,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hive-agent");

    // Load configuration
    let config = AgentConfig::load()?;
    info!(
        instance = %config.instance_name,
        data_dir = %config.data_dir.display(),
        model_dir = %config.model_dir.display(),
        no_model_policy = ?config.no_model_policy,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();

    // Initialize metrics
    let metrics = AgentMetrics::new();

    // Store and settings singleton
    let store = Arc::new(
        MemoryStore::with_snapshot(config.snapshot_path()).context("Failed to open store")?,
    );
    let settings = store
        .ensure_settings(config.default_settings())
        .await
        .context("Failed to initialize settings")?;
    metrics.set_gold_since_last_train(i64::from(settings.new_gold_since_last_train));

    // Model registry, classifier and trainer
    let registry = Arc::new(
        ModelRegistry::new(ModelRegistryConfig {
            model_dir: config.model_dir.clone(),
            versions_to_keep: config.versions_to_keep,
            ..Default::default()
        })
        .context("Failed to open model directory")?,
    );
    match registry.load_latest().await {
        Ok(Some(version)) => metrics.set_model_version(&version.version),
        Ok(None) => {
            health_registry
                .set_degraded(Component::Classifier, "No trained model yet")
                .await;
        }
        Err(e) => {
            // Stays unhealthy until the retrain agent publishes a model
            warn!(error = %e, "Failed to load existing model");
            health_registry
                .set_unhealthy(Component::Classifier, e.to_string())
                .await;
        }
    }

    let classifier = Arc::new(CentroidClassifier::new(registry.subscribe()));
    let trainer = Arc::new(CentroidTrainer::new(
        registry.clone(),
        config.trainer_config(),
    ));

    // Initialize structured logger
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(AGENT_VERSION, registry.current_version().as_deref());

    // Agents and their worker loops
    let scoring_agent = Arc::new(
        ScoringAgent::new(store.clone(), classifier, config.scoring_config())
            .with_health(health_registry.clone()),
    );
    let retrain_agent = Arc::new(RetrainAgent::new(store.clone(), trainer));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let scoring_handle = tokio::spawn(
        AgentWorker::new(scoring_agent, config.scoring_schedule())
            .with_health(health_registry.clone(), Component::ScoringAgent)
            .run(shutdown_tx.subscribe()),
    );
    let retrain_handle = tokio::spawn(
        AgentWorker::new(retrain_agent, config.retrain_schedule())
            .with_health(health_registry.clone(), Component::RetrainAgent)
            .run(shutdown_tx.subscribe()),
    );

    // Forward model updates to health and metrics
    let mut model_updates = registry.subscribe();
    let model_health = health_registry.clone();
    let model_metrics = metrics.clone();
    tokio::spawn(async move {
        while model_updates.changed().await.is_ok() {
            let version = model_updates.borrow_and_update().clone();
            if let Some(version) = version {
                model_metrics.set_model_version(&version.version);
                model_health.set_healthy(Component::Classifier).await;
            }
        }
    });

    // Create shared application state
    let store: Arc<dyn SampleStore> = store;
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        store,
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    // Start health, metrics and review server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // Workers finish their in-flight step before exiting
    let _ = shutdown_tx.send(());
    let scoring_stats = scoring_handle.await.context("Scoring worker panicked")?;
    let retrain_stats = retrain_handle.await.context("Retrain worker panicked")?;
    info!(
        scored = scoring_stats.work,
        scoring_errors = scoring_stats.errors,
        trained = retrain_stats.work,
        retrain_errors = retrain_stats.errors,
        "Workers stopped"
    );

    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
