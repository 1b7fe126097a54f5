//! HTTP API: health checks, Prometheus metrics, human review and admin routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use hive_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::AgentMetrics,
    store::{ResetSummary, SampleStore, SettingsUpdate, StatusCounts},
    Prediction, Sample, SampleStatus, StoreError, SystemSettings, LABEL_NO_POLLEN, LABEL_POLLEN,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub store: Arc<dyn SampleStore>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            store,
        }
    }
}

/// Error body returned by the API routes
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidState { .. } | StoreError::VersionConflict { .. } => {
                StatusCode::CONFLICT
            }
            StoreError::InvalidSettings(_) => StatusCode::BAD_REQUEST,
            StoreError::SettingsMissing
            | StoreError::Io { .. }
            | StoreError::Serialization(_) => {
                error!(error = %err, "Store operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// New image reported by a hive camera
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub hive_id: Uuid,
    pub image_path: String,
    /// Defaults to the time of the request
    pub captured_at: Option<DateTime<Utc>>,
}

async fn ingest_sample(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<Sample>)> {
    if request.image_path.trim().is_empty() {
        return Err(ApiError::bad_request("image_path must not be empty"));
    }

    let sample = Sample::queued(
        request.hive_id,
        request.image_path,
        request.captured_at.unwrap_or_else(Utc::now),
    );
    state.store.insert_sample(sample.clone()).await?;

    info!(sample_id = %sample.id, hive_id = %sample.hive_id, "Sample queued");
    Ok((StatusCode::CREATED, Json(sample)))
}

async fn pending_review(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Sample>>> {
    let samples = state
        .store
        .find_by_status(SampleStatus::PendingReview)
        .await?;
    Ok(Json(samples))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub sample_id: Uuid,
    pub is_pollen: bool,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub sample: Sample,
    /// Counter after this review; absent when settings do not exist yet
    pub new_gold_since_last_train: Option<u32>,
}

async fn review_sample(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<ReviewResponse>> {
    let label = if request.is_pollen {
        LABEL_POLLEN
    } else {
        LABEL_NO_POLLEN
    };

    let (sample, settings) = state.store.record_review(request.sample_id, label).await?;
    let counter = settings.map(|s| s.new_gold_since_last_train);
    if let Some(gold) = counter {
        state.metrics.set_gold_since_last_train(i64::from(gold));
    }

    info!(sample_id = %sample.id, label = %label, "Sample reviewed");
    Ok(Json(ReviewResponse {
        sample,
        new_gold_since_last_train: counter,
    }))
}

#[derive(Debug, Serialize)]
pub struct SampleDetail {
    pub sample: Sample,
    /// Newest first
    pub predictions: Vec<Prediction>,
}

async fn get_sample(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SampleDetail>> {
    let sample = state
        .store
        .get_sample(id)
        .await?
        .ok_or(StoreError::NotFound(id))?;
    let predictions = state.store.predictions_for(id).await?;
    Ok(Json(SampleDetail {
        sample,
        predictions,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub counts: StatusCounts,
    pub settings: Option<SystemSettings>,
    pub retrain_due: bool,
}

async fn admin_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let counts = state.store.status_counts().await?;
    let settings = state.store.find_settings().await?;
    let retrain_due = settings.as_ref().map(|s| s.retrain_due()).unwrap_or(false);
    Ok(Json(StatusResponse {
        counts,
        settings,
        retrain_due,
    }))
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub message: String,
    pub new_gold_since_last_train: u32,
}

/// Force the next retrain cycle by setting the counter to the size of the
/// gold set the retrain agent will train on
async fn trigger_retrain(State(state): State<Arc<AppState>>) -> ApiResult<Json<TriggerResponse>> {
    let reviewed = state.store.find_all_reviewed_with_label().await?.len();
    if reviewed == 0 {
        return Err(ApiError::bad_request("No labelled reviewed samples to train on"));
    }

    let gold = u32::try_from(reviewed).unwrap_or(u32::MAX);
    let settings = state.store.set_gold_counter(gold).await?;
    state
        .metrics
        .set_gold_since_last_train(i64::from(settings.new_gold_since_last_train));

    warn!(gold = gold, "Retraining triggered by administrator");
    Ok(Json(TriggerResponse {
        message: format!(
            "Retrain triggered with {} reviewed samples; it runs on the next retrain cycle",
            gold
        ),
        new_gold_since_last_train: settings.new_gold_since_last_train,
    }))
}

async fn reset_database(State(state): State<Arc<AppState>>) -> ApiResult<Json<ResetSummary>> {
    let summary = state.store.reset().await?;
    state.metrics.set_gold_since_last_train(0);
    state.metrics.set_queued_samples(0);
    warn!(
        deleted_samples = summary.deleted_samples,
        deleted_predictions = summary.deleted_predictions,
        "Database reset by administrator"
    );
    Ok(Json(summary))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<SystemSettings>> {
    let settings = state.store.update_settings(update).await?;
    info!(
        high = settings.auto_threshold_high,
        low = settings.auto_threshold_low,
        retrain_gold_threshold = settings.retrain_gold_threshold,
        retrain_enabled = settings.is_retrain_enabled,
        "Settings updated"
    );
    Ok(Json(settings))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/samples", post(ingest_sample))
        .route("/api/samples/pending-review", get(pending_review))
        .route("/api/samples/review", post(review_sample))
        .route("/api/samples/:id", get(get_sample))
        .route("/api/admin/status", get(admin_status))
        .route("/api/admin/settings", patch(update_settings))
        .route("/api/admin/trigger-retrain", post(trigger_retrain))
        .route("/api/admin/reset-database", delete(reset_database))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
