use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::models::BatchReport;
use crate::pipeline::AutoEventPipeline;
use crate::scheduler::{Scheduler, SchedulerStatus};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: AutoEventPipeline,
    pub scheduler: Arc<Scheduler>,
    /// Deadline for on-demand runs.
    pub trigger_deadline: Duration,
    /// Cancelled on process shutdown; on-demand runs stop with it.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/auto-events/process", post(process_auto_events))
        .route("/api/scheduler/status", get(scheduler_status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub message: String,
    pub result: BatchReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
    pub status: SchedulerStatus,
}

async fn process_auto_events(
    State(state): State<AppState>,
) -> Result<Json<ProcessResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state
        .pipeline
        .run_with_deadline(&state.shutdown, state.trigger_deadline)
        .await
    {
        Ok(result) => Ok(Json(ProcessResponse {
            message: "Auto event processing completed".to_string(),
            result,
        })),
        Err(e) => {
            warn!(error = %e, "on-demand auto event run failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to process auto events".to_string(),
                    details: e.to_string(),
                }),
            ))
        }
    }
}

async fn scheduler_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "Scheduler status retrieved successfully".to_string(),
        status: state.scheduler.status(),
    })
}
