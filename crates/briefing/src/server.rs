//! HTTP trigger server.
//!
//! Provides REST API endpoints for:
//! - Generating and sending one user's briefing on demand
//! - The cron trigger that runs every user due this minute
//! - Reading and updating per-user settings
//! - Health checks

use anyhow::Result;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ConfigPatch;
use crate::job::{BatchResults, BriefingJob, JobError};
use crate::store::StoreError;

/// Server state shared across handlers.
pub struct ServerState {
    pub job: BriefingJob,
}

impl ServerState {
    #[must_use]
    pub fn new(job: BriefingJob) -> Self {
        Self { job }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/generate", get(cron_handler).post(generate_handler))
        .route(
            "/users/{user_id}/config",
            get(get_config_handler).put(put_config_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn run_server(state: Arc<ServerState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Briefing server listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Body of `POST /generate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub user_id: String,
}

/// Query of `GET /generate`. `at` overrides the evaluated instant.
#[derive(Debug, Default, Deserialize)]
pub struct CronQuery {
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct CronResponse {
    message: &'static str,
    triggered: usize,
    results: BatchResults,
}

/// Error rendered as `{"error": message}` with a status code.
#[derive(Debug)]
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

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let status = match &err {
            JobError::ConfigNotFound { .. } => StatusCode::NOT_FOUND,
            JobError::Validation { .. } => StatusCode::BAD_REQUEST,
            JobError::Generation { .. } | JobError::Delivery { .. } | JobError::Store { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::InvalidUserId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run one user's briefing now.
async fn generate_handler(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body?;
    if request.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("userId must not be empty"));
    }

    state.job.run(&request.user_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Cron trigger: run every user due at the current minute, or at `?at=`
/// (RFC 3339) when given.
async fn cron_handler(
    State(state): State<Arc<ServerState>>,
    query: Result<Query<CronQuery>, QueryRejection>,
) -> Result<Json<CronResponse>, ApiError> {
    let Query(query) = query?;
    let now = query.at.unwrap_or_else(Utc::now);
    let results = state.job.run_due(now).await?;
    Ok(Json(CronResponse {
        message: "Cron triggered",
        triggered: results.len(),
        results,
    }))
}

async fn get_config_handler(
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state
        .job
        .store()
        .get(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no briefing config saved for user '{user_id}'")))?;
    Ok(Json(config.redacted(Utc::now())))
}

/// Merge-upsert a partial config.
async fn put_config_handler(
    State(state): State<Arc<ServerState>>,
    Path(user_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(value) = body?;
    let patch: ConfigPatch =
        serde_json::from_value(value).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let config = state.job.store().set(&user_id, patch).await?;
    info!(user_id = %user_id, "Updated briefing config");
    Ok(Json(config.redacted(Utc::now())))
}
