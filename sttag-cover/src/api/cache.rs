//! Cache run API handlers
//!
//! POST /cache/populate, POST /cache/apply, POST /cache/cancel, GET /cache/status

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use sttag_common::events::CacheOperation;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ApiError, ApiResult, TaggerError},
    models::{ProgressSnapshot, RunOutcome},
    AppState,
};

/// POST /cache/populate and /cache/apply request
///
/// Both folders are optional; the configured ones are used otherwise.
#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    pub music_folder: Option<PathBuf>,
    pub cover_folder: Option<PathBuf>,
}

/// POST /cache/populate and /cache/apply response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub operation: CacheOperation,
    pub music_folder: PathBuf,
    pub cover_folder: PathBuf,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// POST /cache/cancel response
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelRunResponse {
    /// Whether a run was active and has been signalled
    pub cancelled: bool,
    pub progress: ProgressSnapshot,
}

/// GET /cache/status response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatusResponse {
    pub busy: bool,
    pub progress: ProgressSnapshot,
    pub steps_text: String,
    pub last_outcome: Option<RunOutcome>,
    /// Why the most recent run ended without an outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// POST /cache/populate
///
/// Starts a populate run in the background. Returns 202 Accepted.
pub async fn start_populate(
    State(state): State<AppState>,
    request: Option<Json<StartRunRequest>>,
) -> ApiResult<(StatusCode, Json<StartRunResponse>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    start_run(state, CacheOperation::Populate, request).await
}

/// POST /cache/apply
///
/// Starts an apply run in the background. Returns 202 Accepted.
pub async fn start_apply(
    State(state): State<AppState>,
    request: Option<Json<StartRunRequest>>,
) -> ApiResult<(StatusCode, Json<StartRunResponse>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    start_run(state, CacheOperation::Apply, request).await
}

async fn start_run(
    state: AppState,
    operation: CacheOperation,
    request: StartRunRequest,
) -> ApiResult<(StatusCode, Json<StartRunResponse>)> {
    let music_folder = request
        .music_folder
        .unwrap_or_else(|| state.music_folder.clone());
    let cover_folder = request
        .cover_folder
        .unwrap_or_else(|| state.cover_folder.clone());

    if !music_folder.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Music folder does not exist: {}",
            music_folder.display()
        )));
    }

    let response = StartRunResponse {
        operation,
        music_folder: music_folder.clone(),
        cover_folder: cover_folder.clone(),
        started_at: chrono::Utc::now(),
    };

    tracing::info!(
        operation = %operation,
        music_folder = %music_folder.display(),
        cover_folder = %cover_folder.display(),
        "Cache run requested"
    );

    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        let result = match operation {
            CacheOperation::Populate => {
                state
                    .service
                    .populate_cache(&music_folder, &cover_folder, &cancel)
                    .await
            }
            CacheOperation::Apply => {
                state
                    .service
                    .apply_cache(&music_folder, &cover_folder, &cancel)
                    .await
            }
        };

        match result {
            Ok(outcome) => {
                *state.last_error.write().await = None;
                *state.last_outcome.write().await = Some(outcome);
            }
            Err(TaggerError::Cancelled(outcome)) => {
                *state.last_error.write().await = None;
                *state.last_outcome.write().await = Some(*outcome);
            }
            Err(e) => {
                tracing::error!(operation = %operation, error = %e, "Cache run failed");
                *state.last_error.write().await = Some(e.to_string());
            }
        }
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /cache/cancel
pub async fn cancel_run(State(state): State<AppState>) -> Json<CancelRunResponse> {
    let cancelled = state.service.cancel();
    if cancelled {
        tracing::info!("Cache run cancellation requested");
    }

    Json(CancelRunResponse {
        cancelled,
        progress: state.service.progress(),
    })
}

/// GET /cache/status
pub async fn get_status(State(state): State<AppState>) -> Json<CacheStatusResponse> {
    let progress = state.service.progress();
    let last_outcome = state.last_outcome.read().await.clone();
    let last_error = state.last_error.read().await.clone();

    Json(CacheStatusResponse {
        busy: state.service.is_busy(),
        progress,
        steps_text: progress.steps_text(),
        last_outcome,
        last_error,
    })
}

/// Build cache routes
pub fn cache_routes() -> Router<AppState> {
    Router::new()
        .route("/cache/populate", post(start_populate))
        .route("/cache/apply", post(start_apply))
        .route("/cache/cancel", post(cancel_run))
        .route("/cache/status", get(get_status))
}
