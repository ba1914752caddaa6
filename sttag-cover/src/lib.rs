//! sttag-cover library interface
//!
//! Cover-art cache engine plus the HTTP control API, exposed for the binary
//! and for integration tests.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult, TaggerError, TaggerResult};

use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use sttag_common::events::EventBus;
use tokio::sync::RwLock;

use crate::models::RunOutcome;
use crate::services::CoverCacheService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Cache operations (populate, apply, cancel)
    pub service: Arc<CoverCacheService>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Music folder used when a request names none
    pub music_folder: PathBuf,
    /// Cover folder used when a request names none
    pub cover_folder: PathBuf,
    /// Error of the most recent run that ended without an outcome
    pub last_error: Arc<RwLock<Option<String>>>,
    /// Outcome of the most recent finished or cancelled run
    pub last_outcome: Arc<RwLock<Option<RunOutcome>>>,
}

impl AppState {
    pub fn new(
        service: Arc<CoverCacheService>,
        event_bus: EventBus,
        music_folder: PathBuf,
        cover_folder: PathBuf,
    ) -> Self {
        Self {
            service,
            event_bus,
            music_folder,
            cover_folder,
            last_error: Arc::new(RwLock::new(None)),
            last_outcome: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::cache_routes())
        .route("/cache/events", get(api::cache_event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
