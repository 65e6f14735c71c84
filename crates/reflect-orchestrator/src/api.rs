//! HTTP API for the reflection agent.
//!
//! # Endpoints
//!
//! - `POST /api/reflect` - Run a reflection loop for `{"theme": "..."}`
//! - `GET /api/health` - Liveness probe with the active loop settings
//! - anything else - Static files from `server.staticDir` (`/` serves `index.html`)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reflect_orchestrator::{create_router, AppState, Config, OpenAiClient, ReflectionOrchestrator};
//!
//! # async fn example() -> reflect_orchestrator::Result<()> {
//! let config = Config::load()?;
//! let client = Arc::new(OpenAiClient::from_config(&config)?);
//! let orchestrator = ReflectionOrchestrator::from_config(client, &config)?;
//!
//! let router = create_router(AppState::new(orchestrator, config));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    handler::HandlerWithoutStateExt,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ReflectError;
use crate::orchestrator::{ReflectionOrchestrator, THEME_REQUIRED};
use crate::run_state::ReflectionRun;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the reflect endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectRequest {
    /// Theme to write about. Missing and blank themes are rejected.
    #[serde(default)]
    pub theme: Option<String>,
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Model used for every step.
    pub model: String,
    /// Iteration budget per run.
    pub max_iterations: u32,
    /// Early-stop threshold.
    pub quality_threshold: f64,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// Runs share nothing mutable, so no lock is needed.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Orchestrator shared by every request.
    pub orchestrator: Arc<ReflectionOrchestrator>,
    /// Loaded configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub fn new(orchestrator: ReflectionOrchestrator, config: Config) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            config,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<ReflectError> for ApiError {
    fn from(err: ReflectError) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router.
///
/// The router has:
/// - the API routes under `/api`
/// - a static file fallback rooted at `server.staticDir`
/// - permissive CORS
/// - request tracing
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files =
        ServeDir::new(&state.config.server.static_dir).not_found_service(not_found.into_service());

    let api_routes = Router::new()
        .route("/reflect", post(handle_reflect))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/reflect`.
async fn handle_reflect(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReflectRequest>, JsonRejection>,
) -> Result<Json<ReflectionRun>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected reflect request body");
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let theme = request
        .theme
        .filter(|theme| !theme.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(THEME_REQUIRED.to_string()))?;

    info!(theme_len = theme.len(), "Received reflect request");

    let run = state.orchestrator.reflect(&theme).await.map_err(|e| {
        error!(error = %e, "Reflection run failed");
        ApiError::from(e)
    })?;

    info!(
        iterations = run.total_iterations,
        stopped_early = run.stopped_early,
        "Reflect request completed"
    );
    Ok(Json(run))
}

/// Handler for `GET /api/health`.
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let settings = state.orchestrator.settings();
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.orchestrator.model().to_string(),
        max_iterations: settings.max_iterations(),
        quality_threshold: settings.quality_threshold(),
    })
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

// ============================================================================
// Tests
// ============================================================================
