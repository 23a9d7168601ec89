//! JSON HTTP front end for the query router.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Route a query; body `{"query": "..."}` |
//! | `GET`  | `/governor` | Rate-governor window usage |
//! | `GET`  | `/health` | Health check (version, halted flag) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Model faults are not HTTP errors: `/ask` answers `200` with a
//! `source.kind` of `"fault"` and a displayable message.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat page
//! can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::router::{QueryRouter, RouteOutcome};

/// Longest query accepted by `/ask`, in characters.
const MAX_QUERY_CHARS: usize = 4000;

#[derive(Clone)]
struct AppState {
    router: Arc<QueryRouter>,
}

/// Build the pipeline from `config` and serve it on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let router = Arc::new(QueryRouter::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("listening on http://{}", config.server.bind);
    axum::serve(listener, app(router)).await?;
    Ok(())
}

/// The axum application, for embedding or testing.
pub fn app(router: Arc<QueryRouter>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/governor", get(handle_governor))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { router })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    query: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<RouteOutcome>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(bad_request(format!(
            "query exceeds {} characters",
            MAX_QUERY_CHARS
        )));
    }
    Ok(Json(state.router.answer(query).await))
}

// ============ GET /governor ============

#[derive(Serialize)]
struct GovernorResponse {
    calls_per_minute: usize,
    in_window: usize,
    remaining: usize,
}

async fn handle_governor(State(state): State<AppState>) -> Json<GovernorResponse> {
    let governor = state.router.governor();
    Json(GovernorResponse {
        calls_per_minute: governor.calls_per_minute(),
        in_window: governor.in_window(),
        remaining: governor.get_remaining(),
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// True once the model has been found misconfigured.
    halted: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        halted: state.router.is_halted(),
    })
}
