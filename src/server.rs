//! HTTP query interface.
//!
//! A thin layer over [`ArchiveLookup`]: parse parameters, check the API
//! key, map lookup errors to status codes.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/` | no | Greeting |
//! | `GET`  | `/health` | no | Health check (returns version) |
//! | `GET`  | `/alive` | yes | Liveness text |
//! | `GET`  | `/latest` | yes | Newest archived artifact |
//! | `GET`  | `/nearest?timeIso=..&searchLimit=..` | yes | Artifact nearest to a time |
//!
//! Artifact responses carry the raw archived JSON and an `x-wind-stamp`
//! header naming the stamp that was served.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no data within searchLimit of 1 day(s)" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `timeout` (408), `internal` (500).
//!
//! # Authentication
//!
//! Protected routes require `X-API-KEY` to equal `server.api_key` (or
//! `WINDH_API_KEY`). With no key configured every route is open.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use wind_harvest_core::lookup::LookupError;

use crate::config::Config;
use crate::lookup::{ArchiveLookup, Snapshot};

const API_KEY_HEADER: &str = "x-api-key";
const STAMP_HEADER: &str = "x-wind-stamp";

#[derive(Clone)]
struct AppState {
    lookup: Arc<ArchiveLookup>,
    api_key: Option<Arc<str>>,
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    serve(listener, config).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, config: &Config) -> Result<()> {
    let app = router(config)?;
    info!(op = "server.listen", addr = %listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(config: &Config) -> Result<Router> {
    let api_key = config.server.resolved_api_key();
    if api_key.is_none() {
        warn!(op = "server.auth_disabled", "no API key configured, all routes are open");
    }
    let state = AppState {
        lookup: Arc::new(ArchiveLookup::from_config(config)),
        api_key: api_key.map(Arc::from),
    };

    let protected = Router::new()
        .route("/alive", get(handle_alive))
        .route("/latest", get(handle_latest))
        .route("/nearest", get(handle_nearest))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Ok(Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .merge(protected)
        .layer(cors_layer(&config.server.allowed_origins)?)
        .with_state(state))
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins = allowed_origins
            .iter()
            .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {}", o)))
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ]))
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = &state.api_key {
        let supplied = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if supplied != Some(expected.as_ref()) {
            warn!(op = "server.forbidden", path = %request.uri().path());
            return Err(forbidden("missing or invalid X-API-KEY"));
        }
    }
    Ok(next.run(request).await)
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    app_error(StatusCode::FORBIDDEN, "forbidden", message)
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        let message = err.to_string();
        match err {
            LookupError::InvalidTime(_) | LookupError::InvalidLimit(_) => {
                app_error(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            LookupError::NoDataWithinLimit { .. } | LookupError::LookbackExhausted { .. } => {
                app_error(StatusCode::NOT_FOUND, "not_found", message)
            }
            LookupError::Timeout(_) => app_error(StatusCode::REQUEST_TIMEOUT, "timeout", message),
            LookupError::Archive(_) => {
                error!(op = "server.lookup.error", error = %message);
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ Handlers ============

async fn handle_root() -> &'static str {
    "wind-harvest: GFS wind snapshots. Try /latest or /nearest?timeIso=..."
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_alive() -> &'static str {
    "wind-harvest is alive"
}

async fn handle_latest(State(state): State<AppState>) -> Result<Response, AppError> {
    let snapshot = state.lookup.latest(Utc::now()).await?;
    Ok(snapshot_response(snapshot))
}

#[derive(Debug, Deserialize)]
struct NearestParams {
    #[serde(rename = "timeIso")]
    time_iso: Option<String>,
    #[serde(rename = "searchLimit")]
    search_limit: Option<String>,
}

async fn handle_nearest(
    State(state): State<AppState>,
    Query(params): Query<NearestParams>,
) -> Result<Response, AppError> {
    let query = state
        .lookup
        .parse_nearest(params.time_iso.as_deref(), params.search_limit.as_deref())?;
    let snapshot = state.lookup.nearest(&query).await?;
    Ok(snapshot_response(snapshot))
}

fn snapshot_response(snapshot: Snapshot) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (HeaderName::from_static(STAMP_HEADER), snapshot.stamp().to_string()),
        ],
        snapshot.body,
    )
        .into_response()
}
