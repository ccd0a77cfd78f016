use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    error::ConfigError,
    report,
    scanner::Coordinator,
    types::{Algorithm, ProbeMethod, ScanConfig},
};

#[derive(Clone)]
pub struct AppState {
    coordinator: Coordinator,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }
}

/// Body of `POST /api/scan`. Missing fields take the UI defaults.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub target: String,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub method: ProbeMethod,
    #[serde(default = "default_true")]
    pub common_ports_first: bool,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_range_start")]
    pub port_range_start: u32,
    #[serde(default = "default_range_end")]
    pub port_range_end: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_threads() -> usize {
    100
}

fn default_range_start() -> u32 {
    1
}

fn default_range_end() -> u32 {
    1024
}

impl ScanRequest {
    pub fn into_config(self) -> Result<ScanConfig, ConfigError> {
        ScanConfig::new(
            &self.target,
            self.port_range_start,
            self.port_range_end,
            self.algorithm,
            self.method,
            self.common_ports_first,
            self.max_threads,
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanAccepted {
    pub scan_id: String,
    pub status: String,
    pub target: String,
}

/// Error returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    Invalid(ConfigError),
    /// Body was not a well-formed scan request (bad JSON, wrong field types, unknown method).
    Malformed(JsonRejection),
    NotFound,
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError::Invalid(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Malformed(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Invalid(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Malformed(e) => (StatusCode::BAD_REQUEST, e.body_text()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Scan not found".to_string()),
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

/// API routes plus the static UI fallback.
pub fn router(state: AppState, ui_dir: impl Into<PathBuf>) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/scan/{scan_id}", get(get_scan))
        .route("/scan/{scan_id}/export", get(export_scan))
        .route("/scans", get(list_scans))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state);

    let static_svc = ServeDir::new(ui_dir.into()).append_index_html_on_directories(true);

    Router::new()
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API and UI on `bind` until `shutdown` is cancelled.
pub async fn spawn_server(
    bind: &str,
    ui_dir: PathBuf,
    coordinator: Coordinator,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(AppState::new(coordinator), ui_dir);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind UI server to {bind}"))?;

    info!(addr = %bind, "serving UI");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn post_scan(
    State(app): State<AppState>,
    req: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;
    let config = req.into_config()?;
    let target = config.target.clone();
    let scan_id = app.coordinator.start(config).await;
    Ok((
        StatusCode::ACCEPTED,
        Json(ScanAccepted {
            scan_id,
            status: "started".into(),
            target,
        }),
    ))
}

async fn get_scan(
    State(app): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snap = app
        .coordinator
        .store()
        .snapshot(&scan_id)
        .await
        .ok_or(ApiError::NotFound)?;
    Ok(Json(snap))
}

async fn list_scans(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.coordinator.store().summaries().await)
}

async fn export_scan(
    State(app): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snap = app
        .coordinator
        .store()
        .snapshot(&scan_id)
        .await
        .ok_or(ApiError::NotFound)?;
    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", report::file_name(&scan_id)),
        ),
    ];
    Ok((headers, report::render_text(&snap)))
}
