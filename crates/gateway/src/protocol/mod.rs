//! HTTP surface: `/healthz`, the `/sse` discovery stream and the `/invoke` dispatch endpoint.
//!
//! Every non-2xx answer (including unmatched routes and oversized bodies) is the JSON envelope
//! `{ok: false, error}`.

pub mod discovery;
pub mod dispatch;

use crate::registry::ServerDescriptor;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use discovery::DiscoveryStats;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Dispatch request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Interval between discovery `ping` events.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_millis(15_000);

pub struct AppState {
    pub server: Arc<ServerDescriptor>,
    pub heartbeat: Duration,
    pub stats: Arc<DiscoveryStats>,
    /// Cancelled on shutdown; open discovery streams end when it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(server: ServerDescriptor, shutdown: CancellationToken) -> Self {
        Self {
            server: Arc::new(server),
            heartbeat: HEARTBEAT_PERIOD,
            stats: Arc::new(DiscoveryStats::default()),
            shutdown,
        }
    }

    #[must_use]
    pub fn with_heartbeat(mut self, period: Duration) -> Self {
        self.heartbeat = period;
        self
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sse", get(discovery::sse))
        .route("/invoke", post(dispatch::invoke))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(Extension(state))
}

/// Serve until the state's shutdown token is cancelled.
///
/// # Errors
///
/// Returns the underlying I/O error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found() -> Response {
    failure(StatusCode::NOT_FOUND, "not found")
}

async fn method_not_allowed() -> Response {
    failure(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

pub(crate) fn success(result: Value) -> Response {
    (StatusCode::OK, Json(json!({ "ok": true, "result": result }))).into_response()
}

pub(crate) fn failure(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "ok": false, "error": error }))).into_response()
}
