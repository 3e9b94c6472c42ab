//! `POST /invoke`: validate the request, route it to the tool's handler, wrap the outcome.
//!
//! The handler runs in its own task. A panic surfaces as a failed join (500), and the task keeps
//! running when the caller disconnects; its result is then discarded.

use super::{AppState, failure, success};
use crate::error::ToolError;
use crate::registry::{Args, RequestContext};
use axum::Extension;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, PartialEq)]
pub(crate) struct InvokeRequest {
    pub tool: String,
    pub args: Args,
}

/// Parse a dispatch body into the tool name and its arguments.
pub(crate) fn parse_request(body: &[u8]) -> Result<InvokeRequest, (StatusCode, &'static str)> {
    const MISSING_TOOL: (StatusCode, &str) = (StatusCode::BAD_REQUEST, "missing tool");

    let Ok(Value::Object(mut body)) = serde_json::from_slice::<Value>(body) else {
        return Err(MISSING_TOOL);
    };
    let tool = match body.remove("tool") {
        Some(Value::String(tool)) if !tool.is_empty() => tool,
        _ => return Err(MISSING_TOOL),
    };
    let args = match body.remove("args") {
        None | Some(Value::Null) => Args::new(),
        Some(Value::Object(args)) => args,
        Some(_) => return Err((StatusCode::BAD_REQUEST, "args must be an object")),
    };
    Ok(InvokeRequest { tool, args })
}

pub(crate) async fn invoke(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return failure(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
        }
        Err(_) => return failure(StatusCode::BAD_REQUEST, "missing tool"),
    };
    let InvokeRequest { tool, args } = match parse_request(&body) {
        Ok(request) => request,
        Err((status, message)) => return failure(status, message),
    };
    let Some(handler) = state.server.handler(&tool) else {
        warn!(tool = %tool, "unknown tool");
        return failure(StatusCode::NOT_FOUND, "unknown tool");
    };

    let started = Instant::now();
    let ctx = RequestContext::new(headers);
    let outcome = tokio::spawn(async move { handler.call(args, ctx).await }).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(Ok(result)) => {
            info!(tool = %tool, status = 200, elapsed_ms, "tool call");
            success(result)
        }
        Ok(Err(err)) => {
            let status = err.status();
            match &err {
                ToolError::Backend(_) => {
                    error!(
                        tool = %tool,
                        status = status.as_u16(),
                        elapsed_ms,
                        error = %err,
                        "tool call failed"
                    );
                }
                ToolError::Policy(_) | ToolError::InvalidArgs(_) => {
                    warn!(
                        tool = %tool,
                        status = status.as_u16(),
                        elapsed_ms,
                        kind = err.kind(),
                        error = %err,
                        "tool call rejected"
                    );
                }
            }
            failure(status, &err.to_string())
        }
        Err(join) => {
            error!(tool = %tool, status = 500, elapsed_ms, error = %join, "tool handler aborted");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
