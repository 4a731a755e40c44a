//! HTTP surface of the coordination server.
//!
//! | Path              | Body                                   | Reply                  |
//! |-------------------|----------------------------------------|------------------------|
//! | `POST /register`  | `{pane_id, role, workstream, ticket}`  | `{"ok": true}`         |
//! | `POST /idle`      | `{pane_id}`                            | 200, empty             |
//! | `POST /`, `/mcp`  | JSON-RPC 2.0                           | response, or 202       |
//!
//! Bad bodies get 400, oversized ones 413 and anything else 404.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Coordinator, Registration, MAX_BODY_SIZE};
use crate::ipc::{dispatch, RpcRequest};
use crate::pane::PaneId;

pub const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Deserialize)]
struct IdleSignal {
    pane_id: PaneId,
}

pub fn router(coordinator: Coordinator) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/idle", post(idle))
        .route("/", post(rpc))
        .route("/mcp", post(rpc))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(middleware::from_fn(reject_oversized))
        .with_state(coordinator)
}

fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Refuse bodies whose declared length is over the limit before reading them.
async fn reject_oversized(request: Request, next: Next) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_SIZE as u64) {
        return error_json(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
    }
    next.run(request).await
}

async fn register(State(coordinator): State<Coordinator>, body: Bytes) -> Response {
    match serde_json::from_slice::<Registration>(&body) {
        Ok(registration) => {
            coordinator.register_pane(registration);
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => error_json(StatusCode::BAD_REQUEST, format!("bad request: {e}")),
    }
}

async fn idle(State(coordinator): State<Coordinator>, body: Bytes) -> Response {
    match serde_json::from_slice::<IdleSignal>(&body) {
        Ok(signal) => {
            coordinator.notify_idle(signal.pane_id);
            StatusCode::OK.into_response()
        }
        Err(e) => error_json(StatusCode::BAD_REQUEST, format!("bad request: {e}")),
    }
}

async fn rpc(
    State(coordinator): State<Coordinator>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
        return error_json(StatusCode::BAD_REQUEST, "invalid JSON");
    };
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return error_json(StatusCode::BAD_REQUEST, format!("bad request: {e}"));
        }
    };
    debug!(method = %request.method, "rpc request");

    let Some(response) = dispatch(&coordinator, &request).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut reply = Json(response).into_response();
    if request.method == "initialize" {
        let session = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if let Ok(value) = HeaderValue::from_str(&session) {
            reply.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    reply
}

async fn not_found() -> Response {
    error_json(StatusCode::NOT_FOUND, "not found")
}
