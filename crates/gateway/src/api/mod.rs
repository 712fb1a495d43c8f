//! HTTP surface.
//!
//! - `GET  /api/conversation`   — canonical session state for hydration
//! - `POST /api/conversation`   — mint a session id, claim ownership
//! - `DELETE /api/conversation` — owner-only hard delete
//! - `GET  /api/conversations`  — owner's sessions, last-active first
//! - `GET  /api/chat/stream`    — SSE chat (EventSource-friendly)
//! - `POST /api/chat`           — SSE chat with a JSON body
//! - `GET  /health`             — resource snapshot
//!
//! Ownership is enforced on every session-scoped endpoint via the
//! `X-User-Id` header; a missing or mismatched id is a 403.

pub mod chat;
pub mod conversation;
pub mod health;

use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/conversation",
            get(conversation::get_conversation)
                .post(conversation::create_conversation)
                .delete(conversation::delete_conversation),
        )
        .route("/api/conversations", get(conversation::list_conversations))
        .route("/api/chat/stream", get(chat::chat_stream))
        .route("/api/chat", post(chat::chat_post))
        .route("/health", get(health::health))
}

/// Resolve the calling user from the `X-User-Id` header. Missing header
/// means no ownership can be established: 403.
pub(crate) fn require_user_id(
    headers: &HeaderMap,
) -> Result<String, (StatusCode, Json<serde_json::Value>)> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "missing user id header" })),
        ))
}

/// Map a domain error onto the HTTP layer.
pub(crate) fn error_response(
    error: nd_domain::error::Error,
) -> (StatusCode, Json<serde_json::Value>) {
    use nd_domain::error::Error;
    let status = match &error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::ResourceExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": error.to_string() })))
}
