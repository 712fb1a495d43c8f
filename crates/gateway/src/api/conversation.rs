//! Session CRUD and hydration endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

use super::{error_response, require_user_id};

#[derive(Debug, Deserialize)]
pub struct ConversationParams {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Canonical conversation state for client hydration. An absent or
/// empty session id returns a new-session marker instead of an error.
pub async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConversationParams>,
) -> Response {
    let user_id = match require_user_id(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };

    let Some(session_id) = params.session_id.filter(|s| !s.is_empty()) else {
        return Json(json!({ "messages": [], "status": "new_session" })).into_response();
    };

    if let Err(e) = state.sessions.authorize(&session_id, &user_id) {
        return error_response(e).into_response();
    }

    state.sessions.check_and_reset_decay(&session_id);
    let messages = state
        .sessions
        .history(&session_id, state.config.sessions.history_limit);
    let mode = state.sessions.response_mode(&session_id);

    Json(json!({
        "session_id": session_id,
        "messages": messages,
        "current_mode": mode,
        "memory_scope": "session",
    }))
    .into_response()
}

/// List the caller's sessions, most recently active first.
pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user_id = match require_user_id(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };
    Json(json!({ "conversations": state.sessions.list(&user_id) })).into_response()
}

/// Explicitly mint a new session id owned by the caller.
pub async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let user_id = match require_user_id(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };
    let entry = state.sessions.create(&user_id);
    Json(json!({ "session_id": entry.session_id, "status": "created" })).into_response()
}

/// Hard-delete a session. Owner only.
pub async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConversationParams>,
) -> Response {
    let user_id = match require_user_id(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };
    let Some(session_id) = params.session_id.filter(|s| !s.is_empty()) else {
        return error_response(nd_domain::error::Error::InvalidInput(
            "session_id is required".into(),
        ))
        .into_response();
    };

    match state.sessions.delete(&session_id, &user_id) {
        Ok(()) => {
            state.contexts.clear(&session_id);
            Json(json!({ "session_id": session_id, "status": "deleted" })).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}
