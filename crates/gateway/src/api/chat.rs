//! Chat endpoints — both shapes stream SSE.
//!
//! `GET /api/chat/stream` exists for EventSource clients: query params
//! only, no preflight. `POST /api/chat` accepts the richer JSON body.
//! Sessions are lazily created on first use; the poster becomes owner.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::runtime::{sse_stream, ChatInput};
use crate::state::AppState;

use super::require_user_id;

fn d_casual() -> String {
    "casual".into()
}
fn d_comfort() -> String {
    "comfort".into()
}
fn d_medium() -> String {
    "medium".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub execution_mode: Option<String>,
    #[serde(default = "d_casual")]
    pub audience_mode: String,
    #[serde(default = "d_comfort")]
    pub optimization_goal: String,
    #[serde(default = "d_medium")]
    pub verbosity: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChatPreferences {
    #[serde(default = "d_casual")]
    pub audience_mode: String,
    #[serde(default = "d_comfort")]
    pub optimization_goal: String,
    #[serde(default = "d_medium")]
    pub verbosity: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub preferences: Option<ChatPreferences>,
    #[serde(default)]
    pub execution_mode: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET-based SSE endpoint for EventSource compatibility.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Response {
    let input = ChatInput {
        session_id: params.session_id.unwrap_or_default(),
        user_id: String::new(),
        message: params.message,
        execution_mode: params.execution_mode,
        audience_mode: params.audience_mode,
        optimization_goal: params.optimization_goal,
        verbosity: params.verbosity,
    };
    start_chat(state, headers, input)
}

/// POST endpoint for rich payloads. Same stream contract.
pub async fn chat_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    let prefs = body.preferences.unwrap_or(ChatPreferences {
        audience_mode: d_casual(),
        optimization_goal: d_comfort(),
        verbosity: d_medium(),
    });
    let input = ChatInput {
        session_id: body.session_id.unwrap_or_default(),
        user_id: String::new(),
        message: body.message,
        execution_mode: body.execution_mode,
        audience_mode: prefs.audience_mode,
        optimization_goal: prefs.optimization_goal,
        verbosity: prefs.verbosity,
    };
    start_chat(state, headers, input)
}

/// Shared pre-flight: ownership, lazy session creation, then the SSE
/// stream. HTTP-level failures return plain 4xx without starting a
/// stream.
fn start_chat(state: AppState, headers: HeaderMap, mut input: ChatInput) -> Response {
    let user_id = match require_user_id(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };

    if input.session_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "session_id is required" })),
        )
            .into_response();
    }
    if input.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "message is required" })),
        )
            .into_response();
    }

    // Lazy creation: an unknown session id is created and claimed by
    // the poster. A known one must belong to them.
    let (entry, is_new) = state.sessions.resolve_or_create(&input.session_id, &user_id);
    if !is_new && entry.owner_id != user_id {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "error": "session belongs to another user" })),
        )
            .into_response();
    }
    state.sessions.touch(&input.session_id);
    input.user_id = user_id;

    tracing::info!(
        session_id = %input.session_id,
        message_len = input.message.len(),
        "chat stream starting"
    );

    let mut response = Sse::new(sse_stream(state, input)).into_response();
    let headers = response.headers_mut();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}
