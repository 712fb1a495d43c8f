//! HTTP-layer contract: ownership enforcement, new-session markers, and
//! the health probe. Uses the router directly via `tower::ServiceExt`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use nd_domain::config::Config;
use nd_domain::error::Result;
use nd_domain::stream::{BoxStream, LlmEvent};
use nd_gateway::api;
use nd_gateway::indexes::MonitorGate;
use nd_gateway::state::AppState;
use nd_lookup::{CompoundResolver, LookupClient};
use nd_monitor::ResourceMonitor;
use nd_policy::PolicyEngine;
use nd_providers::{ChatBackend, ChatRequest};
use nd_retrieval::{
    EmbeddingThrottle, IndexKind, IndexLoader, IndexManager, RetrievalRouter, VectorIndex,
};
use nd_sessions::{ContextStore, PreferenceStore, SessionStore};

struct SilentBackend;

#[async_trait::async_trait]
impl ChatBackend for SilentBackend {
    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<LlmEvent>>> {
        Ok(Box::pin(async_stream::stream! {
            yield Ok(LlmEvent::Token { text: "ok".into() });
            yield Ok(LlmEvent::Done { usage: None, finish_reason: Some("stop".into()) });
        }))
    }

    fn model_name(&self) -> &str {
        "silent"
    }
}

struct EmptyLoader;
impl IndexLoader for EmptyLoader {
    fn load(&self, kind: IndexKind) -> Result<Arc<dyn VectorIndex>> {
        Err(nd_domain::error::Error::NotFound(kind.as_str().into()))
    }
}

fn build_state(dir: &std::path::Path) -> AppState {
    let mut config = Config::default();
    config.sessions.state_path = dir.to_path_buf();
    config.monitor.max_ram_percent = 100.0;
    config.lookup.base_url = "http://127.0.0.1:9".into();
    config.lookup.max_retries = 0;
    let config = Arc::new(config);

    let monitor = Arc::new(ResourceMonitor::new(config.monitor.clone(), None));
    let policy = Arc::new(PolicyEngine::new(config.policy.clone(), monitor.clone()));
    let sessions = Arc::new(
        SessionStore::new(&config.sessions.state_path, config.sessions.decay_hours).unwrap(),
    );
    let preferences = Arc::new(PreferenceStore::new(&config.sessions.state_path).unwrap());
    let contexts = Arc::new(ContextStore::new(&config.sessions.state_path).unwrap());
    let resolver = Arc::new(CompoundResolver::new(
        LookupClient::new(&config.lookup).unwrap(),
    ));
    let gate = Arc::new(MonitorGate::new(monitor.clone()));
    let manager = Arc::new(IndexManager::new(Arc::new(EmptyLoader), gate));
    let throttle = Arc::new(EmbeddingThrottle::new(2));
    let retrieval = Arc::new(RetrievalRouter::new(manager, throttle.clone()));

    AppState {
        config,
        monitor,
        policy,
        sessions,
        preferences,
        contexts,
        backend: Arc::new(SilentBackend),
        resolver,
        retrieval,
        throttle,
    }
}

fn app(state: AppState) -> axum::Router {
    api::router().with_state(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_status_and_resources() {
    let dir = tempfile::TempDir::new().unwrap();
    let response = app(build_state(dir.path()))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "nutrid");
    assert!(body["resources"]["ram_percent"].is_number());
    assert!(body["status"] == "healthy" || body["status"] == "constrained");
}

#[tokio::test]
async fn missing_user_header_is_forbidden() {
    let dir = tempfile::TempDir::new().unwrap();
    let response = app(build_state(dir.path()))
        .oneshot(
            Request::get("/api/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn empty_session_id_returns_new_session_marker() {
    let dir = tempfile::TempDir::new().unwrap();
    let response = app(build_state(dir.path()))
        .oneshot(
            Request::get("/api/conversation")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "new_session");
}

#[tokio::test]
async fn cross_user_access_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = build_state(dir.path());
    state.sessions.resolve_or_create("sess_owned", "user-1");

    let response = app(state)
        .oneshot(
            Request::get("/api/conversation?session_id=sess_owned")
                .header("X-User-Id", "user-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_then_list_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = build_state(dir.path());

    let response = app(state.clone())
        .oneshot(
            Request::post("/api/conversation")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let session_id = created["session_id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "created");

    let response = app(state)
        .oneshot(
            Request::get("/api/conversations")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listing = body_json(response).await;
    let sessions = listing["conversations"].as_array().unwrap();
    assert!(sessions.iter().any(|s| s["session_id"] == session_id.as_str()));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let dir = tempfile::TempDir::new().unwrap();
    let response = app(build_state(dir.path()))
        .oneshot(
            Request::get("/api/conversation?session_id=sess_ghost")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_requires_session_id() {
    let dir = tempfile::TempDir::new().unwrap();
    let response = app(build_state(dir.path()))
        .oneshot(
            Request::get("/api/chat/stream?message=hello")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_is_owner_scoped() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = build_state(dir.path());
    state.sessions.resolve_or_create("sess_del", "user-1");

    let response = app(state.clone())
        .oneshot(
            Request::delete("/api/conversation?session_id=sess_del")
                .header("X-User-Id", "user-2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(state.clone())
        .oneshot(
            Request::delete("/api/conversation?session_id=sess_del")
                .header("X-User-Id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.sessions.get("sess_del").is_none());
}
