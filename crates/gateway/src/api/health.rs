//! Health probe — resource snapshot plus service identity.

use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let resources = state.monitor.status();
    Json(json!({
        "status": if resources.healthy { "healthy" } else { "constrained" },
        "service": "nutrid",
        "version": env!("CARGO_PKG_VERSION"),
        "resources": resources,
    }))
}
