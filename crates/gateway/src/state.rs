use std::sync::Arc;

use nd_domain::config::Config;
use nd_lookup::CompoundResolver;
use nd_monitor::ResourceMonitor;
use nd_policy::PolicyEngine;
use nd_providers::ChatBackend;
use nd_retrieval::{EmbeddingThrottle, RetrievalRouter};
use nd_sessions::{ContextStore, PreferenceStore, SessionStore};

/// Shared application state passed to all API handlers.
///
/// Everything is an explicit dependency injected at construction; the
/// only process-wide atomic state is the monitor's degraded flag.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Resource & policy ────────────────────────────────────────────
    pub monitor: Arc<ResourceMonitor>,
    pub policy: Arc<PolicyEngine>,

    // ── Memory ───────────────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub preferences: Arc<PreferenceStore>,
    pub contexts: Arc<ContextStore>,

    // ── Generation & verification ────────────────────────────────────
    pub backend: Arc<dyn ChatBackend>,
    pub resolver: Arc<CompoundResolver>,

    // ── Retrieval ────────────────────────────────────────────────────
    pub retrieval: Arc<RetrievalRouter>,
    pub throttle: Arc<EmbeddingThrottle>,
}
