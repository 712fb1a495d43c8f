use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use nd_domain::config::{Config, ConfigSeverity};
use nd_gateway::api;
use nd_gateway::cli::{self, Cli, Command};
use nd_gateway::indexes::{FsIndexLoader, MonitorGate};
use nd_gateway::state::AppState;
use nd_lookup::{CompoundResolver, LookupClient};
use nd_monitor::ResourceMonitor;
use nd_policy::PolicyEngine;
use nd_providers::OpenAiCompatBackend;
use nd_retrieval::{EmbeddingThrottle, IndexManager, RetrievalRouter};
use nd_sessions::{ContextStore, PreferenceStore, SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            run_server(Arc::new(config)).await
        }
        Some(Command::Health) => {
            std::process::exit(cli::health::run(&config));
        }
        Some(Command::Ingest { dataset, force }) => {
            std::process::exit(cli::ingest::run(&config, &dataset, force));
        }
        Some(Command::Validate { samples }) => {
            std::process::exit(cli::validate::run(&config, samples).await);
        }
    }
}

/// Structured JSON tracing for the serve command.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nd_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "nutrid starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Resource monitor & policy engine ─────────────────────────────
    let monitor = Arc::new(ResourceMonitor::new(config.monitor.clone(), None));
    let policy = Arc::new(PolicyEngine::new(config.policy.clone(), monitor.clone()));
    tracing::info!("resource monitor and policy engine ready");

    // ── Memory stores ────────────────────────────────────────────────
    let state_path = &config.sessions.state_path;
    let sessions = Arc::new(
        SessionStore::new(state_path, config.sessions.decay_hours)
            .context("initializing session store")?,
    );
    let preferences =
        Arc::new(PreferenceStore::new(state_path).context("initializing preference store")?);
    let contexts = Arc::new(ContextStore::new(state_path).context("initializing context store")?);
    tracing::info!(path = %state_path.display(), "memory stores ready");

    // ── LLM backend ──────────────────────────────────────────────────
    let backend = Arc::new(
        OpenAiCompatBackend::new(&config.llm).context("initializing chat backend")?,
    );
    tracing::info!(
        base_url = %config.llm.base_url,
        model = %config.llm.model,
        "chat backend ready"
    );

    // ── Compound lookup ──────────────────────────────────────────────
    let lookup_client =
        LookupClient::new(&config.lookup).context("initializing lookup client")?;
    let resolver = Arc::new(CompoundResolver::new(lookup_client));
    tracing::info!(base_url = %config.lookup.base_url, "compound resolver ready");

    // ── Retrieval ────────────────────────────────────────────────────
    let loader = Arc::new(FsIndexLoader::new(config.retrieval.index_root.clone()));
    let gate = Arc::new(MonitorGate::new(monitor.clone()));
    let manager = Arc::new(IndexManager::new(loader, gate));
    let throttle = Arc::new(EmbeddingThrottle::new(config.retrieval.embed_concurrency));
    let retrieval = Arc::new(RetrievalRouter::new(manager, throttle.clone()));
    tracing::info!(root = %config.retrieval.index_root.display(), "retrieval ready");

    // ── HTTP surface ─────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        monitor,
        policy,
        sessions,
        preferences,
        contexts,
        backend,
        resolver,
        retrieval,
        throttle,
    };

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true);

    let app = api::router().layer(cors).with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
