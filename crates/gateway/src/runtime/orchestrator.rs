//! The per-request orchestration pipeline.
//!
//! Policy decision → memory update → mode classification → phase
//! selection → retrieval → optional parallel enhancement graph →
//! governed generation → trace emission. Every event reaches the client
//! through the request's [`EventBus`], and every path ends with exactly
//! one terminal event.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use nd_domain::error::{Error, Result};
use nd_domain::modes::{ExecutionProfile, ResponseMode};
use nd_domain::stream::{DoneStatus, StreamEvent};
use nd_lookup::{extract_compound_mentions, extract_ingredient_names};
use nd_policy::{
    classify_response_mode, extract_intent, select_phases, validate_phase_content, ExecutionPolicy,
    PhasePrefs,
};
use nd_scheduler::{AgentNode, DagScheduler, NodeOutcome, PruneConfig};
use nd_sessions::preferences::INJECT_THRESHOLD;
use nd_trace::{AgentInvocation, ExecutionTrace, TraceStatus};

use super::agents;
use super::bus::EventBus;
use super::engine::{GenerationData, ResponseEngine};
use super::memory_extract::{extract_context, extract_preferences};
use crate::state::AppState;

/// Compound registry snapshot baked into every trace.
const REGISTRY_VERSION: &str = "food-compounds-2026.06";
const REGISTRY_HASH: &str = "8c41f2a9d0b7";
const ONTOLOGY_VERSION: &str = "sensory-ont-4";

/// Phase content is truncated to this length on the wire.
const PHASE_WIRE_CHARS: usize = 500;

/// One chat request as the orchestrator sees it.
#[derive(Debug, Clone)]
pub struct ChatInput {
    pub session_id: String,
    pub user_id: String,
    pub message: String,
    pub execution_mode: Option<String>,
    pub audience_mode: String,
    pub optimization_goal: String,
    pub verbosity: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drive one request to its terminal event. Never panics the stream:
/// every error becomes an `error_event` plus a terminal `done`, and a
/// missing terminal is backstopped before the sentinel.
pub async fn run_orchestration(state: AppState, input: ChatInput, bus: EventBus) {
    let result = orchestrate(&state, &input, &bus).await;
    state.monitor.sample_after();

    match result {
        Ok(()) => {
            bus.push_done(DoneStatus::Ok, None).await;
        }
        Err(Error::ResourceExceeded(msg)) => {
            bus.push(StreamEvent::ErrorEvent {
                message: msg.clone(),
                phase: "resource_guard".into(),
                status: "RESOURCE_EXCEEDED".into(),
            })
            .await;
            bus.push_done(DoneStatus::ResourceExceeded, Some(msg)).await;
        }
        Err(e) => {
            let msg = e.to_string();
            tracing::error!(error = %msg, "orchestration failure");
            bus.push(StreamEvent::ErrorEvent {
                message: msg.clone(),
                phase: "orchestration".into(),
                status: "FAILED".into(),
            })
            .await;
            bus.push_done(DoneStatus::Failed, Some(msg)).await;
        }
    }

    if !bus.done_was_sent() {
        tracing::warn!("development warning: no terminal event emitted, forcing one");
        bus.push_done(DoneStatus::Ok, None).await;
    }
    bus.sentinel().await;
}

async fn orchestrate(state: &AppState, input: &ChatInput, bus: &EventBus) -> Result<()> {
    // Decay check before anything else: a decayed session streams a
    // reset marker first.
    if state.sessions.check_and_reset_decay(&input.session_id) {
        bus.push_status("reset", "New environment initialized.", None)
            .await;
    }

    bus.push_status("initializing", "Connecting to the engine...", None)
        .await;

    // Resource gate, then the pre-request VRAM sample for the leak watch.
    state.monitor.check_budget("orchestration", true)?;
    state.monitor.sample_before();

    // Policy decision: sub-millisecond, before any heavy lifting.
    let policy = state
        .policy
        .decide(&input.message, input.execution_mode.as_deref());

    bus.push_status("starting", &format!("Thinking ({})...", policy.profile), None)
        .await;

    // The profile's total latency budget bounds the whole pipeline.
    let budget = Duration::from_secs_f64(policy.latency_budget.total);
    match tokio::time::timeout(budget, execute_pipeline(state, input, bus, &policy)).await {
        Ok(result) => result,
        Err(_) => Err(Error::ResourceExceeded(format!(
            "latency budget of {:.0}s exhausted",
            policy.latency_budget.total
        ))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn execute_pipeline(
    state: &AppState,
    input: &ChatInput,
    bus: &EventBus,
    policy: &ExecutionPolicy,
) -> Result<()> {
    let engine = ResponseEngine::new(
        state.backend.clone(),
        state.sessions.clone(),
        state.config.sessions.history_limit,
    );

    // ── Trace setup ────────────────────────────────────────────────
    let run_id = format!("run_{}", uuid::Uuid::new_v4().simple());
    let mut trace = ExecutionTrace::new(&input.session_id, &run_id);
    trace.lock_versions(REGISTRY_VERSION, REGISTRY_HASH, ONTOLOGY_VERSION);
    trace.set_policy(
        "evidence-v1",
        env!("CARGO_PKG_VERSION"),
        &policy_hash(policy),
        policy
            .downgraded_reason
            .as_deref()
            .unwrap_or("keyword_routing"),
    );
    trace.system_audit = json!({
        "rag": "enabled",
        "model": engine.model_name(),
        "profile": policy.profile.as_str(),
        "audience_mode": input.audience_mode,
        "verbosity": input.verbosity,
    });
    trace.status = TraceStatus::Streaming;

    // ── Context preparation ────────────────────────────────────────
    let history = state
        .sessions
        .history(&input.session_id, state.config.sessions.history_limit);
    let augmented_query = if history.is_empty() {
        input.message.clone()
    } else {
        let mut context = String::from("Previous Interaction Context:\n");
        for entry in &history {
            let label = if entry.role == "user" { "USER" } else { "ASSISTANT" };
            context.push_str(&format!("{label}: {}\n", entry.content));
        }
        format!("{context}\nUSER: {}", input.message)
    };

    // ── Intent extraction ──────────────────────────────────────────
    bus.push_status("intent", "Understanding...", None).await;
    let invocation = AgentInvocation::start("intent_agent", engine.model_name());
    let mut intent = extract_intent(&input.message);
    intent.ingredients = extract_ingredient_names(&input.message);
    trace.add_invocation(invocation.complete("success", "selected", None));

    // ── Mode classification ────────────────────────────────────────
    let previous_mode = state.sessions.response_mode(&input.session_id);
    let mode = classify_response_mode(&input.message, Some(&intent), previous_mode);

    // ── Memory: preferences (with decay) and session context ───────
    let mut prefs = state.preferences.get(&input.user_id);
    let now = Utc::now();
    if prefs.apply_decay(
        now,
        state.config.sessions.preference_decay_days,
        state.config.sessions.preference_decay_amount,
    ) {
        let decayed = prefs.clone();
        state.preferences.update(&input.user_id, move |p| *p = decayed);
    }

    let invocation = AgentInvocation::start("memory_agent", engine.model_name());
    match extract_preferences(state.backend.as_ref(), &input.message).await {
        Ok(Some(update)) => {
            state
                .preferences
                .update(&input.user_id, |p| p.merge_update(update, now));
            prefs = state.preferences.get(&input.user_id);
            trace.add_invocation(invocation.complete("success", "updates_found", None));
        }
        Ok(None) => {
            trace.add_invocation(invocation.complete("skipped", "no_triggers", None));
        }
        Err(e) => {
            tracing::warn!(error = %e, "preference extraction failed");
            trace.add_invocation(invocation.complete("failed", &e.to_string(), None));
        }
    }

    let session_context = state.contexts.get(&input.session_id);

    // Only confident memory reaches the prompt or the phase selector.
    let preferences_block = prefs.injectable_block(INJECT_THRESHOLD);
    let phase_prefs = prefs.should_inject(INJECT_THRESHOLD).then(|| PhasePrefs {
        skill_level: (prefs.skill_level_confidence >= INJECT_THRESHOLD)
            .then_some(prefs.skill_level)
            .flatten(),
        has_equipment: !prefs.equipment.is_empty(),
    });

    // ── Phase selection ────────────────────────────────────────────
    let phases = select_phases(&input.message, mode, Some(&intent), phase_prefs.as_ref());

    // ── Compound resolution (verification layer) ───────────────────
    let mut names = intent.ingredients.clone();
    for mention in extract_compound_mentions(&input.message) {
        if !names.contains(&mention) {
            names.push(mention);
        }
    }
    if names.is_empty() {
        names = session_context.key_ingredients.clone();
    }

    let resolution = if names.is_empty() {
        None
    } else {
        let invocation = AgentInvocation::start("compound_resolver", "lookup");
        let result = state.resolver.resolve_ingredients(&names).await;
        trace.set_pubchem_enforcement(&result);
        let status = if result.resolved.is_empty() { "skipped" } else { "success" };
        trace.add_invocation(invocation.complete(status, "selected", None));
        Some(result)
    };

    let mut data = GenerationData {
        preferences_block,
        session_context: session_context.clone(),
        resolution,
        ..Default::default()
    };

    // ── Zero-phase path ────────────────────────────────────────────
    if phases.is_empty() {
        if mode == ResponseMode::Conversation {
            bus.push_status("conversation", "Chatting...", None).await;
        } else {
            bus.push_status("generating", "Thinking...", None).await;
        }
        tracing::info!("zero-phase path: direct response generation");
        engine
            .generate(bus, &input.session_id, &input.message, mode, &data, &mut trace)
            .await?;
        finish(state, input, bus, &mut trace).await?;
        return Ok(());
    }

    // ── Multi-phase path ───────────────────────────────────────────
    bus.push_status("retrieval", "Researching...", None).await;
    let docs = state
        .retrieval
        .retrieve(&augmented_query, 6)
        .await
        .unwrap_or_default();

    let mut valid_phases = 0usize;
    for phase in &phases {
        let phase_start = std::time::Instant::now();
        bus.push_status(&format!("phase_{phase}"), &format!("{phase}..."), None)
            .await;

        let invocation = AgentInvocation::start(format!("phase_{phase}"), engine.model_name());
        match engine
            .synthesize_phase(*phase, &augmented_query, &docs, &intent)
            .await
        {
            Ok(content) if validate_phase_content(*phase, &content) => {
                valid_phases += 1;
                let duration_ms = phase_start.elapsed().as_millis() as u64;
                bus.push(StreamEvent::ThinkingPhase {
                    phase_type: phase.as_str().to_string(),
                    content: truncate_chars(&content, PHASE_WIRE_CHARS),
                    duration_ms,
                })
                .await;
                data.phase_results.insert(phase.as_str().to_string(), content);
                trace.add_invocation(invocation.complete("success", "selected", None));
            }
            Ok(_) => {
                tracing::warn!(phase = %phase, "phase dropped: content validation failed");
                trace.add_invocation(invocation.complete(
                    "skipped",
                    "content_validation_failed",
                    None,
                ));
            }
            Err(e) => {
                tracing::warn!(phase = %phase, error = %e, "phase generation failed");
                trace.add_invocation(invocation.complete("failed", &e.to_string(), None));
            }
        }
    }

    // All phases dropped: revert to the zero-phase path.
    if valid_phases == 0 {
        tracing::info!("all phases failed validation, falling back to direct response");
        bus.push_status("generating", "Thinking...", None).await;
        engine
            .generate(bus, &input.session_id, &input.message, mode, &data, &mut trace)
            .await?;
        finish(state, input, bus, &mut trace).await?;
        return Ok(());
    }

    // ── Parallel enhancement graph (non-fast profiles) ─────────────
    if policy.profile != ExecutionProfile::Fast {
        bus.push_status("enhancement", "Analyzing & Refining...", None)
            .await;
        trace.status = TraceStatus::Enriching;
        let outcomes = run_enhancement_graph(state, input, policy, &data).await?;

        for (name, outcome) in outcomes {
            let invocation = AgentInvocation::start(name.clone(), engine.model_name());
            match outcome {
                NodeOutcome::Completed(value) => {
                    if matches!(name.as_str(), "sensory_model" | "explanation") {
                        bus.push(StreamEvent::Enhancement {
                            payload: json!({ name.clone(): value.clone() }),
                            message: format!("{name} complete."),
                        })
                        .await;
                    }
                    data.enhancements.insert(name, value);
                    trace.add_invocation(invocation.complete("success", "selected", None));
                }
                NodeOutcome::Failed(reason) => {
                    trace.add_invocation(invocation.complete("failed", &reason, None));
                }
                NodeOutcome::Cancelled => {
                    trace.add_invocation(invocation.complete("skipped", "cancelled", None));
                }
            }
        }
    }

    // ── Final presentation ─────────────────────────────────────────
    bus.push_status("finalizing", "Plating your response...", None)
        .await;
    engine
        .generate(bus, &input.session_id, &input.message, mode, &data, &mut trace)
        .await?;
    finish(state, input, bus, &mut trace).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enhancement graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_enhancement_graph(
    state: &AppState,
    input: &ChatInput,
    policy: &ExecutionPolicy,
    data: &GenerationData,
) -> Result<Vec<(String, NodeOutcome)>> {
    let subject: String = if data.phase_results.is_empty() {
        input.message.clone()
    } else {
        data.phase_results
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut dag = DagScheduler::new();
    let backend = state.backend.clone();

    if policy.agent_enabled("sensory_model") {
        let backend = backend.clone();
        let prompt = agents::sensory_prompt(&subject);
        dag.add_node(AgentNode::new("sensory_model", move |_| {
            agents::run_agent(backend, "sensory_model", prompt)
        }));
    }

    {
        let backend = backend.clone();
        let prompt = agents::verification_prompt(&subject);
        dag.add_node(AgentNode::new("verification", move |_| {
            agents::run_agent(backend, "verification", prompt)
        }));
    }

    if policy.agent_enabled("explanation") {
        let backend = backend.clone();
        let audience = input.audience_mode.clone();
        dag.add_node(
            AgentNode::new("explanation", move |args: Vec<Value>| {
                let sensory = args.first().cloned().unwrap_or(Value::Null);
                agents::run_agent(
                    backend,
                    "explanation",
                    agents::explanation_prompt(&sensory, &audience),
                )
            })
            .arg_from("sensory_model")
            .depends_on(["sensory_model"]),
        );
    }

    if policy.agent_enabled("frontier") {
        let backend = backend.clone();
        let prompt = agents::frontier_prompt(&subject);
        dag.add_node(
            AgentNode::new("frontier", move |_| {
                agents::run_agent(backend, "frontier", prompt)
            })
            .luxury(),
        );

        let backend = state.backend.clone();
        let goal = input.optimization_goal.clone();
        dag.add_node(
            AgentNode::new("selector", move |args: Vec<Value>| {
                let frontier = args.first().cloned().unwrap_or(Value::Null);
                agents::run_agent(backend, "selector", agents::selector_prompt(&frontier, &goal))
            })
            .arg_from("frontier")
            .depends_on(["frontier"])
            .luxury(),
        );
    }

    if policy.speculative_agents.contains("recipe_renderer") {
        let backend = state.backend.clone();
        let prompt = agents::renderer_prompt(&subject);
        dag.add_node(
            AgentNode::new("recipe_renderer", move |_| {
                agents::run_agent(backend, "recipe_renderer", prompt)
            })
            .speculative()
            .priority(5),
        );
    }

    let prune = PruneConfig {
        enabled_agents: policy
            .enabled_agents
            .iter()
            .chain(policy.speculative_agents.iter())
            .cloned()
            .collect::<BTreeSet<String>>(),
        prune_speculative: state.monitor.is_degraded(),
    };

    let outcomes = dag.execute(&prune).await?;
    Ok(outcomes.into_iter().collect())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trace emission & wrap-up
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Emit the execution trace and nutrition report, then persist any
/// fresh session context. Runs before the terminal event on every
/// success path.
async fn finish(
    state: &AppState,
    input: &ChatInput,
    bus: &EventBus,
    trace: &mut ExecutionTrace,
) -> Result<()> {
    trace.status = TraceStatus::Complete;
    let trace_value = trace.to_value()?;
    bus.push(StreamEvent::ExecutionTrace { trace: trace_value }).await;

    bus.push(StreamEvent::NutritionReport {
        report: nutrition_report(input, trace),
    })
    .await;

    if let Some(context) = extract_context(&input.message) {
        state.contexts.replace(&input.session_id, context);
    }
    Ok(())
}

fn nutrition_report(input: &ChatInput, trace: &ExecutionTrace) -> Value {
    let verified_claims = trace.claims().iter().filter(|c| c.verified).count();
    json!({
        "session_id": input.session_id,
        "confidence_score": trace.confidence_score,
        "final_confidence": trace.final_confidence,
        "compounds_resolved": trace.compounds.len(),
        "compounds_unverified": trace.enforcement_failures.len(),
        "unverified_list": trace.enforcement_failures,
        "proof_hash": trace.proof_hash,
        "verified_claims": verified_claims,
        "total_claims": trace.claims().len(),
        "claims": trace.claims(),
        "variance_drivers": trace.variance_drivers,
        "summary": format!(
            "Nutrition verified via compound lookup ({} compounds, {} verifiable claims)",
            trace.compounds.len(),
            trace.claims().len(),
        ),
    })
}

/// Fingerprint of the policy decision for the accountability block.
fn policy_hash(policy: &ExecutionPolicy) -> String {
    let serialized = serde_json::to_string(policy).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    hex::encode(digest)[..12].to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
