//! Unified response engine.
//!
//! Same persona, different modes: every path assembles a mode-specific
//! prompt, streams tokens through the artifact scrubber onto the event
//! bus, applies the nutrition governance pass to the assembled text,
//! persists the turn, and closes the claim-integrity loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use nd_domain::error::Result;
use nd_domain::intent::Intent;
use nd_domain::modes::{ResponseMode, ThinkingPhase};
use nd_domain::stream::{LlmEvent, StreamEvent};
use nd_lookup::ResolutionResult;
use nd_providers::{collect_stream, ChatBackend, ChatMessage, ChatRequest, TokenScrubber};
use nd_retrieval::Hit;
use nd_sessions::{SessionContext, SessionStore};
use nd_trace::{extract_recovery_claims, narrative_asserts_mechanism, ClaimParser, ExecutionTrace};

use super::bus::EventBus;
use super::governance::StreamGovernor;
use super::persona;

/// Hard cap on the tier-2 LLM claim extraction.
const CLAIM_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(25);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generation inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the final generation can draw on.
#[derive(Debug, Default)]
pub struct GenerationData {
    pub phase_results: BTreeMap<String, String>,
    pub enhancements: BTreeMap<String, Value>,
    /// Confidence-filtered preference block, at most one copy.
    pub preferences_block: Option<String>,
    pub session_context: SessionContext,
    /// Verified compound data from the lookup layer.
    pub resolution: Option<ResolutionResult>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ResponseEngine {
    backend: Arc<dyn ChatBackend>,
    sessions: Arc<SessionStore>,
    history_limit: usize,
}

impl ResponseEngine {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        sessions: Arc<SessionStore>,
        history_limit: usize,
    ) -> Self {
        Self {
            backend,
            sessions,
            history_limit,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    // ── Prompt assembly ────────────────────────────────────────────

    /// Mode persona ⨁ mode constraints ⨁ confidence policy (numeric)
    /// ⨁ verified-compound block ⨁ phase/enhancement context ⨁ memory.
    pub fn build_prompt(&self, mode: ResponseMode, data: &GenerationData) -> String {
        let constraints = match mode {
            ResponseMode::Conversation => persona::CONVERSATION_CONSTRAINTS,
            ResponseMode::Diagnostic => persona::DIAGNOSTIC_CONSTRAINTS,
            ResponseMode::Procedural => persona::PROCEDURAL_CONSTRAINTS,
            ResponseMode::NumericAnalysis => persona::NUMERIC_ANALYSIS_CONSTRAINTS,
        };

        let mut prompt = format!("{}\n\n{}", persona::CORE_PERSONA, constraints);

        if mode == ResponseMode::NumericAnalysis {
            prompt.push_str("\n\n");
            prompt.push_str(persona::NUMERIC_CONFIDENCE_POLICY);
        }

        if let Some(resolution) = data.resolution.as_ref().filter(|r| !r.resolved.is_empty()) {
            prompt.push_str(
                "\n\nVERIFIED COMPOUND INTELLIGENCE:\n\
                 The following compounds were verified via the external \
                 lookup service. Use ONLY these facts for chemical claims.\n",
            );
            for compound in &resolution.resolved {
                prompt.push_str(&format!(
                    "- {} (CID: {}): {}, MW: {}\n",
                    compound.name,
                    compound.cid,
                    compound
                        .properties
                        .molecular_formula
                        .as_deref()
                        .unwrap_or("N/A"),
                    compound
                        .properties
                        .molecular_weight
                        .map(|w| w.to_string())
                        .unwrap_or_else(|| "N/A".into()),
                ));
            }
        }

        if !data.phase_results.is_empty() {
            prompt.push_str("\n\nREASONING CONTEXT (from earlier phases):\n");
            for (phase, content) in &data.phase_results {
                prompt.push_str(&format!("[{phase}] {content}\n"));
            }
        }

        if !data.enhancements.is_empty() {
            prompt.push_str("\n\nENHANCEMENT RESULTS:\n");
            for (agent, value) in &data.enhancements {
                prompt.push_str(&format!("[{agent}] {value}\n"));
            }
        }

        if let Some(block) = &data.preferences_block {
            prompt.push_str("\n\n");
            prompt.push_str(block);
        }

        if !data.session_context.is_empty() {
            prompt.push_str("\n\nCURRENT SESSION CONTEXT:\n");
            if let Some(dish) = &data.session_context.current_dish {
                prompt.push_str(&format!("- Working on: {dish}\n"));
            }
            if !data.session_context.key_ingredients.is_empty() {
                prompt.push_str(&format!(
                    "- Key ingredients: {}\n",
                    data.session_context.key_ingredients.join(", ")
                ));
            }
            if let Some(technique) = &data.session_context.technique {
                prompt.push_str(&format!("- Technique: {technique}\n"));
            }
        }

        prompt.push_str("\n\n");
        prompt.push_str(persona::MICRO_PLANNING);
        prompt
    }

    // ── Final generation ───────────────────────────────────────────

    /// Stream the final response onto the bus and return the governed
    /// text. Persists both turns, updates the session mode, and closes
    /// the claim-integrity loop on the trace.
    pub async fn generate(
        &self,
        bus: &EventBus,
        session_id: &str,
        user_message: &str,
        mode: ResponseMode,
        data: &GenerationData,
        trace: &mut ExecutionTrace,
    ) -> Result<String> {
        tracing::info!(mode = %mode, "generating response");
        let system_prompt = self.build_prompt(mode, data);

        let mut messages = vec![ChatMessage::system(system_prompt)];
        for entry in self.sessions.history(session_id, self.history_limit) {
            messages.push(ChatMessage {
                role: entry.role,
                content: entry.content,
            });
        }
        messages.push(ChatMessage::user(user_message));

        let request = ChatRequest {
            messages,
            temperature: Some(0.4),
            max_tokens: None,
            model: None,
        };

        // Stream tokens through the scrubber, then the governor, onto
        // the bus. The governor holds tokens to a sentence boundary so
        // nothing ungoverned is ever emitted; the persisted turn is the
        // exact text the client saw.
        use futures_util::StreamExt;
        let mut stream = self.backend.chat_stream(&request).await?;
        let mut scrubber = TokenScrubber::new();
        let mut governor = StreamGovernor::new(mode);
        let mut response = String::new();
        let mut output_tokens: u32 = 0;

        let mut emit = |chunk: String| {
            if chunk.is_empty() {
                return None;
            }
            response.push_str(&chunk);
            Some(StreamEvent::Token { text: chunk })
        };

        while let Some(event) = stream.next().await {
            match event? {
                LlmEvent::Token { text } => {
                    output_tokens += 1;
                    let clean = scrubber.scrub(&text);
                    if clean.is_empty() {
                        continue;
                    }
                    if let Some(chunk) = governor.feed(&clean) {
                        if let Some(token) = emit(chunk) {
                            bus.push(token).await;
                        }
                    }
                }
                LlmEvent::Thinking { .. } => {}
                LlmEvent::Done { .. } => break,
                LlmEvent::Error { message } => {
                    return Err(nd_domain::error::Error::Upstream {
                        service: "llm".into(),
                        message,
                    });
                }
            }
        }

        // Drain both stages: the scrubber's held-back bytes feed the
        // governor, then the governor releases its final sentences.
        let tail = scrubber.finish();
        if !tail.is_empty() {
            if let Some(chunk) = governor.feed(&tail) {
                if let Some(token) = emit(chunk) {
                    bus.push(token).await;
                }
            }
        }
        if let Some(token) = emit(governor.finish()) {
            bus.push(token).await;
        }
        tracing::debug!(output_tokens, "generation stream finished");

        // Claim integrity: recover claims when the narrative asserts
        // mechanism with an empty trace.
        self.finalize_claims(&response, trace).await;

        self.sessions
            .add_message(session_id, "user", user_message, None);
        let trace_payload = trace.to_value().ok();
        self.sessions
            .add_message(session_id, "assistant", &response, trace_payload);
        self.sessions.set_response_mode(session_id, mode);

        Ok(response)
    }

    // ── Phase synthesis ────────────────────────────────────────────

    /// Generate one thinking phase (non-streamed): content for a single
    /// semantic block, validated by the caller before acceptance.
    pub async fn synthesize_phase(
        &self,
        phase: ThinkingPhase,
        query: &str,
        docs: &[Hit],
        intent: &Intent,
    ) -> Result<String> {
        let contract = match phase {
            ThinkingPhase::Diagnose => {
                "Identify what went wrong and why. Do not give steps."
            }
            ThinkingPhase::Model => {
                "Explain the underlying mechanism. No instructions, no imperatives."
            }
            ThinkingPhase::Predict => {
                "Forecast what happens under the proposed change. No diagnosis."
            }
            ThinkingPhase::Recommend => {
                "Give concrete, actionable adjustments using imperative verbs."
            }
        };

        let mut prompt = format!(
            "{}\n\nYou are producing the {} block of a structured answer.\n{}\n\nQUESTION:\n{}",
            persona::CORE_PERSONA,
            phase.as_str().to_uppercase(),
            contract,
            query,
        );
        if !docs.is_empty() {
            prompt.push_str("\n\nRETRIEVED CONTEXT:\n");
            for doc in docs {
                prompt.push_str(&format!("- {}\n", doc.text));
            }
        }
        if let Some(goal) = intent.goal {
            prompt.push_str(&format!("\nUSER GOAL: {goal:?}\n"));
        }

        let request = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.3),
            max_tokens: Some(400),
            model: None,
        };
        let stream = self.backend.chat_stream(&request).await?;
        collect_stream(stream, |_| {}).await
    }

    // ── Claim recovery ─────────────────────────────────────────────

    /// Tiered recovery: regex patterns, then a bounded LLM extraction.
    /// Mechanistic narrative with a still-empty claim list marks the
    /// trace invalid.
    async fn finalize_claims(&self, response: &str, trace: &mut ExecutionTrace) {
        if !trace.claims().is_empty() || !narrative_asserts_mechanism(response) {
            return;
        }

        let mut claims = extract_recovery_claims(response);
        if claims.is_empty() {
            claims = match tokio::time::timeout(
                CLAIM_EXTRACTION_TIMEOUT,
                self.llm_extract_claims(response),
            )
            .await
            {
                Ok(Ok(extracted)) => extracted,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "LLM claim extraction failed");
                    Vec::new()
                }
                Err(_) => {
                    tracing::warn!("LLM claim extraction timed out");
                    Vec::new()
                }
            };
        }

        if !claims.is_empty() {
            trace.add_claims(claims, Default::default());
        }

        if trace.claims().is_empty() {
            tracing::error!("narrative asserts mechanism but claim list is empty");
            trace.validation_status = "invalid".into();
        }
    }

    /// Tier-2: constrained LLM pass extracting atomic claims as JSON.
    async fn llm_extract_claims(
        &self,
        text: &str,
    ) -> Result<Vec<nd_domain::claim::Claim>> {
        use nd_domain::claim::{Claim, ClaimConfidence, ClaimType, VerificationLevel};

        let prompt = format!(
            "Extract all atomic nutrition and chemical claims from the text.\n\
             One claim is one verifiable proposition; split conjunctions.\n\
             Format as a JSON list: \
             [{{\"text\": \"...\", \"subject\": \"...\", \"predicate\": \"...\", \
             \"type\": \"quantitative|mechanistic|qualitative\"}}]\n\n\
             TEXT:\n{text}"
        );
        let request = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.0),
            max_tokens: Some(1024),
            model: None,
        };
        let stream = self.backend.chat_stream(&request).await?;
        let raw = collect_stream(stream, |_| {}).await?;

        // No parseable JSON from the model: fall back to the
        // deterministic sentence-level split.
        let json_span = raw
            .find('[')
            .and_then(|start| raw.rfind(']').map(|end| (start, end)))
            .filter(|(start, end)| start < end);
        let Some((start, end)) = json_span else {
            return Ok(ClaimParser::new().parse(text));
        };
        let items: Vec<Value> = serde_json::from_str(&raw[start..=end]).unwrap_or_default();
        if items.is_empty() {
            return Ok(ClaimParser::new().parse(text));
        }

        let mut claims = Vec::new();
        for item in items {
            let Some(text) = item.get("text").and_then(Value::as_str) else {
                continue;
            };
            let subject = item.get("subject").and_then(Value::as_str);
            let predicate = item.get("predicate").and_then(Value::as_str);
            // Reject malformed claims outright.
            let (Some(subject), Some(predicate)) = (subject, predicate) else {
                tracing::warn!(?item, "rejecting malformed extracted claim");
                continue;
            };
            let claim_type = match item.get("type").and_then(Value::as_str) {
                Some("quantitative") => ClaimType::Quantitative,
                Some("mechanistic") => ClaimType::Mechanistic,
                _ => ClaimType::Qualitative,
            };
            let mut claim = Claim::new(text.to_string(), claim_type)
                .with_subject(subject.to_string())
                .with_predicate(predicate.to_string());
            claim.confidence = ClaimConfidence::Medium;
            claim.verification_level = VerificationLevel::Heuristic;
            claim.mechanism_type = Some("heuristic".into());
            claims.push(claim);
        }
        tracing::info!(count = claims.len(), "tier-2 claim extraction finished");
        Ok(claims)
    }
}
