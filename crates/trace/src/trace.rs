//! The per-request execution trace.
//!
//! Append-only: `add_claims` is the only claim mutator and it merges by
//! stable id, never overwriting. Serialization is layered (scientific /
//! policy / causality / system audit) and fails hard when the policy
//! accountability block was never filled. That is a developer contract,
//! not a user-facing state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use nd_domain::claim::{stable_claim_id, Claim, Decision};
use nd_domain::error::{Error, Result};
use nd_lookup::{confidence_score, proof_hash, ResolutionResult};

/// Trace schema contract version.
const SCHEMA_VERSION: u32 = 2;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status & invocations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraceStatus {
    Init,
    Streaming,
    Enriching,
    Verified,
    Complete,
    Error,
}

/// Record of one agent execution.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInvocation {
    pub agent_name: String,
    pub model_used: String,
    /// "success" | "skipped" | "failed"
    pub status: String,
    /// "selected" | "no_triggers" | "memory_hit" | error message
    pub reason: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub output_tokens: Option<u32>,
}

impl AgentInvocation {
    pub fn start(agent_name: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            model_used: model_used.into(),
            status: "success".into(),
            reason: "selected".into(),
            start_ts: Utc::now(),
            end_ts: None,
            duration_ms: None,
            output_tokens: None,
        }
    }

    pub fn complete(mut self, status: &str, reason: &str, tokens: Option<u32>) -> Self {
        let now = Utc::now();
        self.duration_ms = Some(
            now.signed_duration_since(self.start_ts)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.end_ts = Some(now);
        self.status = status.into();
        self.reason = reason.into();
        self.output_tokens = tokens;
        self
    }
}

/// Proof record for a single externally-resolved compound.
#[derive(Debug, Clone, Serialize)]
pub struct CompoundTrace {
    pub name: String,
    pub cid: u64,
    pub endpoint: String,
    pub source: &'static str,
    pub cached: bool,
    pub resolution_time_ms: u64,
    pub molecular_formula: Option<String>,
    pub molecular_weight: Option<f64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution trace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ExecutionTrace {
    pub session_id: String,
    pub trace_id: String,
    pub run_id: String,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub status: TraceStatus,
    /// "valid" | "invalid" | "partial"
    pub validation_status: String,

    pub invocations: Vec<AgentInvocation>,
    claims: Vec<Claim>,
    pub variance_drivers: BTreeMap<String, f64>,

    // Coverage metrics, recalculated on every claim merge.
    pub mechanisms: BTreeSet<String>,
    pub moa_coverage: f64,
    pub evidence_coverage: f64,
    pub contradiction_ratio: f64,

    // External verification proof.
    pub pubchem_used: bool,
    pub compounds: Vec<CompoundTrace>,
    pub confidence_score: f64,
    pub final_confidence: f64,
    pub proof_hash: String,
    pub enforcement_failures: Vec<String>,

    // Policy accountability.
    pub policy_id: String,
    pub policy_version: String,
    pub policy_hash: String,
    pub policy_selection_reason: String,

    // Version lock barrier.
    pub version_lock: bool,
    pub registry_version: String,
    pub registry_hash: String,
    pub ontology_version: String,

    // Contextual causality metrics.
    pub tier3_applicability_match: f64,
    pub tier3_risk_flags_count: u32,
    pub tier3_recommendation_distribution: BTreeMap<String, u32>,

    pub system_audit: Value,
}

impl ExecutionTrace {
    pub fn new(session_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            session_id: session_id.into(),
            trace_id: format!("tr_{}", uuid::Uuid::new_v4().simple()),
            run_id,
            pipeline: "flavor_explainer".into(),
            started_at: Utc::now(),
            status: TraceStatus::Init,
            validation_status: "valid".into(),
            invocations: Vec::new(),
            claims: Vec::new(),
            variance_drivers: BTreeMap::new(),
            mechanisms: BTreeSet::new(),
            moa_coverage: 0.0,
            evidence_coverage: 0.0,
            contradiction_ratio: 0.0,
            pubchem_used: false,
            compounds: Vec::new(),
            confidence_score: 0.0,
            final_confidence: 0.0,
            proof_hash: String::new(),
            enforcement_failures: Vec::new(),
            policy_id: String::new(),
            policy_version: String::new(),
            policy_hash: String::new(),
            policy_selection_reason: String::new(),
            version_lock: false,
            registry_version: String::new(),
            registry_hash: String::new(),
            ontology_version: String::new(),
            tier3_applicability_match: 0.0,
            tier3_risk_flags_count: 0,
            tier3_recommendation_distribution: BTreeMap::new(),
            system_audit: json!({}),
        }
    }

    /// Seal the version snapshot. Must be called before any resolution.
    pub fn lock_versions(&mut self, registry_version: &str, registry_hash: &str, ontology_version: &str) {
        self.registry_version = registry_version.to_string();
        self.registry_hash = registry_hash.to_string();
        self.ontology_version = ontology_version.to_string();
        self.version_lock = true;
        tracing::info!(
            registry = registry_version,
            ontology = ontology_version,
            "trace versions locked"
        );
    }

    /// Fill the policy accountability block.
    pub fn set_policy(&mut self, id: &str, version: &str, hash: &str, reason: &str) {
        self.policy_id = id.to_string();
        self.policy_version = version.to_string();
        self.policy_hash = hash.to_string();
        self.policy_selection_reason = reason.to_string();
    }

    pub fn add_invocation(&mut self, invocation: AgentInvocation) {
        tracing::info!(
            agent = %invocation.agent_name,
            status = %invocation.status,
            duration_ms = invocation.duration_ms,
            "agent invocation traced"
        );
        self.invocations.push(invocation);
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Merge claims into the trace. Immutability guard: never overwrites,
    /// only appends unique ids. Variance drivers merge by key-wise
    /// maximum, the claim list re-sorts by importance descending, and
    /// coverage metrics recompute.
    pub fn add_claims(&mut self, new_claims: Vec<Claim>, variance_drivers: HashMap<String, f64>) {
        let before = self.claims.len();
        let mut existing: BTreeSet<String> = self.claims.iter().map(|c| c.id.clone()).collect();

        let mut added = 0usize;
        for mut claim in new_claims {
            // Normalize at ingress: a missing id derives from the text.
            if claim.id.is_empty() {
                claim.id = stable_claim_id(&claim.text);
            }
            claim.run_id = self.run_id.clone();
            claim.pipeline = self.pipeline.clone();

            if existing.contains(&claim.id) {
                continue;
            }
            existing.insert(claim.id.clone());
            self.claims.push(claim);
            added += 1;
        }

        for (key, value) in variance_drivers {
            self.variance_drivers
                .entry(key)
                .and_modify(|v| *v = v.max(value))
                .or_insert(value);
        }

        // Stable sort: equal importance keeps insertion order.
        self.claims.sort_by(|a, b| {
            b.importance_score
                .partial_cmp(&a.importance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.recalculate_metrics();
        tracing::info!(before, added, total = self.claims.len(), "claims merged");
    }

    fn recalculate_metrics(&mut self) {
        self.mechanisms = self
            .claims
            .iter()
            .filter_map(|c| c.mechanism_type.clone())
            .filter(|m| m != "heuristic")
            .collect();

        let total = self.claims.len();
        if total == 0 {
            self.moa_coverage = 0.0;
            self.evidence_coverage = 0.0;
            self.contradiction_ratio = 0.0;
            return;
        }

        let with_moa = self
            .claims
            .iter()
            .filter(|c| {
                c.decision == Decision::Allow
                    && c.mechanism_type.as_deref().map_or(false, |m| m != "heuristic")
            })
            .count();
        self.moa_coverage = with_moa as f64 / total as f64 * 100.0;

        let with_evidence = self.claims.iter().filter(|c| !c.evidence.is_empty()).count();
        self.evidence_coverage = round2(with_evidence as f64 / total as f64);

        let all_evidence: Vec<_> = self.claims.iter().flat_map(|c| c.evidence.iter()).collect();
        self.contradiction_ratio = if all_evidence.is_empty() {
            0.0
        } else {
            let contradictions = all_evidence.iter().filter(|e| e.is_contradictory()).count();
            round2(contradictions as f64 / all_evidence.len() as f64)
        };

        tracing::info!(
            moa_coverage = self.moa_coverage,
            evidence_coverage = self.evidence_coverage,
            contradiction_ratio = self.contradiction_ratio,
            "coverage metrics recalculated"
        );
    }

    /// Attach external verification results as the trace's proof.
    pub fn set_pubchem_enforcement(&mut self, resolution: &ResolutionResult) {
        self.pubchem_used = true;
        self.confidence_score = confidence_score(resolution);
        self.final_confidence = self.confidence_score;
        self.proof_hash = proof_hash(&resolution.resolved);
        self.enforcement_failures = resolution
            .unresolved
            .iter()
            .map(|u| u.name.clone())
            .collect();

        for resolved in &resolution.resolved {
            self.compounds.push(CompoundTrace {
                name: resolved.name.clone(),
                cid: resolved.cid,
                endpoint: format!("/compound/cid/{}/property", resolved.cid),
                source: "pubchem",
                cached: resolved.cached,
                resolution_time_ms: resolved.resolution_time_ms,
                molecular_formula: resolved.properties.molecular_formula.clone(),
                molecular_weight: resolved.properties.molecular_weight,
            });
        }

        tracing::info!(
            confidence = self.confidence_score,
            compounds = self.compounds.len(),
            proof_hash = %self.proof_hash,
            "verification proof attached"
        );
    }

    /// Layered serialization. Fails when the policy accountability block
    /// was never filled: serializing an unaccountable trace is a bug.
    pub fn to_value(&self) -> Result<Value> {
        if self.policy_id.is_empty() || self.policy_version.is_empty() {
            let msg = format!(
                "trace serialization for run {} missing mandatory policy metadata",
                self.run_id
            );
            tracing::error!(run_id = %self.run_id, "{msg}");
            return Err(Error::Integrity(msg));
        }

        let scientific_layer = json!({
            "claims": self.claims,
            "compounds": self.compounds,
            "mechanisms": self.mechanisms,
            "moa_coverage": self.moa_coverage,
            "evidence_coverage": self.evidence_coverage,
            "contradiction_ratio": self.contradiction_ratio,
            "registry_snapshot": {
                "version": self.registry_version,
                "hash": self.registry_hash,
                "ontology_version": self.ontology_version,
                "locked": self.version_lock,
            },
        });

        let policy_layer = json!({
            "policy_id": self.policy_id,
            "policy_version": self.policy_version,
            "policy_hash": self.policy_hash,
            "selection_reason": self.policy_selection_reason,
        });

        let causality_layer = json!({
            "tier3_applicability_match": self.tier3_applicability_match,
            "tier3_risk_flags_count": self.tier3_risk_flags_count,
            "tier3_recommendation_distribution": self.tier3_recommendation_distribution,
        });

        let duration_ms = Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0);

        let mut root = json!({
            "run_id": self.run_id,
            "trace_id": self.trace_id,
            "pipeline": self.pipeline,
            "schema_version": SCHEMA_VERSION,
            "status": self.status,
            "validation_status": self.validation_status,
            "duration_ms": duration_ms,
            "invocations": self.invocations,
            "variance_drivers": self.variance_drivers,
            "scientific_layer": scientific_layer,
            "policy_layer": policy_layer,
            "causality_layer": causality_layer,
            "system_audit": self.system_audit,
        });

        // The proof block exists at the root iff the lookup layer ran.
        if self.pubchem_used {
            root["pubchem_proof"] = json!({
                "verified": true,
                "traceable": !self.compounds.is_empty(),
                "proof_hash": self.proof_hash,
                "compounds": self.compounds,
            });
        }

        Ok(root)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
