//! Claims — atomic verifiable propositions extracted from generated text.
//!
//! The rest of the pipeline produces claims from several ingress paths
//! (pipeline enforcement metadata, regex recovery, LLM extraction); all of
//! them normalize into this one struct at ingress so the trace never sees
//! loosely-shaped data.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of proposition a claim makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    /// Nutrient amounts, "high in", "contains X mg".
    Quantitative,
    /// "supports digestion", "boosts immune system".
    Mechanistic,
    /// "delicious", "traditional", vague "healthy".
    #[default]
    Qualitative,
}

/// Governance decision attached to a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Decision {
    #[serde(rename = "ALLOW")]
    #[default]
    Allow,
    #[serde(rename = "WITHHOLD")]
    Withhold,
    #[serde(rename = "REQUIRE_MORE_CONTEXT")]
    RequireMoreContext,
}

impl Decision {
    /// Map a legacy verification status string onto a decision.
    /// `verified` → ALLOW, `rejected` → WITHHOLD, `pending` → REQUIRE_MORE_CONTEXT.
    pub fn from_status(status: &str) -> Self {
        match status {
            "rejected" => Self::Withhold,
            "pending" => Self::RequireMoreContext,
            _ => Self::Allow,
        }
    }
}

/// How strongly a claim has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    /// Pattern-matched from the narrative; unverified.
    #[default]
    Heuristic,
    /// Structured extraction, still unverified.
    Extracted,
    /// Backed by an external lookup.
    Verified,
}

/// Reported confidence band for an extracted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClaimConfidence {
    Low,
    #[default]
    Medium,
    High,
}

/// One piece of supporting (or contradicting) evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub source: String,
    /// "supporting" | "neutral" | "contradictory"
    pub effect_direction: String,
}

impl Evidence {
    pub fn is_contradictory(&self) -> bool {
        self.effect_direction == "contradictory"
    }
}

/// An atomic verifiable proposition.
///
/// The id is stable: lower-case the trimmed text, sha256 it, and keep the
/// first 8 hex characters behind a `C-` prefix. Identical text always
/// yields the same id, which is what makes trace dedup work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub predicate: Option<String>,
    #[serde(default)]
    pub verification_level: VerificationLevel,
    #[serde(default)]
    pub confidence: ClaimConfidence,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub mechanism: Option<String>,
    #[serde(default)]
    pub mechanism_type: Option<String>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub decision: Decision,
    #[serde(default = "default_importance")]
    pub importance_score: f64,
    /// Run and pipeline are injected by the trace when the claim is merged.
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub pipeline: String,
}

fn default_importance() -> f64 {
    0.2
}

impl Claim {
    /// Create a claim with a stable content-derived id.
    pub fn new(text: impl Into<String>, claim_type: ClaimType) -> Self {
        let text = text.into();
        Self {
            id: stable_claim_id(&text),
            text,
            claim_type,
            subject: None,
            predicate: None,
            verification_level: VerificationLevel::default(),
            confidence: ClaimConfidence::default(),
            verified: false,
            mechanism: None,
            mechanism_type: None,
            evidence: Vec::new(),
            decision: Decision::default(),
            importance_score: default_importance(),
            run_id: String::new(),
            pipeline: String::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn with_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanism = Some(mechanism.into());
        self
    }
}

/// Stable claim id: `C-` + first 8 hex chars of sha256 over the
/// lower-cased, trimmed text.
pub fn stable_claim_id(text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("C-{}", &hex::encode(digest)[..8])
}
