//! Response modes, execution profiles, and thinking phases.
//!
//! These three enums define the coarse shape of every response:
//! the *profile* budgets the work, the *mode* sets the register, and
//! the *phases* structure the reasoning.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The user-visible response register. Conversation-first, escalate as
/// needed; deep modes are sticky until a topic shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Default: chat, greetings, concepts.
    #[default]
    Conversation,
    /// Problem-solving and explanations.
    Diagnostic,
    /// Step-by-step recipes and instructions.
    Procedural,
    /// Gated numeric nutrition data — the only authorized numeric surface.
    NumericAnalysis,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Diagnostic => "diagnostic",
            Self::Procedural => "procedural",
            Self::NumericAnalysis => "numeric_analysis",
        }
    }

    /// Parse a stored mode string, falling back to `Conversation`.
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "diagnostic" => Self::Diagnostic,
            "procedural" => Self::Procedural,
            "numeric_analysis" => Self::NumericAnalysis,
            _ => Self::Conversation,
        }
    }
}

impl std::fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Coarse budget/quality tier selected by the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProfile {
    /// Intent + synthesis only; first answer in seconds.
    #[default]
    Fast,
    /// Adds sensory modeling and explanation agents.
    Sensory,
    /// Adds frontier optimization and variant selection.
    Optimize,
    /// Optimize plus any configured research-only agents.
    Research,
}

impl ExecutionProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Sensory => "sensory",
            Self::Optimize => "optimize",
            Self::Research => "research",
        }
    }

    /// Parse an explicit mode override. Unknown values return `None` so the
    /// caller can fall back to auto-detection.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "sensory" => Some(Self::Sensory),
            "optimize" => Some(Self::Optimize),
            "research" => Some(Self::Research),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thinking phases
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Allowed semantic phase types (fixed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingPhase {
    /// Identifying what's wrong.
    Diagnose,
    /// Explaining the underlying system.
    Model,
    /// What will happen if X changes.
    Predict,
    /// Actionable steps.
    Recommend,
}

/// Canonical phase ordering. Selected phases are always sorted to this
/// sequence before execution.
pub const PHASE_ORDER: [ThinkingPhase; 4] = [
    ThinkingPhase::Diagnose,
    ThinkingPhase::Model,
    ThinkingPhase::Predict,
    ThinkingPhase::Recommend,
];

impl ThinkingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnose => "diagnose",
            Self::Model => "model",
            Self::Predict => "predict",
            Self::Recommend => "recommend",
        }
    }

    /// Index into [`PHASE_ORDER`], used as the sort key.
    pub fn canonical_rank(&self) -> usize {
        PHASE_ORDER
            .iter()
            .position(|p| p == self)
            .unwrap_or(PHASE_ORDER.len())
    }
}

impl std::fmt::Display for ThinkingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trip() {
        for mode in [
            ResponseMode::Conversation,
            ResponseMode::Diagnostic,
            ResponseMode::Procedural,
            ResponseMode::NumericAnalysis,
        ] {
            assert_eq!(ResponseMode::parse_or_default(mode.as_str()), mode);
        }
    }

    #[test]
    fn unknown_mode_falls_back_to_conversation() {
        assert_eq!(
            ResponseMode::parse_or_default("nonsense"),
            ResponseMode::Conversation
        );
    }

    #[test]
    fn profile_parse_is_case_insensitive() {
        assert_eq!(ExecutionProfile::parse("FAST"), Some(ExecutionProfile::Fast));
        assert_eq!(
            ExecutionProfile::parse("Sensory"),
            Some(ExecutionProfile::Sensory)
        );
        assert_eq!(ExecutionProfile::parse("turbo"), None);
    }

    #[test]
    fn canonical_rank_matches_order() {
        assert_eq!(ThinkingPhase::Diagnose.canonical_rank(), 0);
        assert_eq!(ThinkingPhase::Model.canonical_rank(), 1);
        assert_eq!(ThinkingPhase::Predict.canonical_rank(), 2);
        assert_eq!(ThinkingPhase::Recommend.canonical_rank(), 3);
    }

    #[test]
    fn mode_serde_uses_snake_case() {
        let json = serde_json::to_string(&ResponseMode::NumericAnalysis).unwrap();
        assert_eq!(json, r#""numeric_analysis""#);
    }
}
