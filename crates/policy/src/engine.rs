//! Meta-learner policy engine.
//!
//! A sub-millisecond heuristic that sets execution strategy before any
//! heavy lifting begins: profile, agent sets, and latency budget. It
//! never calls an LLM — only keywords, the resource state, and the
//! explicit mode override feed the decision.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use nd_domain::config::PolicyConfig;
use nd_domain::modes::ExecutionProfile;
use nd_monitor::{PressureClass, ResourceMonitor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyword tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const OPTIMIZE_KEYWORDS: &[&str] = &[
    "best", "optimize", "compare", "variants", "better", "improve", "perfect", "ideal",
    "alternatives",
];

const SENSORY_KEYWORDS: &[&str] = &[
    "texture", "taste", "smooth", "crisp", "tender", "chewy", "mouthfeel", "crunchy", "soft",
    "juicy", "rich", "coating", "sensory", "feel", "crispness", "tenderness", "bitter",
    "bitterness", "sweet", "sweetness", "sour", "sourness", "salty", "saltiness", "umami",
    "aromatic", "fragrant",
];

/// Utterances below this word count collapse to FAST when no explicit
/// mode was requested.
const SHORT_QUERY_WORDS: usize = 15;

// ── Agent sets ─────────────────────────────────────────────────────

const AGENTS_CORE: &[&str] = &["intent", "recipe", "presentation"];
const AGENTS_SENSORY: &[&str] = &["sensory_model", "explanation"];
const AGENTS_OPTIMIZE: &[&str] = &["frontier", "selector"];
const AGENT_SPECULATIVE: &str = "recipe_renderer";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Latency targets in seconds for the request's milestones.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct LatencyBudget {
    pub first_token: f64,
    pub layer1: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer3: Option<f64>,
    pub total: f64,
}

/// Decision output from the policy engine.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPolicy {
    pub profile: ExecutionProfile,
    pub enabled_agents: BTreeSet<String>,
    pub speculative_agents: BTreeSet<String>,
    pub latency_budget: LatencyBudget,
    pub downgraded_reason: Option<String>,
}

impl ExecutionPolicy {
    pub fn agent_enabled(&self, name: &str) -> bool {
        self.enabled_agents.contains(name)
    }
}

/// Snapshot of the resource inputs the decision depends on. Separated
/// out so the decision itself stays a pure function.
#[derive(Debug, Clone, Copy)]
pub struct ResourceState {
    pub degraded: bool,
    pub pressure: PressureClass,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PolicyEngine {
    config: PolicyConfig,
    monitor: Arc<ResourceMonitor>,
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig, monitor: Arc<ResourceMonitor>) -> Self {
        Self { config, monitor }
    }

    /// Decide the execution policy for a request, sampling the resource
    /// monitor for the current state.
    pub fn decide(&self, user_message: &str, explicit_mode: Option<&str>) -> ExecutionPolicy {
        let state = ResourceState {
            degraded: self.monitor.is_degraded(),
            pressure: self.monitor.current_pressure(),
        };
        self.decide_with_state(user_message, explicit_mode, state)
    }

    /// The pure decision: (message, explicit mode, resource state) → policy.
    pub fn decide_with_state(
        &self,
        user_message: &str,
        explicit_mode: Option<&str>,
        state: ResourceState,
    ) -> ExecutionPolicy {
        let explicit = explicit_mode.and_then(ExecutionProfile::parse);
        let (profile, downgraded_reason) = self.select_profile(user_message, explicit, state);

        let enabled_agents = self.agents_for(profile);

        // Speculative rendering runs alongside the lightweight profiles;
        // pruned entirely while degraded.
        let mut speculative_agents = BTreeSet::new();
        if !state.degraded
            && matches!(profile, ExecutionProfile::Fast | ExecutionProfile::Sensory)
        {
            speculative_agents.insert(AGENT_SPECULATIVE.to_string());
        }

        let latency_budget = budget_for(profile);

        let policy = ExecutionPolicy {
            profile,
            enabled_agents,
            speculative_agents,
            latency_budget,
            downgraded_reason,
        };

        tracing::info!(
            profile = %policy.profile,
            agents = policy.enabled_agents.len(),
            speculative = policy.speculative_agents.len(),
            downgraded = policy.downgraded_reason.is_some(),
            "policy decision"
        );
        policy
    }

    fn select_profile(
        &self,
        user_message: &str,
        explicit: Option<ExecutionProfile>,
        state: ResourceState,
    ) -> (ExecutionProfile, Option<String>) {
        if state.degraded {
            tracing::warn!("policy forced FAST: VRAM leak protection active");
            return (
                ExecutionProfile::Fast,
                Some("gpu-degraded: VRAM leak protection active".into()),
            );
        }

        if state.pressure == PressureClass::Critical {
            tracing::warn!("policy forced FAST: critical memory pressure");
            return (
                ExecutionProfile::Fast,
                Some("critical memory pressure".into()),
            );
        }

        if let Some(profile) = explicit {
            tracing::info!(profile = %profile, "explicit execution mode");
            return self.apply_pressure_downgrade(profile, state);
        }

        let msg_lower = user_message.to_lowercase();
        let base = if OPTIMIZE_KEYWORDS.iter().any(|k| msg_lower.contains(k)) {
            ExecutionProfile::Optimize
        } else if SENSORY_KEYWORDS.iter().any(|k| msg_lower.contains(k)) {
            ExecutionProfile::Sensory
        } else {
            ExecutionProfile::Fast
        };

        let (base, reason) = self.apply_pressure_downgrade(base, state);

        // Short, unforced utterances collapse to FAST to avoid
        // over-engineering a greeting.
        let word_count = user_message.split_whitespace().count();
        if word_count < SHORT_QUERY_WORDS && base != ExecutionProfile::Fast {
            tracing::debug!(word_count, "short utterance collapsed to FAST");
            return (ExecutionProfile::Fast, None);
        }

        (base, reason)
    }

    /// Moderate pressure downgrades the heavy profiles to SENSORY.
    fn apply_pressure_downgrade(
        &self,
        profile: ExecutionProfile,
        state: ResourceState,
    ) -> (ExecutionProfile, Option<String>) {
        if state.pressure == PressureClass::Moderate
            && matches!(
                profile,
                ExecutionProfile::Optimize | ExecutionProfile::Research
            )
        {
            tracing::warn!(from = %profile, "moderate memory pressure: downgrading to SENSORY");
            return (
                ExecutionProfile::Sensory,
                Some(format!("moderate memory pressure: {profile} downgraded")),
            );
        }
        (profile, None)
    }

    fn agents_for(&self, profile: ExecutionProfile) -> BTreeSet<String> {
        let mut agents: BTreeSet<String> =
            AGENTS_CORE.iter().map(|a| a.to_string()).collect();
        match profile {
            ExecutionProfile::Fast => {}
            ExecutionProfile::Sensory => {
                agents.extend(AGENTS_SENSORY.iter().map(|a| a.to_string()));
            }
            ExecutionProfile::Optimize => {
                agents.extend(AGENTS_SENSORY.iter().map(|a| a.to_string()));
                agents.extend(AGENTS_OPTIMIZE.iter().map(|a| a.to_string()));
            }
            ExecutionProfile::Research => {
                agents.extend(AGENTS_SENSORY.iter().map(|a| a.to_string()));
                agents.extend(AGENTS_OPTIMIZE.iter().map(|a| a.to_string()));
                agents.extend(self.config.research_agents.iter().cloned());
            }
        }
        agents
    }
}

fn budget_for(profile: ExecutionProfile) -> LatencyBudget {
    match profile {
        ExecutionProfile::Fast => LatencyBudget {
            first_token: 2.0,
            layer1: 5.0,
            layer2: None,
            layer3: None,
            total: 10.0,
        },
        ExecutionProfile::Sensory => LatencyBudget {
            first_token: 2.0,
            layer1: 5.0,
            layer2: Some(15.0),
            layer3: None,
            total: 30.0,
        },
        ExecutionProfile::Optimize | ExecutionProfile::Research => LatencyBudget {
            first_token: 2.0,
            layer1: 5.0,
            layer2: None,
            layer3: Some(60.0),
            total: 120.0,
        },
    }
}
