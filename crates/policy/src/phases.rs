//! Phase selector — confidence-gated selection of ordered thinking
//! phases, with per-phase content validation.
//!
//! The guiding rule is that silence beats wrong structure: an ambiguous
//! prompt gets zero phases and a direct answer.

use nd_domain::intent::Intent;
use nd_domain::modes::{ResponseMode, ThinkingPhase};
use nd_domain::prefs::SkillLevel;

/// Intent confidence below this gate yields zero phases on
/// non-scientific queries (strict less-than).
const CONFIDENCE_GATE: f64 = 0.6;

/// Minimum non-whitespace characters for phase content to count.
const MIN_CONTENT_CHARS: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyword tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const DIAGNOSTIC_PHRASES: &[&str] = &[
    "why is",
    "what went wrong",
    "too dry",
    "too salty",
    "too sweet",
    "didn't rise",
    "turned out",
    "not right",
    "problem with",
    "overcooked",
    "undercooked",
    "burned",
    "didn't work",
    "failed",
    "ruined",
];

const FIX_PHRASES: &[&str] = &["how do i fix", "how can i fix", "how to fix"];

const PREDICTIVE_PHRASES: &[&str] = &["what if", "what happens if", "if i"];

const PROCEDURAL_PHRASES: &[&str] = &[
    "how do i make",
    "how to make",
    "recipe for",
    "steps to",
    "walk me through",
];

const WHY_PHRASES: &[&str] = &["why does", "why is", "how come", "what causes"];

const SCIENTIFIC_KEYWORDS: &[&str] = &[
    "chemistry",
    "molecule",
    "compound",
    "protein",
    "enzyme",
    "reaction",
    "nutrient",
    "vitamin",
    "mineral",
    "biological",
    "cellular",
    "molecular",
    "synthesis",
    "extract",
    "ingredient",
    "explain",
    "how does",
    "what is the mechanism",
    "capsaicin",
    "metabolism",
    "digestion",
    "absorption",
];

const ACTION_VERBS: &[&str] = &[
    "add", "reduce", "increase", "use", "try", "adjust", "heat", "cool", "mix", "stir", "fold",
    "whisk", "bake", "fry", "boil", "simmer",
];

const INSTRUCTION_PHRASES: &[&str] = &[
    "you should",
    "first step",
    "next,",
    "then add",
    "start by",
    "begin by",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Preference view
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The slice of user memory the selector cares about. The session layer
/// builds this from confidence-filtered preferences.
#[derive(Debug, Clone, Default)]
pub struct PhasePrefs {
    pub skill_level: Option<SkillLevel>,
    pub has_equipment: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn is_scientific_query(message: &str) -> bool {
    let msg = message.to_lowercase();
    SCIENTIFIC_KEYWORDS.iter().any(|k| msg.contains(k))
}

fn is_why_question(message: &str) -> bool {
    let msg = message.to_lowercase();
    WHY_PHRASES.iter().any(|p| msg.contains(p))
}

/// Select the ordered phase list for a message. May be empty — the
/// zero-phase path streams a direct answer.
///
/// Pure in (message, mode, intent, prefs).
pub fn select_phases(
    message: &str,
    mode: ResponseMode,
    intent: Option<&Intent>,
    prefs: Option<&PhasePrefs>,
) -> Vec<ThinkingPhase> {
    let msg = message.to_lowercase();
    let scientific = is_scientific_query(message);

    // Confidence gate: strict less-than, bypassed for scientific queries.
    if !scientific {
        let confident = intent.map(|i| i.confidence >= CONFIDENCE_GATE).unwrap_or(false);
        if !confident {
            log_decision(&[], "low_intent_confidence", intent, message, prefs);
            return Vec::new();
        }
    }

    let is_diagnostic = DIAGNOSTIC_PHRASES.iter().any(|p| msg.contains(p));
    let is_fix = FIX_PHRASES.iter().any(|p| msg.contains(p));
    let is_predictive = PREDICTIVE_PHRASES.iter().any(|p| msg.contains(p));
    let is_procedural = PROCEDURAL_PHRASES.iter().any(|p| msg.contains(p));
    let why_question = is_why_question(message);

    let mut phases: Vec<ThinkingPhase> = if is_fix {
        vec![ThinkingPhase::Diagnose, ThinkingPhase::Recommend]
    } else if is_predictive {
        vec![ThinkingPhase::Predict, ThinkingPhase::Model]
    } else if why_question || scientific {
        vec![ThinkingPhase::Model]
    } else if is_diagnostic && !is_procedural {
        vec![ThinkingPhase::Diagnose]
    } else if is_procedural {
        // Direct steps, no phasing.
        Vec::new()
    } else if mode == ResponseMode::Diagnostic {
        vec![ThinkingPhase::Diagnose]
    } else {
        Vec::new()
    };

    // Memory short-circuit: when memory fully constrains a procedural
    // answer, drop the theory and possibly the whole phase list.
    if let Some(prefs) = prefs {
        if !phases.is_empty()
            && is_procedural
            && prefs.has_equipment
            && prefs.skill_level.is_some()
        {
            phases.retain(|p| *p != ThinkingPhase::Model);
            if phases == [ThinkingPhase::Recommend] {
                tracing::info!("phase short-circuit: memory fully constrains answer");
                phases.clear();
            }
        }

        // Beginners skip MODEL unless they explicitly asked why.
        if prefs.skill_level == Some(SkillLevel::Beginner) && !why_question {
            phases.retain(|p| *p != ThinkingPhase::Model);
        }
    }

    phases.sort_by_key(|p| p.canonical_rank());
    phases.dedup();

    let reason = if phases.is_empty() {
        if is_procedural {
            "procedural_mode"
        } else {
            "no_semantic_match"
        }
    } else {
        "phases_selected"
    };
    log_decision(&phases, reason, intent, message, prefs);

    phases
}

fn log_decision(
    phases: &[ThinkingPhase],
    reason: &str,
    intent: Option<&Intent>,
    message: &str,
    prefs: Option<&PhasePrefs>,
) {
    tracing::info!(
        phase_count = phases.len(),
        phases = ?phases.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        reason,
        intent_confidence = intent.map(|i| i.confidence),
        message_length = message.len(),
        has_user_prefs = prefs.is_some(),
        "phase decision"
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hard validation that generated phase content matches its semantic
/// type. Failing phases are dropped by the orchestrator.
pub fn validate_phase_content(phase: ThinkingPhase, content: &str) -> bool {
    let non_ws = content.chars().filter(|c| !c.is_whitespace()).count();
    if non_ws < MIN_CONTENT_CHARS {
        return false;
    }

    let content_lower = content.to_lowercase();
    match phase {
        ThinkingPhase::Recommend => ACTION_VERBS.iter().any(|v| content_lower.contains(v)),
        ThinkingPhase::Model => !INSTRUCTION_PHRASES.iter().any(|p| content_lower.contains(p)),
        ThinkingPhase::Diagnose | ThinkingPhase::Predict => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_domain::intent::IntentGoal;

    fn confident_intent() -> Intent {
        Intent::with_goal(IntentGoal::Troubleshoot, 0.9)
    }

    #[test]
    fn fix_request_selects_diagnose_recommend() {
        let phases = select_phases(
            "how do i fix my split hollandaise",
            ResponseMode::Diagnostic,
            Some(&confident_intent()),
            None,
        );
        assert_eq!(
            phases,
            vec![ThinkingPhase::Diagnose, ThinkingPhase::Recommend]
        );
    }

    #[test]
    fn predictive_selects_model_and_predict_in_canonical_order() {
        let phases = select_phases(
            "what happens if i double the butter",
            ResponseMode::Conversation,
            Some(&confident_intent()),
            None,
        );
        // PREDICT was matched first but MODEL sorts ahead of it.
        assert_eq!(phases, vec![ThinkingPhase::Model, ThinkingPhase::Predict]);
    }

    #[test]
    fn why_question_selects_model() {
        let phases = select_phases(
            "Why does capsaicin taste hot?",
            ResponseMode::Diagnostic,
            None,
            None,
        );
        assert_eq!(phases, vec![ThinkingPhase::Model]);
    }

    #[test]
    fn confidence_gate_is_strict_less_than() {
        let mut intent = Intent::default();
        intent.confidence = 0.6;
        // Exactly 0.6 on a non-scientific query passes the gate; there is
        // no semantic pattern here, so phases stay empty via no-match.
        let at_gate = select_phases("tell me a story about soup", ResponseMode::Conversation, Some(&intent), None);
        assert!(at_gate.is_empty());

        intent.confidence = 0.59;
        let below = select_phases(
            "how do i fix my split hollandaise",
            ResponseMode::Diagnostic,
            Some(&intent),
            None,
        );
        assert!(below.is_empty(), "below the gate the fix pattern must not fire");

        intent.confidence = 0.6;
        let at_gate_fix = select_phases(
            "how do i fix my split hollandaise",
            ResponseMode::Diagnostic,
            Some(&intent),
            None,
        );
        assert_eq!(
            at_gate_fix,
            vec![ThinkingPhase::Diagnose, ThinkingPhase::Recommend]
        );
    }

    #[test]
    fn no_intent_non_scientific_yields_zero_phases() {
        assert!(select_phases(
            "how do i fix this",
            ResponseMode::Conversation,
            None,
            None
        )
        .is_empty());
    }

    #[test]
    fn scientific_query_bypasses_gate() {
        let phases = select_phases(
            "explain the maillard reaction in bread crust",
            ResponseMode::Conversation,
            None,
            None,
        );
        assert_eq!(phases, vec![ThinkingPhase::Model]);
    }

    #[test]
    fn procedural_query_has_no_phases() {
        assert!(select_phases(
            "recipe for carbonara please",
            ResponseMode::Procedural,
            Some(&confident_intent()),
            None
        )
        .is_empty());
    }

    #[test]
    fn sticky_diagnostic_mode_keeps_diagnose() {
        let phases = select_phases(
            "it still seems wrong somehow to me",
            ResponseMode::Diagnostic,
            Some(&confident_intent()),
            None,
        );
        assert_eq!(phases, vec![ThinkingPhase::Diagnose]);
    }

    #[test]
    fn empty_message_zero_phases() {
        assert!(select_phases("", ResponseMode::Conversation, None, None).is_empty());
    }

    #[test]
    fn beginner_drops_model_unless_why() {
        let prefs = PhasePrefs {
            skill_level: Some(SkillLevel::Beginner),
            has_equipment: false,
        };
        // Scientific query, not a why-question: MODEL dropped.
        let phases = select_phases(
            "something about enzyme browning in apples",
            ResponseMode::Conversation,
            Some(&confident_intent()),
            Some(&prefs),
        );
        assert!(phases.is_empty());

        // Explicit why-question keeps MODEL even for beginners.
        let phases = select_phases(
            "why does enzyme browning happen in apples",
            ResponseMode::Conversation,
            Some(&confident_intent()),
            Some(&prefs),
        );
        assert_eq!(phases, vec![ThinkingPhase::Model]);
    }

    #[test]
    fn selection_is_pure() {
        let intent = confident_intent();
        let a = select_phases("how do i fix dense bread", ResponseMode::Diagnostic, Some(&intent), None);
        let b = select_phases("how do i fix dense bread", ResponseMode::Diagnostic, Some(&intent), None);
        assert_eq!(a, b);
    }

    // ── Content validation ─────────────────────────────────────────

    #[test]
    fn recommend_requires_action_verb() {
        assert!(validate_phase_content(
            ThinkingPhase::Recommend,
            "Reduce the oven temperature and add steam early."
        ));
        assert!(!validate_phase_content(
            ThinkingPhase::Recommend,
            "The crumb structure reflects hydration levels."
        ));
    }

    #[test]
    fn model_rejects_instructional_imperatives() {
        assert!(validate_phase_content(
            ThinkingPhase::Model,
            "Gluten networks trap carbon dioxide produced by yeast."
        ));
        assert!(!validate_phase_content(
            ThinkingPhase::Model,
            "First step is kneading, then add the water slowly."
        ));
    }

    #[test]
    fn short_content_always_fails() {
        assert!(!validate_phase_content(ThinkingPhase::Diagnose, "  ok   "));
        assert!(!validate_phase_content(ThinkingPhase::Predict, "a b c"));
    }

    #[test]
    fn diagnose_and_predict_accept_substantive_text() {
        assert!(validate_phase_content(
            ThinkingPhase::Diagnose,
            "The emulsion broke because the butter was too hot."
        ));
        assert!(validate_phase_content(
            ThinkingPhase::Predict,
            "Doubling the sugar will darken the crust noticeably."
        ));
    }
}
