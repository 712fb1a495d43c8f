//! Mode classifier with stickiness and explore-first logic.
//!
//! Once a session escalates into a deep mode it stays there until the
//! user shifts topic or disengages; fresh classification only happens
//! from CONVERSATION.

use nd_domain::intent::{Intent, IntentGoal};
use nd_domain::modes::ResponseMode;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Predicates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const TOPIC_PHRASES: &[&str] = &[
    "by the way",
    "new question",
    "unrelated",
    "different topic",
    "something else",
    "changing topics",
    "anyway",
    "never mind",
    "forget that",
    "actually",
    "on another note",
];

const EMOTIONAL_RESETS: &[&str] = &[
    "forget it",
    "doesn't matter",
    "whatever",
    "moving on",
    "drop it",
    "stop that",
    "different subject",
];

const NUMERIC_TRIGGERS: &[&str] = &[
    "calories",
    "macros",
    "how many grams",
    "kcal",
    "protein count",
    "carb count",
    "fat content",
    "nutrition facts",
    "exact nutrition",
    "how many mg",
    "scoville",
];

const HEALTH_TRIGGERS: &[&str] = &[
    "healthy",
    "low carb",
    "high protein",
    "light meal",
    "nutritious",
    "good for me",
    "unhealthy",
    "balanced",
];

const STEP_TRIGGERS: &[&str] = &[
    "how do i",
    "give me steps",
    "walk me through",
    "recipe for",
    "make me",
    "step by step",
    "can you make",
    "show me how",
    "teach me to",
    "instructions for",
];

const CAUSAL_TRIGGERS: &[&str] = &[
    "why does",
    "why do",
    "why is",
    "how does",
    "how do",
    "what makes",
    "what causes",
    "effect of",
    "impact of",
    "leads to",
    "results in",
    "helps with",
    "reduces",
    "improves",
    "benefits",
    "mechanism",
    "science behind",
];

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
    "issue with",
    "my cake",
    "my bread",
    "my soup",
    "my dish",
    "overcooked",
    "undercooked",
    "burned",
    "didn't work",
    "failed",
    "ruined",
    "disaster",
    "grainy",
    "lumpy",
    "watery",
    "soupy",
    "bland",
    "rubbery",
    "tough",
    "greasy",
    "oily",
    "flat",
    "dense",
    "gummy",
    "bitter",
    "sour",
    "raw",
    "mushy",
    "soggy",
    "broken",
    "curdled",
    "split",
];

const CONTINUATION_TOKENS: &[&str] = &["yes", "no", "next", "continue", "more", "ok"];

/// Detect explicit topic changes or emotional resets.
pub fn is_topic_shift(message: &str) -> bool {
    let msg = message.to_lowercase();
    TOPIC_PHRASES
        .iter()
        .chain(EMOTIONAL_RESETS.iter())
        .any(|p| msg.contains(p))
}

/// Detect explicit requests for numeric nutrition analysis.
pub fn asks_for_nutrition(message: &str) -> bool {
    let msg = message.to_lowercase();
    NUMERIC_TRIGGERS.iter().any(|p| msg.contains(p))
}

/// Detect qualitative health/wellness questions.
pub fn asks_for_health(message: &str) -> bool {
    let msg = message.to_lowercase();
    HEALTH_TRIGGERS.iter().any(|p| msg.contains(p))
}

/// Detect explicit requests for procedural output.
pub fn asks_for_steps(message: &str) -> bool {
    let msg = message.to_lowercase();
    STEP_TRIGGERS.iter().any(|p| msg.contains(p))
}

/// Detect causal/mechanistic questions that demand explanation, not
/// correlation.
pub fn is_causal_intent(message: &str) -> bool {
    let msg = message.to_lowercase();
    CAUSAL_TRIGGERS.iter().any(|p| msg.contains(p))
}

/// Very short input that is not an affirmation or continuation token.
pub fn is_low_relevance(message: &str) -> bool {
    let msg = message.to_lowercase();
    message.split_whitespace().count() < 3
        && !CONTINUATION_TOKENS.iter().any(|t| msg.contains(t))
}

fn has_diagnostic_phrase(message: &str) -> bool {
    let msg = message.to_lowercase();
    DIAGNOSTIC_PHRASES.iter().any(|p| msg.contains(p))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Determine the response mode with stickiness and soft decay. Pure in
/// (message, intent, previous_mode); every transition logs the rule
/// that fired.
pub fn classify_response_mode(
    message: &str,
    intent: Option<&Intent>,
    previous_mode: ResponseMode,
) -> ResponseMode {
    let decide = |mode: ResponseMode, rule: &str| {
        tracing::info!(
            from = %previous_mode,
            to = %mode,
            rule,
            "mode transition"
        );
        mode
    };

    // ── Sticky modes ───────────────────────────────────────────────

    if previous_mode == ResponseMode::NumericAnalysis {
        if is_topic_shift(message) {
            return decide(ResponseMode::Conversation, "topic_shift");
        }
        if is_low_relevance(message) {
            return decide(ResponseMode::Conversation, "low_relevance_decay");
        }
        return decide(ResponseMode::NumericAnalysis, "sticky");
    }

    if previous_mode == ResponseMode::Procedural {
        if is_topic_shift(message) {
            return decide(ResponseMode::Conversation, "topic_shift");
        }
        if asks_for_nutrition(message) {
            return decide(ResponseMode::NumericAnalysis, "explicit_nutrition_request");
        }
        return decide(ResponseMode::Procedural, "sticky");
    }

    if previous_mode == ResponseMode::Diagnostic {
        if is_topic_shift(message) {
            return decide(ResponseMode::Conversation, "topic_shift");
        }
        if is_low_relevance(message) {
            return decide(ResponseMode::Conversation, "low_relevance_decay");
        }
        if asks_for_nutrition(message) {
            return decide(ResponseMode::NumericAnalysis, "explicit_nutrition_request");
        }
        if asks_for_steps(message) {
            return decide(ResponseMode::Procedural, "explicit_step_request");
        }
        return decide(ResponseMode::Diagnostic, "sticky");
    }

    // ── Fresh classification (from CONVERSATION) ──────────────────

    if asks_for_nutrition(message) {
        return decide(ResponseMode::NumericAnalysis, "fresh_nutrition");
    }
    if asks_for_steps(message) {
        return decide(ResponseMode::Procedural, "fresh_steps");
    }
    if has_diagnostic_phrase(message) {
        return decide(ResponseMode::Diagnostic, "fresh_diagnostic_phrase");
    }
    if asks_for_health(message) {
        return decide(ResponseMode::Diagnostic, "fresh_health");
    }

    if let Some(intent) = intent {
        match intent.goal {
            Some(IntentGoal::OptimizeNutrition) => {
                if asks_for_nutrition(message) {
                    return decide(ResponseMode::NumericAnalysis, "intent_optimize_numeric");
                }
                return decide(ResponseMode::Diagnostic, "intent_optimize_conceptual");
            }
            Some(IntentGoal::ModifyRecipe)
            | Some(IntentGoal::Troubleshoot)
            | Some(IntentGoal::Diagnose) => {
                if asks_for_steps(message) {
                    return decide(ResponseMode::Procedural, "intent_modify_steps");
                }
                return decide(ResponseMode::Diagnostic, "intent_modify_conceptual");
            }
            _ => {}
        }
    }

    decide(ResponseMode::Conversation, "default")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_stays_conversation() {
        assert_eq!(
            classify_response_mode("hi", None, ResponseMode::Conversation),
            ResponseMode::Conversation
        );
    }

    #[test]
    fn nutrition_request_escalates() {
        assert_eq!(
            classify_response_mode(
                "How many calories in one serving?",
                None,
                ResponseMode::Conversation
            ),
            ResponseMode::NumericAnalysis
        );
    }

    #[test]
    fn step_request_goes_procedural() {
        assert_eq!(
            classify_response_mode(
                "Make me a carbonara with 500g flour",
                None,
                ResponseMode::Conversation
            ),
            ResponseMode::Procedural
        );
    }

    #[test]
    fn why_question_goes_diagnostic() {
        assert_eq!(
            classify_response_mode(
                "Why is my hollandaise broken?",
                None,
                ResponseMode::Conversation
            ),
            ResponseMode::Diagnostic
        );
    }

    #[test]
    fn numeric_mode_is_sticky() {
        assert_eq!(
            classify_response_mode(
                "what about for two servings then",
                None,
                ResponseMode::NumericAnalysis
            ),
            ResponseMode::NumericAnalysis
        );
    }

    #[test]
    fn numeric_mode_decays_on_low_relevance() {
        assert_eq!(
            classify_response_mode("cool", None, ResponseMode::NumericAnalysis),
            ResponseMode::Conversation
        );
    }

    #[test]
    fn continuation_token_does_not_decay() {
        assert_eq!(
            classify_response_mode("ok", None, ResponseMode::NumericAnalysis),
            ResponseMode::NumericAnalysis
        );
    }

    #[test]
    fn procedural_jumps_to_numeric_on_request() {
        assert_eq!(
            classify_response_mode(
                "great, now give me the macros for it",
                None,
                ResponseMode::Procedural
            ),
            ResponseMode::NumericAnalysis
        );
    }

    #[test]
    fn procedural_survives_low_relevance() {
        // Procedural is the stickiest mode: short follow-ups stay in it.
        assert_eq!(
            classify_response_mode("hm", None, ResponseMode::Procedural),
            ResponseMode::Procedural
        );
    }

    #[test]
    fn topic_shift_resets_any_mode() {
        for prev in [
            ResponseMode::Diagnostic,
            ResponseMode::Procedural,
            ResponseMode::NumericAnalysis,
        ] {
            assert_eq!(
                classify_response_mode("anyway, new question entirely", None, prev),
                ResponseMode::Conversation
            );
        }
    }

    #[test]
    fn diagnostic_escalates_to_procedural_on_steps() {
        assert_eq!(
            classify_response_mode(
                "ok walk me through fixing it",
                None,
                ResponseMode::Diagnostic
            ),
            ResponseMode::Procedural
        );
    }

    #[test]
    fn intent_goal_routes_fresh_classification() {
        let intent = Intent::with_goal(IntentGoal::Troubleshoot, 0.9);
        assert_eq!(
            classify_response_mode(
                "the emulsion is acting strangely",
                Some(&intent),
                ResponseMode::Conversation
            ),
            ResponseMode::Diagnostic
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let msg = "why is my bread dense";
        let first = classify_response_mode(msg, None, ResponseMode::Conversation);
        let second = classify_response_mode(msg, None, ResponseMode::Conversation);
        assert_eq!(first, second);
    }

    #[test]
    fn health_question_maps_to_diagnostic() {
        assert_eq!(
            classify_response_mode(
                "is this meal actually healthy for daily eating",
                None,
                ResponseMode::Conversation
            ),
            ResponseMode::Diagnostic
        );
    }
}
