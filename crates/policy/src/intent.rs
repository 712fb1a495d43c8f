//! Heuristic intent extraction.
//!
//! Produces a goal and a confidence for the classifier and phase
//! selector. Deterministic by design: the confidence gate downstream
//! needs stable values, and a wrong-but-loud goal is worse than a quiet
//! one.

use nd_domain::intent::{Intent, IntentGoal};

const OPTIMIZE_NUTRITION_HINTS: &[&str] = &[
    "healthier",
    "lower calorie",
    "less sugar",
    "more protein",
    "cut the fat",
    "optimize nutrition",
    "macro friendly",
];

const MODIFY_HINTS: &[&str] = &[
    "instead of",
    "substitute",
    "swap",
    "replace",
    "without the",
    "can i use",
];

const TROUBLESHOOT_HINTS: &[&str] = &[
    "went wrong",
    "didn't work",
    "too dry",
    "too salty",
    "didn't rise",
    "broken",
    "curdled",
    "split",
    "fix",
    "ruined",
];

const CAUSAL_HINTS: &[&str] = &[
    "why does",
    "why do",
    "why is",
    "how come",
    "what causes",
    "mechanism",
    "science behind",
];

const RECIPE_HINTS: &[&str] = &[
    "recipe for",
    "make me",
    "how do i make",
    "how to make",
    "cook me",
    "walk me through",
];

/// Extract intent from a user message. Never fails; an unrecognized
/// message yields `Explore` at low confidence, which keeps the phase
/// gate shut.
pub fn extract_intent(message: &str) -> Intent {
    let msg = message.to_lowercase();
    let hits = |hints: &[&str]| hints.iter().filter(|h| msg.contains(*h)).count();

    let candidates = [
        (IntentGoal::OptimizeNutrition, hits(OPTIMIZE_NUTRITION_HINTS)),
        (IntentGoal::Troubleshoot, hits(TROUBLESHOOT_HINTS)),
        (IntentGoal::ModifyRecipe, hits(MODIFY_HINTS)),
        (IntentGoal::Diagnose, hits(CAUSAL_HINTS)),
        (IntentGoal::MakeRecipe, hits(RECIPE_HINTS)),
    ];

    let best = candidates
        .iter()
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count);

    let intent = match best {
        Some(&(goal, count)) => {
            // One hint is a solid signal; multiple reinforce it.
            let confidence = if count >= 2 { 0.9 } else { 0.75 };
            Intent {
                goal: Some(goal),
                confidence,
                ingredients: Vec::new(),
            }
        }
        None => Intent {
            goal: Some(IntentGoal::Explore),
            confidence: 0.3,
            ingredients: Vec::new(),
        },
    };

    tracing::debug!(
        goal = ?intent.goal,
        confidence = intent.confidence,
        "intent extracted"
    );
    intent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn causal_question_maps_to_diagnose() {
        let intent = extract_intent("Why does capsaicin taste hot?");
        assert_eq!(intent.goal, Some(IntentGoal::Diagnose));
        assert!(intent.confidence >= 0.6);
    }

    #[test]
    fn trouble_phrases_map_to_troubleshoot() {
        let intent = extract_intent("my hollandaise split and the sauce is ruined");
        assert_eq!(intent.goal, Some(IntentGoal::Troubleshoot));
        assert!(intent.confidence >= 0.9);
    }

    #[test]
    fn recipe_request_maps_to_make_recipe() {
        let intent = extract_intent("make me a carbonara with 500g flour");
        assert_eq!(intent.goal, Some(IntentGoal::MakeRecipe));
    }

    #[test]
    fn unknown_message_is_low_confidence_explore() {
        let intent = extract_intent("hi");
        assert_eq!(intent.goal, Some(IntentGoal::Explore));
        assert!(intent.confidence < 0.6);
    }

    #[test]
    fn extraction_is_deterministic() {
        let a = extract_intent("can i use honey instead of sugar here");
        let b = extract_intent("can i use honey instead of sugar here");
        assert_eq!(a.goal, b.goal);
        assert_eq!(a.confidence, b.confidence);
    }
}
