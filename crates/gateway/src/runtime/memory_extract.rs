//! Two-stage preference extraction and heuristic context lifting.
//!
//! Stage 1 is a deterministic trigger filter: no trigger, no LLM call.
//! Stage 2 is a constrained structured extraction with exactly three
//! allowed fields; only fields whose stage-1 trigger fired are accepted
//! from the model output. Deterministic triggers record 0.9 confidence,
//! dietary statements 0.95 (safety-critical).

use serde::Deserialize;

use nd_domain::error::Result;
use nd_domain::prefs::SkillLevel;
use nd_providers::{collect_stream, ChatBackend, ChatMessage, ChatRequest};
use nd_sessions::{PreferenceUpdate, SessionContext};

const SKILL_CONFIDENCE: f64 = 0.9;
const EQUIPMENT_CONFIDENCE: f64 = 0.9;
const DIETARY_CONFIDENCE: f64 = 0.95;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage 1 — trigger vocabularies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SKILL_TRIGGERS: &[&str] = &[
    "i'm a beginner",
    "new to cooking",
    "never cooked",
    "first time",
    "i'm experienced",
    "professional chef",
    "i'm an expert",
    "novice",
    "just starting",
    "beginner here",
];

const EQUIPMENT_TRIGGERS: &[&str] = &[
    "i only have",
    "i don't have",
    "my only",
    "just have",
    "using a",
    "got a",
    "all i have",
    "no access to",
];

const DIETARY_TRIGGERS: &[&str] = &[
    "i'm vegan",
    "i don't eat",
    "allergic to",
    "can't have",
    "vegetarian",
    "gluten-free",
    "dairy-free",
    "nut allergy",
    "lactose intolerant",
    "celiac",
];

#[derive(Debug, Clone, Copy)]
pub struct TriggerHits {
    pub skill: bool,
    pub equipment: bool,
    pub dietary: bool,
}

impl TriggerHits {
    pub fn any(&self) -> bool {
        self.skill || self.equipment || self.dietary
    }
}

/// Deterministic stage-1 filter.
pub fn detect_triggers(message: &str) -> TriggerHits {
    let msg = message.to_lowercase();
    TriggerHits {
        skill: SKILL_TRIGGERS.iter().any(|t| msg.contains(t)),
        equipment: EQUIPMENT_TRIGGERS.iter().any(|t| msg.contains(t)),
        dietary: DIETARY_TRIGGERS.iter().any(|t| msg.contains(t)),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stage 2 — constrained extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The only shape the extraction prompt allows.
#[derive(Debug, Deserialize, Default)]
struct ExtractedFields {
    #[serde(default)]
    skill_level: Option<String>,
    #[serde(default)]
    equipment: Vec<String>,
    #[serde(default)]
    dietary_constraints: Vec<String>,
}

/// Extract preference updates from a message. Returns `None` when no
/// trigger fired (no LLM call) or when extraction produced nothing
/// usable. Un-triggered fields in the model output are rejected.
pub async fn extract_preferences(
    backend: &dyn ChatBackend,
    message: &str,
) -> Result<Option<PreferenceUpdate>> {
    let hits = detect_triggers(message);
    if !hits.any() {
        return Ok(None);
    }
    tracing::info!(
        skill = hits.skill,
        equipment = hits.equipment,
        dietary = hits.dietary,
        "preference triggers detected"
    );

    let prompt = format!(
        "Extract user preferences from this message. Return ONLY a JSON \
         object with these fields (omit a field if not mentioned):\n\
         - skill_level: \"beginner\" | \"intermediate\" | \"expert\"\n\
         - equipment: list of equipment names\n\
         - dietary_constraints: list of dietary restrictions\n\n\
         Message: \"{message}\"\n\n\
         Return only valid JSON, no explanation."
    );

    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        temperature: Some(0.1),
        max_tokens: Some(150),
        model: None,
    };
    let stream = backend.chat_stream(&request).await?;
    let raw = collect_stream(stream, |_| {}).await?;

    let Some(fields) = parse_json_object(&raw) else {
        tracing::warn!("preference extraction returned no parseable JSON");
        return Ok(None);
    };

    let mut update = PreferenceUpdate::default();
    if hits.skill {
        if let Some(level) = fields.skill_level.as_deref().and_then(SkillLevel::parse) {
            update.skill_level = Some((level, SKILL_CONFIDENCE));
        }
    }
    if hits.equipment {
        update.equipment = fields
            .equipment
            .into_iter()
            .map(|e| (e.to_lowercase(), EQUIPMENT_CONFIDENCE))
            .collect();
    }
    if hits.dietary {
        update.dietary_constraints = fields
            .dietary_constraints
            .into_iter()
            .map(|d| (d.to_lowercase(), DIETARY_CONFIDENCE))
            .collect();
    }

    if update.is_empty() {
        return Ok(None);
    }
    tracing::info!(?update, "preferences extracted");
    Ok(Some(update))
}

/// Pull the first `{…}` block out of a model response and parse it.
fn parse_json_object(raw: &str) -> Option<ExtractedFields> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context extraction (heuristic, no LLM)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const DISH_PATTERNS: &[&str] = &["making ", "cook ", "prepare ", "recipe for "];
const TECHNIQUES: &[&str] = &[
    "frying", "baking", "roasting", "grilling", "steaming", "boiling", "sautéing",
];

/// Lift the current dish and technique from a user message. Returns
/// `None` rather than an empty context so a null extraction can never
/// overwrite stored state.
pub fn extract_context(message: &str) -> Option<SessionContext> {
    let msg = message.to_lowercase();
    let mut context = SessionContext::default();

    for pattern in DISH_PATTERNS {
        if let Some(idx) = msg.find(pattern) {
            let tail = &msg[idx + pattern.len()..];
            // Stop at the first punctuation; keep at most three words.
            let clause = tail.split(['.', ',', '?', '!']).next().unwrap_or("");
            let dish: Vec<&str> = clause.split_whitespace().take(3).collect();
            if !dish.is_empty() {
                context.current_dish = Some(dish.join(" "));
                break;
            }
        }
    }

    for technique in TECHNIQUES {
        if msg.contains(technique) {
            context.technique = Some(technique.to_string());
            break;
        }
    }

    if context.is_empty() {
        None
    } else {
        Some(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_domain::stream::{BoxStream, LlmEvent};

    /// Backend returning a fixed response.
    struct CannedBackend {
        response: String,
    }

    #[async_trait::async_trait]
    impl ChatBackend for CannedBackend {
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<LlmEvent>>> {
            let response = self.response.clone();
            Ok(Box::pin(async_stream::stream! {
                yield Ok(LlmEvent::Token { text: response });
                yield Ok(LlmEvent::Done { usage: None, finish_reason: Some("stop".into()) });
            }))
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn no_trigger_means_no_llm_call() {
        // A backend that would fail loudly if called.
        struct PanicBackend;
        #[async_trait::async_trait]
        impl ChatBackend for PanicBackend {
            async fn chat_stream(
                &self,
                _req: &ChatRequest,
            ) -> Result<BoxStream<'static, Result<LlmEvent>>> {
                panic!("stage 2 must not run without a trigger");
            }
            fn model_name(&self) -> &str {
                "panic"
            }
        }

        let update = extract_preferences(&PanicBackend, "what's a good weeknight recipe?")
            .await
            .unwrap();
        assert!(update.is_none());
    }

    #[tokio::test]
    async fn dietary_trigger_records_high_confidence() {
        let backend = CannedBackend {
            response: r#"{"dietary_constraints": ["vegan"]}"#.into(),
        };
        let update = extract_preferences(&backend, "I'm vegan, what can I cook?")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.dietary_constraints, vec![("vegan".to_string(), 0.95)]);
    }

    #[tokio::test]
    async fn untriggered_fields_are_rejected() {
        // Skill trigger fired, but the model also invents equipment.
        let backend = CannedBackend {
            response: r#"{"skill_level": "beginner", "equipment": ["sous vide"]}"#.into(),
        };
        let update = extract_preferences(&backend, "I'm a beginner in the kitchen")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.skill_level, Some((SkillLevel::Beginner, 0.9)));
        assert!(update.equipment.is_empty());
    }

    #[tokio::test]
    async fn equipment_trigger_accepts_equipment() {
        let backend = CannedBackend {
            response: r#"{"equipment": ["Air Fryer"]}"#.into(),
        };
        let update = extract_preferences(&backend, "I only have an air fryer")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.equipment, vec![("air fryer".to_string(), 0.9)]);
    }

    #[tokio::test]
    async fn garbage_model_output_yields_none() {
        let backend = CannedBackend {
            response: "sorry, I can't help with that".into(),
        };
        let update = extract_preferences(&backend, "I'm vegan").await.unwrap();
        assert!(update.is_none());
    }

    #[tokio::test]
    async fn json_wrapped_in_prose_still_parses() {
        let backend = CannedBackend {
            response: "Here you go: {\"skill_level\": \"expert\"} hope that helps".into(),
        };
        let update = extract_preferences(&backend, "i'm an expert cook")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.skill_level, Some((SkillLevel::Expert, 0.9)));
    }

    // ── Context extraction ─────────────────────────────────────────

    #[test]
    fn context_lifts_dish_and_technique() {
        let context = extract_context("I'm making shakshuka tonight, baking the eggs in").unwrap();
        assert_eq!(context.current_dish.as_deref(), Some("shakshuka tonight"));
        assert_eq!(context.technique.as_deref(), Some("baking"));
    }

    #[test]
    fn context_returns_none_when_empty() {
        assert!(extract_context("that was delicious, thanks!").is_none());
    }

    #[test]
    fn technique_alone_is_enough() {
        let context = extract_context("is frying always this messy").unwrap();
        assert_eq!(context.technique.as_deref(), Some("frying"));
        assert!(context.current_dish.is_none());
    }
}
