//! Enhancement agents executed by the DAG scheduler.
//!
//! Each agent is one focused LLM call. The scheduler handles
//! dependencies and pruning; these functions only build prompts and
//! normalize outputs into JSON values.

use std::sync::Arc;

use serde_json::{json, Value};

use nd_domain::error::Result;
use nd_providers::{collect_stream, ChatBackend, ChatMessage, ChatRequest};

/// Run one enhancement agent: a single bounded completion, returned as
/// `{"agent": name, "content": text}`.
pub async fn run_agent(
    backend: Arc<dyn ChatBackend>,
    name: &'static str,
    prompt: String,
) -> Result<Value> {
    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        temperature: Some(0.3),
        max_tokens: Some(350),
        model: None,
    };
    let stream = backend.chat_stream(&request).await?;
    let content = collect_stream(stream, |_| {}).await?;
    Ok(json!({ "agent": name, "content": content.trim() }))
}

/// Predict the sensory profile (texture, aroma, mouthfeel) of the dish.
pub fn sensory_prompt(subject: &str) -> String {
    format!(
        "Predict the sensory profile of the following dish: dominant \
         textures, aromas, and mouthfeel, each with a one-line driver. \
         Qualitative only, no numbers.\n\nDISH:\n{subject}"
    )
}

/// Explain the dominant sensory drivers for a given audience.
pub fn explanation_prompt(sensory_result: &Value, audience: &str) -> String {
    format!(
        "Explain for a {audience} audience why the dish will taste and \
         feel this way. Focus on the two strongest drivers.\n\n\
         SENSORY PROFILE:\n{sensory_result}"
    )
}

/// Sanity-check the working answer for internally inconsistent or
/// implausible cooking claims.
pub fn verification_prompt(subject: &str) -> String {
    format!(
        "Review the following cooking reasoning for contradictions or \
         implausible claims. Reply with a short list of concerns, or \
         'consistent' if none.\n\nREASONING:\n{subject}"
    )
}

/// Propose trade-off variants along competing sensory axes.
pub fn frontier_prompt(subject: &str) -> String {
    format!(
        "Propose three variants of this dish trading off richness, \
         texture, and effort. One line each, qualitative only.\n\n\
         DISH:\n{subject}"
    )
}

/// Pick the variant matching the user's optimization goal.
pub fn selector_prompt(frontier_result: &Value, goal: &str) -> String {
    format!(
        "Given these variants, select the one best matching the goal \
         '{goal}' and justify the choice in two sentences.\n\n\
         VARIANTS:\n{frontier_result}"
    )
}

/// Speculative pre-render of a recipe card for the working dish.
pub fn renderer_prompt(subject: &str) -> String {
    format!(
        "Draft a compact Markdown recipe card (# Title, ## Ingredients, \
         ## Steps) for the dish below. Quantities allowed, no nutrition \
         numbers.\n\nDISH:\n{subject}"
    )
}
