use nd_domain::error::Result;
use nd_domain::stream::{BoxStream, LlmEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One conversation message in backend-agnostic form.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    /// "system" | "user" | "assistant"
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A backend-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature. `None` lets the backend choose.
    pub temperature: Option<f32>,
    /// Response cap in tokens. `None` lets the backend choose.
    pub max_tokens: Option<u32>,
    /// Model override. `None` uses the configured default.
    pub model: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every chat backend adapter implements. The orchestrator only
/// streams; non-streaming callers collect the stream themselves.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Stream a chat completion as token events.
    async fn chat_stream(&self, req: &ChatRequest)
        -> Result<BoxStream<'static, Result<LlmEvent>>>;

    /// The model this backend runs.
    fn model_name(&self) -> &str;
}

/// Drain a stream into the full response text, invoking `on_token` for
/// each token chunk as it arrives.
pub async fn collect_stream<F>(
    mut stream: BoxStream<'static, Result<LlmEvent>>,
    mut on_token: F,
) -> Result<String>
where
    F: FnMut(&str),
{
    use futures_util::StreamExt;

    let mut buffer = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            LlmEvent::Token { text } => {
                on_token(&text);
                buffer.push_str(&text);
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
    Ok(buffer)
}
