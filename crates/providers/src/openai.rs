//! OpenAI-compatible streaming backend.
//!
//! Works with any endpoint following the chat completions contract
//! (Ollama, vLLM, LM Studio, OpenAI itself). Thinking deltas
//! (`reasoning_content`) surface as [`LlmEvent::Thinking`] so the
//! orchestrator never forwards them to clients.
//!
//! The wire is parsed by [`FrameDecoder`], a line-oriented SSE state
//! machine: it buffers raw bytes (a UTF-8 sequence may split across
//! network chunks), decodes complete lines, accumulates `data:` lines,
//! and dispatches one payload per blank-line event boundary.

use serde_json::Value;

use nd_domain::config::LlmConfig;
use nd_domain::error::{Error, Result};
use nd_domain::stream::{BoxStream, LlmEvent, Usage};

use crate::traits::{ChatBackend, ChatRequest};

pub struct OpenAiCompatBackend {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) if !var.is_empty() => std::env::var(var).ok(),
            _ => None,
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.model.clone()),
            "messages": req.messages,
            "stream": true,
        });
        if let Some(temperature) = req.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<LlmEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.build_body(req));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(e.to_string())
            } else {
                Error::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                service: "llm".into(),
                message: format!("status {status}: {body}"),
            });
        }

        let stream = async_stream::stream! {
            let mut response = response;
            let mut decoder = FrameDecoder::new();
            let mut done_emitted = false;

            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        for payload in decoder.feed(&bytes) {
                            for event in parse_chunk(&payload) {
                                if matches!(&event, Ok(LlmEvent::Done { .. })) {
                                    done_emitted = true;
                                }
                                yield event;
                            }
                        }
                    }
                    Ok(None) => {
                        // Body closed; dispatch any event still open.
                        if let Some(payload) = decoder.finish() {
                            for event in parse_chunk(&payload) {
                                if matches!(&event, Ok(LlmEvent::Done { .. })) {
                                    done_emitted = true;
                                }
                                yield event;
                            }
                        }
                        break;
                    }
                    Err(e) => {
                        let error = if e.is_timeout() {
                            Error::Timeout(e.to_string())
                        } else {
                            Error::Http(e.to_string())
                        };
                        yield Err(error);
                        break;
                    }
                }
            }

            // A server that hangs up without `[DONE]` still terminates
            // the event stream cleanly.
            if !done_emitted {
                yield Ok(LlmEvent::Done { usage: None, finish_reason: Some("stop".into()) });
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE frame decoder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Incremental, line-oriented SSE decoder.
///
/// Bytes buffer until a `\n`; each complete line advances the state:
/// `data:` lines accumulate (multi-line data joins with `\n` per the
/// SSE spec), any other field or comment is ignored, and a blank line
/// dispatches the accumulated payload. Buffering bytes rather than text
/// keeps a UTF-8 sequence split across network chunks intact.
struct FrameDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
}

impl FrameDecoder {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            data_lines: Vec::new(),
        }
    }

    /// Feed one network chunk; returns every payload completed by it.
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(nl) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=nl).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(payload) = self.take_line(line.trim_end_matches(['\n', '\r'])) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Advance the state by one complete line. Returns a payload when
    /// the line closes an event.
    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data_lines.is_empty() {
                return None;
            }
            return Some(self.data_lines.drain(..).collect::<Vec<_>>().join("\n"));
        }

        if let Some(value) = line.strip_prefix("data:") {
            // The field value starts after at most one leading space.
            let value = value.strip_prefix(' ').unwrap_or(value);
            if !value.is_empty() {
                self.data_lines.push(value.to_string());
            }
        }
        // event:/id:/retry: fields and ':' comments carry nothing we use.
        None
    }

    /// End of body: a final unterminated line and any open event are
    /// dispatched as one last payload.
    fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let line: Vec<u8> = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&line);
            if let Some(payload) = self.take_line(line.trim_end_matches(['\n', '\r'])) {
                return Some(payload);
            }
        }
        if self.data_lines.is_empty() {
            return None;
        }
        Some(self.data_lines.drain(..).collect::<Vec<_>>().join("\n"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payload parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse one `data:` payload into zero or more events.
fn parse_chunk(payload: &str) -> Vec<Result<LlmEvent>> {
    if payload == "[DONE]" {
        return vec![Ok(LlmEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable stream chunk");
            return Vec::new();
        }
    };

    let mut events = Vec::new();

    if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
        let read = |k: &str| usage.get(k).and_then(Value::as_u64).unwrap_or(0) as u32;
        events.push(Ok(LlmEvent::Done {
            usage: Some(Usage {
                prompt_tokens: read("prompt_tokens"),
                completion_tokens: read("completion_tokens"),
                total_tokens: read("total_tokens"),
            }),
            finish_reason: None,
        }));
        return events;
    }

    let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        return events;
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(text) = delta.get("reasoning_content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(Ok(LlmEvent::Thinking {
                    text: text.to_string(),
                }));
            }
        }
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(Ok(LlmEvent::Token {
                    text: text.to_string(),
                }));
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        events.push(Ok(LlmEvent::Done {
            usage: None,
            finish_reason: Some(reason.to_string()),
        }));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Frame decoder ──────────────────────────────────────────────

    #[test]
    fn decoder_dispatches_on_blank_line() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(b"event: message\ndata: {\"x\":1}\n\n");
        assert_eq!(payloads, vec!["{\"x\":1}"]);
    }

    #[test]
    fn decoder_handles_lines_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: hel").is_empty());
        assert!(decoder.feed(b"lo\n").is_empty());
        let payloads = decoder.feed(b"\n");
        assert_eq!(payloads, vec!["hello"]);
    }

    #[test]
    fn decoder_joins_multiple_data_lines() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(b"data: first\ndata: second\n\n");
        assert_eq!(payloads, vec!["first\nsecond"]);
    }

    #[test]
    fn decoder_tolerates_crlf() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(b"data: payload\r\n\r\n");
        assert_eq!(payloads, vec!["payload"]);
    }

    #[test]
    fn decoder_ignores_other_fields_and_comments() {
        let mut decoder = FrameDecoder::new();
        let payloads = decoder.feed(b": keepalive\nevent: ping\nid: 42\nretry: 5000\ndata: real\n\n");
        assert_eq!(payloads, vec!["real"]);
    }

    #[test]
    fn decoder_finish_flushes_open_event() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: trailing").is_empty());
        assert_eq!(decoder.finish(), Some("trailing".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decoder_keeps_split_utf8_intact() {
        let mut decoder = FrameDecoder::new();
        let bytes = "data: crème\n\n".as_bytes();
        // Split in the middle of the two-byte 'è'.
        let cut = bytes.iter().position(|b| *b > 0x7f).unwrap() + 1;
        assert!(decoder.feed(&bytes[..cut]).is_empty());
        let payloads = decoder.feed(&bytes[cut..]);
        assert_eq!(payloads, vec!["crème"]);
    }

    #[test]
    fn decoder_blank_line_without_data_is_noise() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"\n\n\n").is_empty());
    }

    // ── Payload parsing ────────────────────────────────────────────

    #[test]
    fn parses_token_delta() {
        let events =
            parse_chunk(r#"{"choices":[{"delta":{"content":"hello"}}]}"#);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            LlmEvent::Token { text } if text == "hello"
        ));
    }

    #[test]
    fn parses_reasoning_as_thinking() {
        let events =
            parse_chunk(r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            LlmEvent::Thinking { text } if text == "hmm"
        ));
    }

    #[test]
    fn done_sentinel_yields_done() {
        let events = parse_chunk("[DONE]");
        assert!(matches!(
            events[0].as_ref().unwrap(),
            LlmEvent::Done { .. }
        ));
    }

    #[test]
    fn finish_reason_yields_done() {
        let events = parse_chunk(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        );
        assert!(matches!(
            events[0].as_ref().unwrap(),
            LlmEvent::Done { finish_reason: Some(r), .. } if r == "stop"
        ));
    }

    #[test]
    fn usage_chunk_carries_counts() {
        let events = parse_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        );
        match events[0].as_ref().unwrap() {
            LlmEvent::Done {
                usage: Some(usage), ..
            } => {
                assert_eq!(usage.total_tokens, 15);
            }
            other => panic!("expected usage done, got {other:?}"),
        }
    }

    #[test]
    fn garbage_chunk_is_skipped() {
        assert!(parse_chunk("not json at all").is_empty());
    }
}
