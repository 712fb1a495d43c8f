//! Stream event types — both the LLM-backend stream and the orchestrator
//! event bus that feeds the SSE surface.

use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM backend events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted while streaming from the chat backend (provider-agnostic).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LlmEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// Reasoning/thinking content, never forwarded to the client.
    #[serde(rename = "thinking")]
    Thinking { text: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator events (the SSE wire shapes)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Terminal status carried by the `done` event. Exactly one `done` is
/// emitted per stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoneStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "RESOURCE_EXCEEDED")]
    ResourceExceeded,
    /// Client disconnected before completion.
    #[serde(rename = "aborted")]
    Aborted,
}

/// One event on the per-request stream. Serialized as the `data` payload
/// of an SSE frame; the SSE `event:` name comes from [`StreamEvent::kind`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Status {
        phase: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    ThinkingPhase {
        #[serde(rename = "type")]
        phase_type: String,
        content: String,
        duration_ms: u64,
    },
    Token {
        text: String,
    },
    Enhancement {
        #[serde(flatten)]
        payload: serde_json::Value,
        message: String,
    },
    NutritionReport {
        #[serde(flatten)]
        report: serde_json::Value,
    },
    ExecutionTrace {
        #[serde(flatten)]
        trace: serde_json::Value,
    },
    Ping {},
    ErrorEvent {
        message: String,
        phase: String,
        status: String,
    },
    Done {
        status: DoneStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl StreamEvent {
    /// The SSE `event:` name for this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::ThinkingPhase { .. } => "thinking_phase",
            Self::Token { .. } => "token",
            Self::Enhancement { .. } => "enhancement",
            Self::NutritionReport { .. } => "nutrition_report",
            Self::ExecutionTrace { .. } => "execution_trace",
            Self::Ping {} => "ping",
            Self::ErrorEvent { .. } => "error_event",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn done(status: DoneStatus, message: Option<String>) -> Self {
        Self::Done {
            status,
            message,
            reason: None,
        }
    }

    pub fn aborted(reason: &str) -> Self {
        Self::Done {
            status: DoneStatus::Aborted,
            message: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// A sequence-stamped event envelope. `seq_id` is strictly increasing per
/// stream; `ts` is Unix seconds.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub seq_id: u64,
    pub ts: f64,
    #[serde(flatten)]
    pub event: StreamEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&DoneStatus::ResourceExceeded).unwrap(),
            r#""RESOURCE_EXCEEDED""#
        );
        assert_eq!(serde_json::to_string(&DoneStatus::Ok).unwrap(), r#""OK""#);
    }

    #[test]
    fn envelope_flattens_event_fields() {
        let env = Envelope {
            seq_id: 3,
            ts: 1234.5,
            event: StreamEvent::Token {
                text: "hi".into(),
            },
        };
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["seq_id"], 3);
        assert_eq!(value["text"], "hi");
    }

    #[test]
    fn kinds_cover_wire_contract() {
        assert_eq!(StreamEvent::Ping {}.kind(), "ping");
        assert_eq!(
            StreamEvent::done(DoneStatus::Ok, None).kind(),
            "done"
        );
        assert!(StreamEvent::done(DoneStatus::Failed, None).is_done());
    }

    #[test]
    fn aborted_done_carries_reason() {
        let event = StreamEvent::aborted("client_disconnect");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], "aborted");
        assert_eq!(value["reason"], "client_disconnect");
    }
}
