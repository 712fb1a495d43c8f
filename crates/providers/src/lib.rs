//! LLM backend adapters.
//!
//! The orchestrator talks to one [`ChatBackend`] trait; the shipped
//! adapter speaks the OpenAI-compatible chat completions protocol
//! (Ollama, vLLM, LM Studio, and friends). Tokens pass through a
//! real-time artifact scrubber before they reach the event bus.

pub mod openai;
pub mod scrub;
pub mod traits;

pub use openai::OpenAiCompatBackend;
pub use scrub::TokenScrubber;
pub use traits::{collect_stream, ChatBackend, ChatMessage, ChatRequest};
