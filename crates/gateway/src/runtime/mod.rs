//! Per-request runtime: the event bus, the orchestration pipeline, the
//! response engine, governance, and memory extraction.

pub mod agents;
pub mod bus;
pub mod engine;
pub mod governance;
pub mod memory_extract;
pub mod orchestrator;
pub mod persona;
pub mod stream;

pub use bus::{EventBus, QueueItem};
pub use orchestrator::ChatInput;
pub use stream::sse_stream;
