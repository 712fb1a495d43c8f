//! Policy layer — the deterministic decisions made before any heavy
//! lifting: execution profile, response mode, thinking phases, intent.
//!
//! Nothing in this crate calls an LLM or performs I/O beyond reading the
//! resource monitor; every function is a pure mapping from inputs to a
//! decision, which is what makes the whole layer unit-testable.

pub mod classifier;
pub mod engine;
pub mod intent;
pub mod phases;

pub use classifier::classify_response_mode;
pub use engine::{ExecutionPolicy, LatencyBudget, PolicyEngine, ResourceState};
pub use intent::extract_intent;
pub use phases::{select_phases, validate_phase_content, PhasePrefs};
