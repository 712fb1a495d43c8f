//! Execution trace — the append-only, per-request record of every agent
//! invocation, claim, and verification proof, plus the deterministic
//! claim parser used for narrative recovery.

pub mod claims;
pub mod trace;

pub use claims::{extract_recovery_claims, narrative_asserts_mechanism, ClaimParser};
pub use trace::{AgentInvocation, CompoundTrace, ExecutionTrace, TraceStatus};
