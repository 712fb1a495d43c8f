//! External compound-lookup layer.
//!
//! Two REST calls per ingredient name (name → CID, CID → properties)
//! against a PubChem-shaped API, rate limited to a configured requests
//! per second with exponential-backoff retries on transient failures.
//! Resolution results feed the trace's verification proof.

pub mod client;
pub mod extract;
pub mod resolver;

pub use client::{CompoundProperties, LookupClient};
pub use extract::{extract_compound_mentions, extract_ingredient_names};
pub use resolver::{
    confidence_score, proof_hash, CompoundResolver, ResolutionResult, ResolvedCompound,
    UnresolvedCompound,
};
