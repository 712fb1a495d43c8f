//! Parallel DAG scheduler for enhancement agents.
//!
//! Each vertex is an async agent; edges are dependency names. Nodes with
//! no shared dependency run in parallel, a node starts strictly after
//! all of its dependencies complete, and failure or cancellation
//! cascades downstream without aborting the rest of the graph.

mod dag;

pub use dag::{AgentNode, DagScheduler, NodeOutcome, PruneConfig};
