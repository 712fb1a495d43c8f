//! External-collaborator traits for vector indexes.

use serde::Serialize;
use std::sync::Arc;

use nd_domain::error::Result;

use crate::router::IndexKind;

/// One retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub text: String,
    pub score: f64,
    /// Filled by the router with the index the hit came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_kind: Option<IndexKind>,
}

/// A loaded vector index. Search embeds the query internally, which is
/// why callers route through the embedding throttle.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>>;
}

/// Loads indexes from wherever they live on disk. Injected so the core
/// never sees index formats.
pub trait IndexLoader: Send + Sync {
    fn load(&self, kind: IndexKind) -> Result<Arc<dyn VectorIndex>>;
}
