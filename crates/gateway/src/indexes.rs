//! Concrete index wiring for the gateway.
//!
//! The retrieval core only knows the `VectorIndex`/`IndexLoader` traits;
//! this module supplies the on-disk implementation: one directory per
//! index kind under the configured root, documents in `docs.jsonl`, and
//! a term-overlap scorer standing in for the external embedding model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use nd_domain::error::{Error, Result};
use nd_monitor::ResourceMonitor;
use nd_retrieval::{Hit, IndexKind, IndexLoader, MemoryGate, VectorIndex};

/// One stored document.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDoc {
    pub text: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyword index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory index scored by term overlap. The production embedding
/// model is an external collaborator; this keeps the retrieval surface
/// honest without it.
pub struct KeywordIndex {
    docs: Vec<String>,
}

impl KeywordIndex {
    pub fn new(docs: Vec<String>) -> Self {
        Self { docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn overlap_score(query_terms: &[String], doc: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let doc_lower = doc.to_lowercase();
    let matched = query_terms
        .iter()
        .filter(|t| doc_lower.contains(t.as_str()))
        .count();
    matched as f64 / query_terms.len() as f64
}

#[async_trait::async_trait]
impl VectorIndex for KeywordIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(|t| t.to_string())
            .collect();

        let mut hits: Vec<Hit> = self
            .docs
            .iter()
            .map(|doc| Hit {
                text: doc.clone(),
                score: overlap_score(&terms, doc),
                index_kind: None,
            })
            .filter(|h| h.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filesystem loader
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FsIndexLoader {
    root: PathBuf,
}

impl FsIndexLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of a kind's ingested document file.
    pub fn docs_path(root: &Path, kind: IndexKind) -> PathBuf {
        root.join(kind.as_str()).join("docs.jsonl")
    }

    /// Location of a kind's raw source file (ingest input).
    pub fn source_path(root: &Path, kind: IndexKind) -> PathBuf {
        root.join(kind.as_str()).join("source.jsonl")
    }

    /// Read every document of an ingested index.
    pub fn read_docs(root: &Path, kind: IndexKind) -> Result<Vec<String>> {
        let path = Self::docs_path(root, kind);
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "index '{}' not ingested at {}",
                kind.as_str(),
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut docs = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let doc: IndexDoc = serde_json::from_str(line).map_err(|e| {
                Error::Integrity(format!(
                    "malformed record at {}:{}: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            docs.push(doc.text);
        }
        Ok(docs)
    }
}

impl IndexLoader for FsIndexLoader {
    fn load(&self, kind: IndexKind) -> Result<Arc<dyn VectorIndex>> {
        let docs = Self::read_docs(&self.root, kind)?;
        tracing::info!(index = kind.as_str(), docs = docs.len(), "index loaded");
        Ok(Arc::new(KeywordIndex::new(docs)))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Monitor-backed memory gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Admission gate consulting the resource monitor before index loads.
pub struct MonitorGate {
    monitor: Arc<ResourceMonitor>,
}

impl MonitorGate {
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self { monitor }
    }
}

impl MemoryGate for MonitorGate {
    fn ensure(&self, required_gb: f64) -> Result<()> {
        self.monitor
            .check_budget(&format!("index_load ({required_gb:.1} GB)"), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyword_index_ranks_by_overlap() {
        let index = KeywordIndex::new(vec![
            "capsaicin binds the trpv1 receptor".into(),
            "bread rises because yeast produces gas".into(),
        ]);
        let hits = index.search("why does capsaicin feel hot", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("capsaicin"));
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let index = KeywordIndex::new(vec!["a doc about stew".into()]);
        assert!(index.search("", 5).await.unwrap().is_empty());
    }

    #[test]
    fn read_docs_rejects_malformed_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let kind_dir = dir.path().join(IndexKind::Recipes.as_str());
        std::fs::create_dir_all(&kind_dir).unwrap();
        std::fs::write(
            kind_dir.join("docs.jsonl"),
            "{\"text\": \"ok\"}\nnot json\n",
        )
        .unwrap();

        let err = FsIndexLoader::read_docs(dir.path(), IndexKind::Recipes).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn missing_index_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = FsIndexLoader::read_docs(dir.path(), IndexKind::Science).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
