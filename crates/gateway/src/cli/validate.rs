//! `nutrid validate --samples N` — verify round-trip retrieval.
//!
//! For each ingested index: sample N records, search the index with the
//! record's own text, and require the record back in the results. A
//! miss is an index-corruption signal and exits 2.

use std::sync::Arc;

use nd_domain::config::Config;
use nd_retrieval::{IndexKind, IndexLoader};

use crate::indexes::FsIndexLoader;

const ALL_KINDS: [IndexKind; 5] = [
    IndexKind::Chemistry,
    IndexKind::Science,
    IndexKind::NutritionBranded,
    IndexKind::NutritionFoundation,
    IndexKind::Recipes,
];

pub async fn run(config: &Config, samples: usize) -> i32 {
    let loader = Arc::new(FsIndexLoader::new(config.retrieval.index_root.clone()));
    let mut validated_any = false;

    for kind in ALL_KINDS {
        let docs = match FsIndexLoader::read_docs(&config.retrieval.index_root, kind) {
            Ok(docs) => docs,
            Err(_) => continue, // not ingested: skip, not a failure
        };
        if docs.is_empty() {
            continue;
        }
        validated_any = true;

        let index = match loader.load(kind) {
            Ok(index) => index,
            Err(e) => {
                eprintln!("index '{}' failed to load: {e}", kind.as_str());
                return 1;
            }
        };

        // Deterministic sampling: evenly spaced records.
        let step = (docs.len() / samples.max(1)).max(1);
        let mut checked = 0usize;
        for doc in docs.iter().step_by(step).take(samples) {
            checked += 1;
            let hits = match index.search(doc, 3).await {
                Ok(hits) => hits,
                Err(e) => {
                    eprintln!("search failed on '{}': {e}", kind.as_str());
                    return 1;
                }
            };
            if !hits.iter().any(|h| h.text == *doc) {
                eprintln!(
                    "round-trip failure in '{}': record not retrievable: {:.60}",
                    kind.as_str(),
                    doc
                );
                return 2;
            }
        }
        println!(
            "index '{}': {checked} samples round-tripped cleanly",
            kind.as_str()
        );
    }

    if !validated_any {
        eprintln!("no ingested indexes found; run `nutrid ingest <dataset>` first");
        return 1;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_passes_on_clean_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.retrieval.index_root = dir.path().to_path_buf();

        let kind_dir = dir.path().join("recipes");
        std::fs::create_dir_all(&kind_dir).unwrap();
        std::fs::write(
            kind_dir.join("docs.jsonl"),
            "{\"text\": \"slow braised lamb shoulder\"}\n{\"text\": \"charred leek vinaigrette\"}\n",
        )
        .unwrap();

        assert_eq!(run(&config, 5).await, 0);
    }

    #[tokio::test]
    async fn validate_soft_fails_without_indexes() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.retrieval.index_root = dir.path().to_path_buf();
        assert_eq!(run(&config, 5).await, 1);
    }
}
