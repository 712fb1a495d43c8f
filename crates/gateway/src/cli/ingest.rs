//! `nutrid ingest <dataset> [--force]` — normalize a raw source file
//! into the index's document store.
//!
//! The heavy ingestion pipeline lives outside this server; what the CLI
//! owns is the contract: every record of `source.jsonl` must parse, and
//! the normalized `docs.jsonl` is only rewritten on `--force`.

use nd_domain::config::Config;
use nd_domain::error::Error;
use nd_retrieval::IndexKind;

use crate::indexes::{FsIndexLoader, IndexDoc};

pub fn run(config: &Config, dataset: &str, force: bool) -> i32 {
    let Some(kind) = super::parse_index_kind(dataset) else {
        eprintln!("unknown dataset '{dataset}'");
        return 1;
    };

    match ingest(config, kind, force) {
        Ok(count) => {
            println!("ingested {count} records into '{}'", kind.as_str());
            0
        }
        Err(Error::Integrity(msg)) => {
            eprintln!("integrity violation: {msg}");
            2
        }
        Err(e) => {
            eprintln!("ingest failed: {e}");
            1
        }
    }
}

fn ingest(config: &Config, kind: IndexKind, force: bool) -> nd_domain::error::Result<usize> {
    let root = &config.retrieval.index_root;
    let source = FsIndexLoader::source_path(root, kind);
    let target = FsIndexLoader::docs_path(root, kind);

    if target.exists() && !force {
        let existing = FsIndexLoader::read_docs(root, kind)?;
        println!(
            "index '{}' already ingested ({} records); use --force to re-ingest",
            kind.as_str(),
            existing.len()
        );
        return Ok(existing.len());
    }

    if !source.exists() {
        return Err(Error::NotFound(format!(
            "source file missing: {}",
            source.display()
        )));
    }

    let raw = std::fs::read_to_string(&source)?;
    let mut docs = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let doc: IndexDoc = serde_json::from_str(line).map_err(|e| {
            Error::Integrity(format!(
                "malformed source record at {}:{}: {e}",
                source.display(),
                line_no + 1
            ))
        })?;
        if doc.text.trim().is_empty() {
            return Err(Error::Integrity(format!(
                "empty document at {}:{}",
                source.display(),
                line_no + 1
            )));
        }
        docs.push(doc.text);
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = String::new();
    for text in &docs {
        out.push_str(&serde_json::json!({ "text": text }).to_string());
        out.push('\n');
    }
    std::fs::write(&target, out)?;

    tracing::info!(index = kind.as_str(), records = docs.len(), "dataset ingested");
    Ok(docs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_root(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.retrieval.index_root = root.to_path_buf();
        config
    }

    #[test]
    fn ingest_normalizes_source_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_with_root(dir.path());
        let source_dir = dir.path().join("recipes");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(
            source_dir.join("source.jsonl"),
            "{\"text\": \"braised short ribs\"}\n{\"text\": \"miso glaze\"}\n",
        )
        .unwrap();

        let count = ingest(&config, IndexKind::Recipes, false).unwrap();
        assert_eq!(count, 2);
        let docs = FsIndexLoader::read_docs(dir.path(), IndexKind::Recipes).unwrap();
        assert_eq!(docs, vec!["braised short ribs", "miso glaze"]);
    }

    #[test]
    fn existing_index_requires_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_with_root(dir.path());
        let source_dir = dir.path().join("recipes");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(source_dir.join("source.jsonl"), "{\"text\": \"one\"}\n").unwrap();

        ingest(&config, IndexKind::Recipes, false).unwrap();
        // Change the source; without --force the old docs survive.
        std::fs::write(
            source_dir.join("source.jsonl"),
            "{\"text\": \"one\"}\n{\"text\": \"two\"}\n",
        )
        .unwrap();
        assert_eq!(ingest(&config, IndexKind::Recipes, false).unwrap(), 1);
        assert_eq!(ingest(&config, IndexKind::Recipes, true).unwrap(), 2);
    }

    #[test]
    fn malformed_source_is_integrity_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_with_root(dir.path());
        let source_dir = dir.path().join("science");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(source_dir.join("source.jsonl"), "garbage\n").unwrap();

        let err = ingest(&config, IndexKind::Science, false).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn missing_source_is_soft_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config_with_root(dir.path());
        let err = ingest(&config, IndexKind::Science, false).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
