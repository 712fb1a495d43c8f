//! Admin CLI: serve (default), health probe, dataset ingest, and
//! round-trip validation.
//!
//! Exit codes: 0 success, 1 soft failure, 2 hard invariant violation.

pub mod health;
pub mod ingest;
pub mod validate;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use nd_domain::config::Config;
use nd_domain::error::{Error, Result};

#[derive(Debug, Parser)]
#[command(name = "nutrid", about = "Policy-governed food reasoning server")]
pub struct Cli {
    /// Path to config.toml (defaults to ./config.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP/SSE server (default).
    Serve,
    /// Probe local resources and report health.
    Health,
    /// Ingest a named dataset into its index directory.
    Ingest {
        /// Index name: chemistry | science | nutrition_branded |
        /// nutrition_foundation | recipes
        dataset: String,
        /// Re-ingest even when the index already exists.
        #[arg(long)]
        force: bool,
    },
    /// Sample records and verify round-trip retrieval.
    Validate {
        /// Number of records to sample per index.
        #[arg(long, default_value_t = 10)]
        samples: usize,
    },
}

/// Load configuration. A missing file yields defaults; a malformed one
/// is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from("config.toml");
            if !default.exists() {
                tracing::info!("no config.toml found, using defaults");
                return Ok(Config::default());
            }
            default
        }
    };

    let raw = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
    toml::from_str(&raw).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
}

/// Parse a dataset name into an index kind.
pub fn parse_index_kind(name: &str) -> Option<nd_retrieval::IndexKind> {
    use nd_retrieval::IndexKind;
    match name.to_ascii_lowercase().as_str() {
        "chemistry" => Some(IndexKind::Chemistry),
        "science" => Some(IndexKind::Science),
        "nutrition_branded" | "branded" => Some(IndexKind::NutritionBranded),
        "nutrition_foundation" | "foundation" => Some(IndexKind::NutritionFoundation),
        "recipes" => Some(IndexKind::Recipes),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_names_parse() {
        assert!(parse_index_kind("chemistry").is_some());
        assert!(parse_index_kind("BRANDED").is_some());
        assert!(parse_index_kind("unknown").is_none());
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is [not toml").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
