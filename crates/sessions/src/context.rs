//! Ephemeral session-scoped cooking context.
//!
//! Replaced wholesale on update, never merged with older entries, and
//! never overwritten by an empty extraction — the caller only passes a
//! context when the extractor actually found something.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nd_domain::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionContext {
    #[serde(default)]
    pub current_dish: Option<String>,
    #[serde(default)]
    pub key_ingredients: Vec<String>,
    #[serde(default)]
    pub technique: Option<String>,
}

impl SessionContext {
    pub fn is_empty(&self) -> bool {
        self.current_dish.is_none() && self.key_ingredients.is_empty() && self.technique.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContextEntry {
    context: SessionContext,
    updated_at: DateTime<Utc>,
}

/// JSON-file backed context store keyed by session id.
pub struct ContextStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, ContextEntry>>,
}

impl ContextStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("session_context.json");
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn get(&self, session_id: &str) -> SessionContext {
        self.entries
            .read()
            .get(session_id)
            .map(|e| e.context.clone())
            .unwrap_or_default()
    }

    /// Replace the session's context. Empty contexts are rejected so a
    /// null extraction cannot wipe valid state.
    pub fn replace(&self, session_id: &str, context: SessionContext) {
        if context.is_empty() {
            tracing::debug!(session_id, "ignoring empty context extraction");
            return;
        }
        self.entries.write().insert(
            session_id.to_owned(),
            ContextEntry {
                context,
                updated_at: Utc::now(),
            },
        );
        self.flush();
        tracing::debug!(session_id, "session context replaced");
    }

    /// Drop context for a deleted or decayed session.
    pub fn clear(&self, session_id: &str) {
        self.entries.write().remove(session_id);
        self.flush();
    }

    fn flush(&self) {
        let entries = self.entries.read();
        match serde_json::to_string_pretty(&*entries) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(error = %e, "context flush failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "context serialization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx(dish: &str) -> SessionContext {
        SessionContext {
            current_dish: Some(dish.to_string()),
            key_ingredients: vec!["eggs".into()],
            technique: Some("frying".into()),
        }
    }

    #[test]
    fn replace_overwrites_not_merges() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        store.replace("s1", ctx("carbonara"));
        store.replace(
            "s1",
            SessionContext {
                current_dish: Some("risotto".into()),
                key_ingredients: vec![],
                technique: None,
            },
        );
        let current = store.get("s1");
        assert_eq!(current.current_dish.as_deref(), Some("risotto"));
        // The old ingredients are gone — replaced, never merged.
        assert!(current.key_ingredients.is_empty());
    }

    #[test]
    fn empty_context_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        store.replace("s1", ctx("carbonara"));
        store.replace("s1", SessionContext::default());
        assert_eq!(store.get("s1").current_dish.as_deref(), Some("carbonara"));
    }

    #[test]
    fn clear_removes_entry() {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        store.replace("s1", ctx("carbonara"));
        store.clear("s1");
        assert!(store.get("s1").is_empty());
    }
}
