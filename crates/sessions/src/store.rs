//! Gateway-owned session store.
//!
//! Persists session state in `sessions.json` under the configured state
//! path. Each session maps to a [`SessionEntry`] tracking ownership, the
//! message history, the current response mode, and activity timestamps.
//!
//! Sessions soft-decay after an idle timeout: the history is cleared and
//! the mode reset, but the session id persists.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nd_domain::error::{Error, Result};
use nd_domain::modes::ResponseMode;

/// Words kept by the deterministic title heuristic.
const TITLE_WORDS: usize = 7;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One conversation turn. Append-only within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntry {
    /// "user" | "assistant" | "system"
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Trace payload attached to assistant turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_trace: Option<serde_json::Value>,
}

/// A single session tracked by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session_id: String,
    pub owner_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub response_mode: ResponseMode,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<MessageEntry>,
}

/// Listing row for `GET /api/conversations`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub last_active: DateTime<Utc>,
    pub preview: String,
    pub mode: ResponseMode,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-file backed session store. Reads take snapshots; mutations
/// serialize through the write lock.
pub struct SessionStore {
    sessions_path: PathBuf,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    decay_hours: u32,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions.json`.
    pub fn new(state_path: &Path, decay_hours: u32) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let sessions_path = state_path.join("sessions.json");

        let sessions = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        Ok(Self {
            sessions_path,
            sessions: RwLock::new(sessions),
            decay_hours,
        })
    }

    /// Look up a session snapshot.
    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Mint a fresh session id and claim it for `owner_id`.
    pub fn create(&self, owner_id: &str) -> SessionEntry {
        let session_id = format!("sess_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let (entry, _) = self.resolve_or_create(&session_id, owner_id);
        entry
    }

    /// Resolve a session, lazily creating it with `owner_id` as the
    /// owner. Returns `(entry, is_new)`.
    pub fn resolve_or_create(&self, session_id: &str, owner_id: &str) -> (SessionEntry, bool) {
        // Fast path: session already exists.
        {
            let sessions = self.sessions.read();
            if let Some(entry) = sessions.get(session_id) {
                return (entry.clone(), false);
            }
        }

        let now = Utc::now();
        let entry = SessionEntry {
            session_id: session_id.to_owned(),
            owner_id: owner_id.to_owned(),
            conversation_id: session_id.to_owned(),
            title: None,
            response_mode: ResponseMode::Conversation,
            created_at: now,
            last_active_at: now,
            messages: Vec::new(),
        };

        self.sessions
            .write()
            .insert(session_id.to_owned(), entry.clone());
        self.flush();

        tracing::info!(session_id, owner_id, "new session created");
        (entry, true)
    }

    /// Enforce ownership: any cross-user access fails.
    pub fn authorize(&self, session_id: &str, user_id: &str) -> Result<()> {
        let sessions = self.sessions.read();
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| Error::NotFound(format!("session '{session_id}'")))?;
        if entry.owner_id != user_id {
            tracing::warn!(session_id, user_id, "ownership violation");
            return Err(Error::PermissionDenied(format!(
                "session '{session_id}' belongs to another user"
            )));
        }
        Ok(())
    }

    /// Soft-decay check: when the session idled past the timeout, clear
    /// its history and reset the mode, keeping the id. Returns true when
    /// a decay happened.
    pub fn check_and_reset_decay(&self, session_id: &str) -> bool {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let Some(entry) = sessions.get_mut(session_id) else {
            return false;
        };

        let idle = now.signed_duration_since(entry.last_active_at);
        if idle.num_seconds() <= self.decay_hours as i64 * 3600 {
            return false;
        }

        tracing::info!(
            session_id,
            idle_hours = idle.num_hours(),
            "session decayed — clearing history"
        );
        entry.messages.clear();
        entry.response_mode = ResponseMode::Conversation;
        entry.conversation_id = uuid::Uuid::new_v4().to_string();
        entry.last_active_at = now;
        drop(sessions);
        self.flush();
        true
    }

    /// Append a message and update activity. The first user turn sets
    /// the session title (first seven words).
    pub fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        execution_trace: Option<serde_json::Value>,
    ) {
        let mut sessions = self.sessions.write();
        let Some(entry) = sessions.get_mut(session_id) else {
            tracing::warn!(session_id, "add_message on unknown session");
            return;
        };

        if entry.title.is_none() && role == "user" {
            entry.title = Some(title_from(content));
        }

        entry.messages.push(MessageEntry {
            role: role.to_owned(),
            content: content.to_owned(),
            created_at: Utc::now(),
            execution_trace,
        });
        entry.last_active_at = Utc::now();
        drop(sessions);
        self.flush();
    }

    /// Most recent messages, oldest first.
    pub fn history(&self, session_id: &str, limit: usize) -> Vec<MessageEntry> {
        let sessions = self.sessions.read();
        let Some(entry) = sessions.get(session_id) else {
            return Vec::new();
        };
        let skip = entry.messages.len().saturating_sub(limit);
        entry.messages[skip..].to_vec()
    }

    pub fn response_mode(&self, session_id: &str) -> ResponseMode {
        self.sessions
            .read()
            .get(session_id)
            .map(|e| e.response_mode)
            .unwrap_or_default()
    }

    pub fn set_response_mode(&self, session_id: &str, mode: ResponseMode) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.response_mode = mode;
            entry.last_active_at = Utc::now();
        }
        drop(sessions);
        self.flush();
        tracing::debug!(session_id, mode = %mode, "response mode updated");
    }

    /// Touch the activity timestamp.
    pub fn touch(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_active_at = Utc::now();
        }
    }

    /// Owner's sessions ordered by last activity, newest first.
    pub fn list(&self, owner_id: &str) -> Vec<SessionSummary> {
        let sessions = self.sessions.read();
        let mut rows: Vec<SessionSummary> = sessions
            .values()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| SessionSummary {
                session_id: e.session_id.clone(),
                title: e
                    .title
                    .clone()
                    .unwrap_or_else(|| "New Conversation".to_string()),
                last_active: e.last_active_at,
                preview: e
                    .messages
                    .last()
                    .map(|m| preview_of(&m.content))
                    .unwrap_or_else(|| "Empty chat".to_string()),
                mode: e.response_mode,
            })
            .collect();
        rows.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        rows
    }

    /// Hard-delete a session. Only the owner may delete.
    pub fn delete(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.authorize(session_id, user_id)?;
        self.sessions.write().remove(session_id);
        self.flush();
        tracing::info!(session_id, "session deleted");
        Ok(())
    }

    /// Persist the current state. Best-effort: a failed flush is logged,
    /// not surfaced, since in-memory state stays authoritative.
    fn flush(&self) {
        let sessions = self.sessions.read();
        match serde_json::to_string_pretty(&*sessions) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.sessions_path, json) {
                    tracing::warn!(error = %e, "session flush failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "session serialization failed"),
        }
    }

    #[cfg(test)]
    fn backdate(&self, session_id: &str, hours: i64) {
        let mut sessions = self.sessions.write();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_active_at = Utc::now() - chrono::Duration::hours(hours);
        }
    }
}

/// First seven words, with an ellipsis when truncated.
fn title_from(content: &str) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let mut title = words[..words.len().min(TITLE_WORDS)].join(" ");
    if words.len() > TITLE_WORDS {
        title.push_str("...");
    }
    title
}

/// 60-char preview of the last message.
fn preview_of(content: &str) -> String {
    if content.chars().count() <= 60 {
        content.to_string()
    } else {
        let cut: String = content.chars().take(60).collect();
        format!("{cut}...")
    }
}
