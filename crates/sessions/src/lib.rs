//! Session-scoped and user-scoped memory.
//!
//! Three stores, all JSON-file backed under the configured state path:
//! - [`store::SessionStore`] — owned sessions, message history, titles,
//!   response mode, idle decay
//! - [`preferences::PreferenceStore`] — user preferences with per-field
//!   confidence and decay
//! - [`context::ContextStore`] — ephemeral per-session cooking context

pub mod context;
pub mod preferences;
pub mod store;

pub use context::{ContextStore, SessionContext};
pub use preferences::{PreferenceStore, PreferenceUpdate, UserPreferences};
pub use store::{MessageEntry, SessionStore, SessionSummary};
