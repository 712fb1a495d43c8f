//! Runtime configuration, deserialized from `config.toml`.
//!
//! Every section has serde defaults so a missing file still yields a
//! runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Origins allowed by the CORS layer (credentials enabled).
    #[serde(default = "d_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors_origins: d_origins(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint base URL.
    #[serde(default = "d_llm_url")]
    pub base_url: String,
    /// Environment variable holding the API key. Empty = no auth header.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_120")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_url(),
            api_key_env: None,
            model: d_model(),
            request_timeout_secs: 120,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// External compound lookup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "d_lookup_url")]
    pub base_url: String,
    /// Per-request timeout; the protocol mandates a strict 2 s.
    #[serde(default = "d_2000")]
    pub timeout_ms: u64,
    /// Outbound request rate cap (requests per second).
    #[serde(default = "d_5")]
    pub rate_per_sec: u32,
    #[serde(default = "d_3")]
    pub max_retries: u32,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: d_lookup_url(),
            timeout_ms: 2000,
            rate_per_sec: 5,
            max_retries: 3,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory where session/preference state is persisted.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Idle hours after which a session soft-decays (history cleared,
    /// session id persists).
    #[serde(default = "d_12")]
    pub decay_hours: u32,
    /// Messages of history injected into generation.
    #[serde(default = "d_15")]
    pub history_limit: usize,
    /// Days before preference confidence decays.
    #[serde(default = "d_90")]
    pub preference_decay_days: u32,
    /// Confidence subtracted once the decay threshold passes.
    #[serde(default = "d_decay_amount")]
    pub preference_decay_amount: f64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            decay_hours: 12,
            history_limit: 15,
            preference_decay_days: 90,
            preference_decay_amount: 0.2,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    /// Research-only agents added on top of the OPTIMIZE set when the
    /// RESEARCH profile is selected.
    #[serde(default)]
    pub research_agents: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resource monitor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "d_ram_pct")]
    pub max_ram_percent: f64,
    #[serde(default = "d_vram_pct")]
    pub max_vram_percent: f64,
    /// Stricter VRAM ceiling applied to tasks that require the GPU.
    #[serde(default = "d_gpu_task_pct")]
    pub gpu_task_vram_percent: f64,
    #[serde(default = "d_swap_moderate")]
    pub swap_moderate_mb: u64,
    #[serde(default = "d_swap_critical")]
    pub swap_critical_mb: u64,
    /// Per-request VRAM growth that counts toward the leak streak.
    #[serde(default = "d_leak_mb")]
    pub leak_threshold_mb: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_ram_percent: 85.0,
            max_vram_percent: 92.0,
            gpu_task_vram_percent: 85.0,
            swap_moderate_mb: 1500,
            swap_critical_mb: 2500,
            leak_threshold_mb: 100.0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "d_index_root")]
    pub index_root: PathBuf,
    /// Concurrent embedding computations allowed process-wide.
    #[serde(default = "d_2")]
    pub embed_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_root: d_index_root(),
            embed_concurrency: 2,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Config {
    /// Validate cross-field constraints. Errors should abort startup;
    /// warnings are logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.lookup.rate_per_sec == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "lookup.rate_per_sec must be at least 1".into(),
            });
        }
        if self.monitor.swap_moderate_mb >= self.monitor.swap_critical_mb {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: format!(
                    "monitor.swap_moderate_mb ({}) must be below swap_critical_mb ({})",
                    self.monitor.swap_moderate_mb, self.monitor.swap_critical_mb
                ),
            });
        }
        if self.retrieval.embed_concurrency == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "retrieval.embed_concurrency must be at least 1".into(),
            });
        }
        if self.sessions.history_limit == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "sessions.history_limit is 0 — generation will see no history".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.sessions.preference_decay_amount) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "sessions.preference_decay_amount must be within [0, 1]".into(),
            });
        }

        issues
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    8000
}
fn d_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://127.0.0.1:5173".into(),
    ]
}
fn d_llm_url() -> String {
    "http://127.0.0.1:11434/v1".into()
}
fn d_model() -> String {
    "qwen3".into()
}
fn d_lookup_url() -> String {
    "https://pubchem.ncbi.nlm.nih.gov/rest/pug".into()
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_index_root() -> PathBuf {
    PathBuf::from("./vector_store")
}
fn d_2() -> usize {
    2
}
fn d_3() -> u32 {
    3
}
fn d_5() -> u32 {
    5
}
fn d_12() -> u32 {
    12
}
fn d_15() -> usize {
    15
}
fn d_90() -> u32 {
    90
}
fn d_120() -> u64 {
    120
}
fn d_2000() -> u64 {
    2000
}
fn d_decay_amount() -> f64 {
    0.2
}
fn d_ram_pct() -> f64 {
    85.0
}
fn d_vram_pct() -> f64 {
    92.0
}
fn d_gpu_task_pct() -> f64 {
    85.0
}
fn d_swap_moderate() -> u64 {
    1500
}
fn d_swap_critical() -> u64 {
    2500
}
fn d_leak_mb() -> f64 {
    100.0
}
