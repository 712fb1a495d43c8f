/// Shared error type used across all nutrid crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource budget exceeded: {0}")]
    ResourceExceeded(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("upstream {service}: {message}")]
    Upstream { service: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
