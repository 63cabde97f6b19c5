//! Crate-wide error types.
//!
//! Tool execution stays on the `Result<ToolResult, String>` boundary the
//! `Tool` trait defines — tool failures become text the model reads, not
//! typed errors the caller matches on. Everything above that boundary
//! (config, gateway, approval store, provider transport) uses a `thiserror`
//! enum so callers can match on failure kind.

use thiserror::Error;

/// Fatal startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("could not determine home directory")]
    NoHomeDir,
}

/// Errors surfaced by the agent loop / gateway runtime.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway is dormant; no active session")]
    Dormant,
    #[error("gateway is shut down")]
    ShutDown,
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("turn limit reached ({0} turns)")]
    TurnLimitReached(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from an LLM [`crate::ai::provider::LLMProvider`] call.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("rate limited (429), retries exhausted: {body}")]
    RateLimited { body: String },
    #[error("provider http error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider timeout")]
    Timeout,
}
