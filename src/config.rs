//! Environment-variable configuration.
//!
//! Rather than a TOML file plus overrides, SafeClaw reads its configuration
//! once at startup from the process environment. `OWNER_ID`, `BOT_TOKEN`,
//! and `STORAGE_DIR`'s implied defaults are the only load-bearing values;
//! everything else is a tunable with a documented default (see DESIGN.md
//! Open Question 1).

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Identifying headers sent on every OpenRouter request (their `HTTP-Referer`
/// / `X-Title` convention for attributing usage to a client application).
pub const OPENROUTER_HTTP_REFERER: &str = "https://github.com/safeclaw";
pub const OPENROUTER_TITLE: &str = "SafeClaw";

/// Immutable configuration resolved once at process startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of the sole authorized sender.
    pub owner_id: String,
    /// Chat transport credential (e.g. Telegram bot token).
    pub bot_token: String,
    /// Idle window before auto-sleep.
    pub inactivity_timeout: Duration,
    /// Approval ticket lifetime.
    pub approval_timeout: Duration,
    /// Root directory for persisted state.
    pub storage_dir: PathBuf,
    /// Optional sandbox root for filesystem tool operations (defaults to
    /// `storage_dir` if unset).
    pub workspace_dir: PathBuf,

    // Tunables — see DESIGN.md Open Question 1 for the chosen defaults.
    pub max_history: usize,
    pub compaction_threshold_tokens: usize,
    pub compaction_batch: usize,
    pub max_loop_depth: u32,
    pub tool_result_ceiling: usize,
    pub process_sweep_interval: Duration,
    pub process_ttl: Duration,
    pub mcp_connect_timeout: Duration,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Fatal: `OWNER_ID` and `BOT_TOKEN` must be set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let owner_id =
            std::env::var("OWNER_ID").map_err(|_| ConfigError::MissingEnv("OWNER_ID"))?;
        let bot_token =
            std::env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingEnv("BOT_TOKEN"))?;

        let inactivity_minutes = env_u64("INACTIVITY_TIMEOUT_MINUTES", 30);
        let approval_minutes = env_u64("APPROVAL_TIMEOUT_MINUTES", 5);

        let storage_dir = match std::env::var("STORAGE_DIR") {
            Ok(v) => PathBuf::from(v),
            Err(_) => dirs::home_dir()
                .map(|h| h.join(".safeclaw"))
                .ok_or(ConfigError::NoHomeDir)?,
        };

        let workspace_dir = std::env::var("WORKSPACE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| storage_dir.clone());

        Ok(Self {
            owner_id,
            bot_token,
            inactivity_timeout: Duration::from_secs(inactivity_minutes * 60),
            approval_timeout: Duration::from_secs(approval_minutes * 60),
            storage_dir,
            workspace_dir,
            max_history: env_usize("MAX_HISTORY", 200),
            compaction_threshold_tokens: env_usize("COMPACTION_THRESHOLD", 6000),
            compaction_batch: env_usize("COMPACTION_BATCH", 20),
            max_loop_depth: env_u64("MAX_LOOP_DEPTH", 8) as u32,
            tool_result_ceiling: env_usize("TOOL_RESULT_CEILING", 4000),
            process_sweep_interval: Duration::from_secs(env_u64("PROCESS_SWEEP_INTERVAL_SECS", 60)),
            process_ttl: Duration::from_secs(env_u64("PROCESS_TTL_SECS", 600)),
            mcp_connect_timeout: Duration::from_secs(env_u64("MCP_CONNECT_TIMEOUT_SECS", 10)),
        })
    }

    pub fn auth_path(&self) -> PathBuf {
        self.storage_dir.join("auth.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.storage_dir.join("audit.jsonl")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.storage_dir.join("memory.json")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.storage_dir.join("skills")
    }

    pub fn soul_path(&self) -> PathBuf {
        self.storage_dir.join("soul.md")
    }

    pub fn prompt_skills_dir(&self) -> PathBuf {
        self.storage_dir.join("prompt-skills")
    }

    pub fn mcp_servers_path(&self) -> PathBuf {
        self.storage_dir.join("mcp_servers.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.storage_dir.join("logs")
    }
}
