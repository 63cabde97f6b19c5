//! Dynamic-skill install pipeline: propose → approve → persist →
//! load → register.
//!
//! These dynamic skills are proposed by the model itself at runtime and
//! installed on owner approval with no code review: the installed code is
//! persisted as an executable shell script under the skills directory and
//! run through a shell on each call, passing the tool's JSON arguments as
//! `$1` and reading stdout as the result — the same host-privilege
//! execution model `exec_shell` already uses, with no sandboxing.
//! Validation before persistence is shallow: the persisted script must be
//! non-empty and start with a `#!` shebang line, or installation is
//! rejected.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::agent::naming::{sanitize_skill_name, skill_tool_name};

/// Persisted record for one installed dynamic skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicSkill {
    pub name: String,
    pub description: String,
    pub dangerous: bool,
    pub parameters_schema: Value,
    pub code: String,
}

/// Error returned when a proposed skill fails validation before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillInstallError {
    EmptyName,
    EmptyCode,
    AlreadyInstalled,
    MissingShebang,
}

impl std::fmt::Display for SkillInstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "skill name is empty after sanitization"),
            Self::EmptyCode => write!(f, "implementation code is empty"),
            Self::AlreadyInstalled => write!(f, "a skill with that name is already installed"),
            Self::MissingShebang => write!(f, "implementation code must start with a shebang line"),
        }
    }
}

/// Loads, persists, and executes dynamic skills under `skills_dir`.
pub struct SkillsManager {
    skills_dir: PathBuf,
    skills: RwLock<HashMap<String, DynamicSkill>>,
}

impl SkillsManager {
    pub fn new(skills_dir: impl Into<PathBuf>) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            skills: RwLock::new(HashMap::new()),
        }
    }

    /// Sanitize a proposed name to `[a-z0-9_]`. Exposed
    /// so the request_capability handler can pre-check a name before
    /// building an approval.
    pub fn sanitize_name(raw: &str) -> String {
        sanitize_skill_name(raw)
    }

    pub fn is_installed(&self, sanitized_name: &str) -> bool {
        self.skills.read().unwrap().contains_key(sanitized_name)
    }

    /// Load every persisted skill from disk into memory (called at startup).
    pub async fn load_all(&self) -> std::io::Result<Vec<DynamicSkill>> {
        if !self.skills_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.skills_dir).await?;
        let mut loaded = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<DynamicSkill>(&content) {
                Ok(skill) => loaded.push(skill),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed skill file"),
            }
        }
        let mut guard = self.skills.write().unwrap();
        for skill in &loaded {
            guard.insert(skill.name.clone(), skill.clone());
        }
        Ok(loaded)
    }

    /// Persist, validate, and register a newly-approved skill.
    /// `raw_name` is sanitized here so callers can pass the
    /// owner-approved ticket's `skill_name` verbatim.
    pub async fn install(
        &self,
        raw_name: &str,
        description: impl Into<String>,
        dangerous: bool,
        parameters_schema: Value,
        code: impl Into<String>,
    ) -> Result<DynamicSkill, SkillInstallError> {
        let name = sanitize_skill_name(raw_name);
        let code = code.into();

        if name.is_empty() {
            return Err(SkillInstallError::EmptyName);
        }
        if code.trim().is_empty() {
            return Err(SkillInstallError::EmptyCode);
        }
        if self.is_installed(&name) {
            return Err(SkillInstallError::AlreadyInstalled);
        }
        if !code.trim_start().starts_with("#!") {
            return Err(SkillInstallError::MissingShebang);
        }

        let skill = DynamicSkill {
            name: name.clone(),
            description: description.into(),
            dangerous,
            parameters_schema,
            code,
        };

        self.persist(&skill).await.map_err(|_| SkillInstallError::EmptyCode)?;
        self.skills.write().unwrap().insert(name, skill.clone());
        Ok(skill)
    }

    async fn persist(&self, skill: &DynamicSkill) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.skills_dir).await?;
        let path = self.skills_dir.join(format!("{}.json", skill.name));
        let serialized = serde_json::to_string_pretty(skill)?;
        tokio::fs::write(path, serialized).await?;
        let script_path = self.skills_dir.join(format!("{}.sh", skill.name));
        tokio::fs::write(&script_path, &skill.code).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&script_path).await?.permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(&script_path, perms).await?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<DynamicSkill> {
        self.skills.read().unwrap().get(name).cloned()
    }

    pub fn list(&self) -> Vec<DynamicSkill> {
        self.skills.read().unwrap().values().cloned().collect()
    }

    /// Run the installed skill's script, passing `arguments` as a single
    /// JSON-encoded positional argument and capturing stdout as the result.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<String, String> {
        let script_path = self.skills_dir.join(format!("{name}.sh"));
        if !script_path.exists() {
            return Err(format!("dynamic skill '{name}' has no persisted script"));
        }
        let mut child = tokio::process::Command::new("sh")
            .arg(&script_path)
            .arg(arguments.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start skill '{name}': {e}"))?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("failed to run skill '{name}': {e}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("skill '{name}' exited with {}: {stderr}", output.status))
        }
    }
}

/// Full LLM-visible tool name for an installed dynamic skill.
pub fn tool_name_for(skill_name: &str) -> String {
    skill_tool_name(skill_name)
}
