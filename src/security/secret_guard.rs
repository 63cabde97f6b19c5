//! Path and shell-command denylist for sensitive files.
//!
//! No autonomy levels, no rate limiting, no approval escalation here — those
//! concerns live in the agent loop's safe/dangerous tool split and the
//! [`crate::approval::ApprovalStore`]. This is a pure, stateless denylist.

use std::path::Path;

use regex::Regex;

const SECRET_WORDS: [&str; 4] = ["secret", "password", "credential", "token"];
const VIEWER_COMMANDS: [&str; 6] = ["cat", "type", "more", "less", "head", "tail"];

pub const DENIAL_MESSAGE: &str = "denied by SecretGuard: this operation targets a sensitive file";

/// Denylist check over resolved filesystem paths and shell commands.
///
/// `storage_dir` is the root under which `auth.json`, `audit.jsonl`, and
/// `memory.json` live; `.json` files anywhere under it are denied
/// outright, since every file there holds owner secrets or the full audit
/// history.
pub struct SecretGuard {
    storage_dir: std::path::PathBuf,
    redact_re: Regex,
}

impl SecretGuard {
    pub fn new(storage_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            redact_re: Regex::new(
                r"(?i)^([^=\n]*(?:secret|password|token|key|credential)[^=\n]*)=(.*)$",
            )
            .expect("static regex is valid"),
        }
    }

    /// Evaluate a resolved, absolute filesystem path.
    /// Returns `Some(reason)` if the path is denied.
    pub fn check_path(&self, path: &Path) -> Option<String> {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        let filename_lower = filename.to_lowercase();

        if filename_lower == ".env" || filename_lower.starts_with(".env.") {
            return Some(format!("{DENIAL_MESSAGE}: dotenv file '{filename}'"));
        }

        if path.starts_with(&self.storage_dir) && filename_lower.ends_with(".json") {
            return Some(format!(
                "{DENIAL_MESSAGE}: JSON file under the storage directory"
            ));
        }

        if SECRET_WORDS.iter().any(|w| filename_lower.contains(w)) {
            return Some(format!(
                "{DENIAL_MESSAGE}: filename suggests sensitive content"
            ));
        }

        None
    }

    /// Evaluate a shell command line, catching classic viewers targeting
    /// `.env`, `auth.json`, or the storage directory.
    pub fn check_command(&self, command: &str) -> Option<String> {
        let lower = command.to_lowercase();
        let storage_dir_lower = self.storage_dir.to_string_lossy().to_lowercase();

        let first_word = lower.split_whitespace().next().unwrap_or("");
        let base = first_word.rsplit('/').next().unwrap_or(first_word);
        if !VIEWER_COMMANDS.contains(&base) {
            return None;
        }

        let targets_env = lower.contains(".env");
        let targets_auth = lower.contains("auth.json");
        let targets_storage = !storage_dir_lower.is_empty() && lower.contains(&storage_dir_lower);

        if targets_env || targets_auth || targets_storage {
            return Some(format!(
                "{DENIAL_MESSAGE}: command reads a protected file or directory"
            ));
        }

        None
    }

    /// Redact `KEY=VALUE` lines whose key looks secret-like, used
    /// on shell tool **output**, not input.
    pub fn redact_output(&self, output: &str) -> String {
        output
            .lines()
            .map(|line| {
                if let Some(caps) = self.redact_re.captures(line) {
                    format!("{}=[REDACTED]", &caps[1])
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn guard() -> SecretGuard {
        SecretGuard::new(PathBuf::from("/home/owner/.safeclaw"))
    }

    #[test]
    fn denies_dotenv_file() {
        let g = guard();
        assert!(g.check_path(Path::new("/workspace/.env")).is_some());
        assert!(g.check_path(Path::new("/workspace/.env.production")).is_some());
    }

    #[test]
    fn denies_json_under_storage_dir() {
        let g = guard();
        assert!(g
            .check_path(Path::new("/home/owner/.safeclaw/memory.json"))
            .is_some());
    }

    #[test]
    fn allows_json_outside_storage_dir() {
        let g = guard();
        assert!(g.check_path(Path::new("/workspace/package.json")).is_none());
    }

    #[test]
    fn denies_filename_with_secret_words() {
        let g = guard();
        assert!(g.check_path(Path::new("/workspace/my_password.txt")).is_some());
        assert!(g.check_path(Path::new("/workspace/api_token.txt")).is_some());
        assert!(g
            .check_path(Path::new("/workspace/CREDENTIALS.yml"))
            .is_some());
    }

    #[test]
    fn allows_ordinary_file() {
        let g = guard();
        assert!(g.check_path(Path::new("/workspace/README.md")).is_none());
    }

    #[test]
    fn denies_cat_on_env_file() {
        let g = guard();
        assert!(g.check_command("cat .env").is_some());
        assert!(g.check_command("cat /workspace/.env").is_some());
    }

    #[test]
    fn denies_viewer_commands_on_auth_json() {
        let g = guard();
        for cmd in ["head auth.json", "tail -f auth.json", "less auth.json"] {
            assert!(g.check_command(cmd).is_some(), "{cmd}");
        }
    }

    #[test]
    fn denies_viewer_commands_on_storage_dir() {
        let g = guard();
        assert!(g
            .check_command("cat /home/owner/.safeclaw/audit.jsonl")
            .is_some());
    }

    #[test]
    fn allows_unrelated_commands() {
        let g = guard();
        assert!(g.check_command("ls -la").is_none());
        assert!(g.check_command("cat README.md").is_none());
    }

    #[test]
    fn redacts_secret_like_keys() {
        let g = guard();
        let output = "PATH=/usr/bin\nAPI_TOKEN=abc123\npassword=hunter2\nDB_HOST=localhost";
        let redacted = g.redact_output(output);
        assert!(redacted.contains("PATH=/usr/bin"));
        assert!(redacted.contains("API_TOKEN=[REDACTED]"));
        assert!(redacted.contains("password=[REDACTED]"));
        assert!(redacted.contains("DB_HOST=localhost"));
    }
}
