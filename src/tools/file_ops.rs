//! Filesystem builtins: `read_file`, `write_file`, `list_dir`,
//! `delete_file`, `move_file`.
//!
//! Every path argument passes through [`crate::tools::sandbox::resolve`]
//! (workspace-root confinement) followed by
//! [`crate::security::SecretGuard::check_path`] before the
//! operation runs.

use std::{fs, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::SecretGuard;

use super::sandbox;
use super::traits::{Tool, ToolResult};

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required argument '{key}'"))
}

/// Resolve and guard a path argument: sandbox-confine it, then check it
/// against the SecretGuard denylist — the resolved path, not the
/// caller-supplied one, is what gets checked.
fn guard_path(
    workspace_root: &std::path::Path,
    secret_guard: &SecretGuard,
    raw: &str,
) -> Result<PathBuf, String> {
    let resolved = sandbox::resolve(workspace_root, raw)?;
    if let Some(reason) = secret_guard.check_path(&resolved) {
        return Err(reason);
    }
    Ok(resolved)
}

// ─── read_file ──────────────────────────────────────────────────────────────

pub struct ReadFileTool {
    workspace_root: PathBuf,
    secret_guard: Arc<SecretGuard>,
}

impl ReadFileTool {
    pub fn new(workspace_root: PathBuf, secret_guard: Arc<SecretGuard>) -> Self {
        Self { workspace_root, secret_guard }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use max_lines to limit output for large files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file, relative to the workspace root." },
                "max_lines": { "type": "integer", "description": "Maximum number of lines to return.", "minimum": 1 }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let raw = required_str(&args, "path")?;
        let path = guard_path(&self.workspace_root, &self.secret_guard, raw)?;

        let max_lines = args.get("max_lines").and_then(Value::as_u64).map(|n| n as usize);
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

        let output = match max_lines {
            Some(n) => contents.lines().take(n).collect::<Vec<_>>().join("\n"),
            None => contents,
        };

        Ok(ToolResult::ok(output).with_metadata(json!({ "path": path.display().to_string() })))
    }
}

// ─── write_file ─────────────────────────────────────────────────────────────

pub struct WriteFileTool {
    workspace_root: PathBuf,
    secret_guard: Arc<SecretGuard>,
}

impl WriteFileTool {
    pub fn new(workspace_root: PathBuf, secret_guard: Arc<SecretGuard>) -> Self {
        Self { workspace_root, secret_guard }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if it does not exist and overwriting it if it does."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to write, relative to the workspace root." },
                "content": { "type": "string", "description": "Content to write." }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let raw = required_str(&args, "path")?;
        let content = required_str(&args, "content")?.to_string();

        // Resolution differs from read: the file may not exist yet, so the
        // sandbox check runs against the parent directory's canonical form.
        let path = guard_path(&self.workspace_root, &self.secret_guard, raw)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("failed to create parent dirs: {e}"))?;
        }

        let bytes = content.len();
        fs::write(&path, &content).map_err(|e| format!("failed to write '{}': {e}", path.display()))?;

        Ok(ToolResult::ok(format!("wrote {bytes} bytes to '{}'", path.display()))
            .with_metadata(json!({ "path": path.display().to_string(), "bytes": bytes })))
    }
}

// ─── list_dir ───────────────────────────────────────────────────────────────

pub struct ListDirTool {
    workspace_root: PathBuf,
    secret_guard: Arc<SecretGuard>,
}

impl ListDirTool {
    pub fn new(workspace_root: PathBuf, secret_guard: Arc<SecretGuard>) -> Self {
        Self { workspace_root, secret_guard }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory, optionally recursively."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the directory, relative to the workspace root." },
                "recursive": { "type": "boolean", "description": "List recursively (default: false)." }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let raw = required_str(&args, "path")?;
        let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(false);
        let path = guard_path(&self.workspace_root, &self.secret_guard, raw)?;

        let entries = collect_entries(&path, recursive)
            .map_err(|e| format!("failed to list '{}': {e}", path.display()))?;

        Ok(ToolResult::ok(entries.join("\n")).with_metadata(json!({ "count": entries.len() })))
    }
}

fn collect_entries(dir: &std::path::Path, recursive: bool) -> std::io::Result<Vec<String>> {
    let mut result = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        result.push(path.display().to_string());
        if recursive && path.is_dir() {
            result.extend(collect_entries(&path, true)?);
        }
    }
    result.sort();
    Ok(result)
}

// ─── delete_file ────────────────────────────────────────────────────────────

pub struct DeleteFileTool {
    workspace_root: PathBuf,
    secret_guard: Arc<SecretGuard>,
}

impl DeleteFileTool {
    pub fn new(workspace_root: PathBuf, secret_guard: Arc<SecretGuard>) -> Self {
        Self { workspace_root, secret_guard }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to delete, relative to the workspace root." }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let raw = required_str(&args, "path")?;
        let path = guard_path(&self.workspace_root, &self.secret_guard, raw)?;

        fs::remove_file(&path).map_err(|e| format!("failed to delete '{}': {e}", path.display()))?;

        Ok(ToolResult::ok(format!("deleted '{}'", path.display())))
    }
}

// ─── move_file ──────────────────────────────────────────────────────────────

pub struct MoveFileTool {
    workspace_root: PathBuf,
    secret_guard: Arc<SecretGuard>,
}

impl MoveFileTool {
    pub fn new(workspace_root: PathBuf, secret_guard: Arc<SecretGuard>) -> Self {
        Self { workspace_root, secret_guard }
    }
}

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": { "type": "string", "description": "Source path, relative to the workspace root." },
                "to": { "type": "string", "description": "Destination path, relative to the workspace root." }
            },
            "required": ["from", "to"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let from_raw = required_str(&args, "from")?;
        let to_raw = required_str(&args, "to")?;
        let from = guard_path(&self.workspace_root, &self.secret_guard, from_raw)?;
        let to = guard_path(&self.workspace_root, &self.secret_guard, to_raw)?;

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("failed to create parent dirs: {e}"))?;
        }
        fs::rename(&from, &to)
            .map_err(|e| format!("failed to move '{}' to '{}': {e}", from.display(), to.display()))?;

        Ok(ToolResult::ok(format!("moved '{}' to '{}'", from.display(), to.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard() -> Arc<SecretGuard> {
        Arc::new(SecretGuard::new("/nonexistent_storage_dir_for_tests"))
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hello.txt"), "hello world").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf(), guard());
        let r = tool.execute(json!({"path": "hello.txt"})).await.unwrap();
        assert!(r.success);
        assert_eq!(r.output.trim(), "hello world");
    }

    #[tokio::test]
    async fn read_respects_max_lines() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lines.txt"), "a\nb\nc\nd\ne").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf(), guard());
        let r = tool
            .execute(json!({"path": "lines.txt", "max_lines": 3}))
            .await
            .unwrap();
        assert_eq!(r.output.lines().count(), 3);
    }

    #[tokio::test]
    async fn read_denies_dotenv() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf(), guard());
        let r = tool.execute(json!({"path": ".env"})).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn read_rejects_traversal_outside_workspace() {
        let dir = TempDir::new().unwrap();
        let tool = ReadFileTool::new(dir.path().to_path_buf(), guard());
        let r = tool.execute(json!({"path": "../../etc/passwd"})).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn write_creates_file() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf(), guard());
        let r = tool
            .execute(json!({"path": "out.txt", "content": "written"}))
            .await
            .unwrap();
        assert!(r.success);
        assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "written");
    }

    #[tokio::test]
    async fn list_dir_lists_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();

        let tool = ListDirTool::new(dir.path().to_path_buf(), guard());
        let r = tool.execute(json!({"path": "."})).await.unwrap();
        assert!(r.output.contains("a.txt"));
        assert!(r.output.contains("b.txt"));
    }

    #[tokio::test]
    async fn delete_file_removes_it() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("doomed.txt"), "").unwrap();

        let tool = DeleteFileTool::new(dir.path().to_path_buf(), guard());
        tool.execute(json!({"path": "doomed.txt"})).await.unwrap();
        assert!(!dir.path().join("doomed.txt").exists());
    }

    #[tokio::test]
    async fn move_file_renames_it() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("src.txt"), "content").unwrap();

        let tool = MoveFileTool::new(dir.path().to_path_buf(), guard());
        tool.execute(json!({"from": "src.txt", "to": "dst.txt"}))
            .await
            .unwrap();
        assert!(!dir.path().join("src.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("dst.txt")).unwrap(), "content");
    }
}
