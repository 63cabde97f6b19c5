//! `apply_patch` builtin: apply a multi-file patch envelope.
//!
//! The wire format is not a unified diff — it's a custom envelope bounded by
//! `*** Begin Patch` / `*** End Patch` carrying `Add File`/`Delete
//! File`/`Update File` directives, so this module parses and applies the
//! envelope itself rather than handing `---`/`+++`/`@@` hunks to a diff
//! library. Execution runs on `spawn_blocking`, guards every path before
//! applying it, honors a `dry_run` flag, and folds per-file results into
//! one `ToolResult`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::SecretGuard;

use super::sandbox;
use super::traits::{Tool, ToolResult};

#[derive(Debug, PartialEq, Eq)]
enum Directive {
    Add { path: String, content: String },
    Delete { path: String },
    Update { path: String, move_to: Option<String>, hunks: Vec<Hunk> },
}

#[derive(Debug, PartialEq, Eq)]
struct Hunk {
    /// Contiguous removed lines to locate in the current file (may be empty
    /// for a pure addition, which is appended to file end).
    removals: Vec<String>,
    /// Lines to substitute in place of `removals`.
    additions: Vec<String>,
}

/// Parse a `*** Begin Patch` ... `*** End Patch` envelope into directives.
fn parse_envelope(input: &str) -> Result<Vec<Directive>, String> {
    let body = input
        .trim()
        .strip_prefix("*** Begin Patch")
        .ok_or("patch must start with '*** Begin Patch'")?
        .trim_end()
        .strip_suffix("*** End Patch")
        .ok_or("patch must end with '*** End Patch'")?;

    let lines: Vec<&str> = body.lines().collect();
    let mut directives = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }
        if let Some(path) = line.strip_prefix("*** Add File: ") {
            let mut content_lines = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].starts_with("*** ") {
                content_lines.push(lines[i].strip_prefix('+').unwrap_or(lines[i]));
                i += 1;
            }
            directives.push(Directive::Add {
                path: path.trim().to_string(),
                content: content_lines.join("\n"),
            });
        } else if let Some(path) = line.strip_prefix("*** Delete File: ") {
            directives.push(Directive::Delete { path: path.trim().to_string() });
            i += 1;
        } else if let Some(path) = line.strip_prefix("*** Update File: ") {
            let path = path.trim().to_string();
            i += 1;
            let mut move_to = None;
            if i < lines.len() {
                if let Some(dest) = lines[i].strip_prefix("*** Move to: ") {
                    move_to = Some(dest.trim().to_string());
                    i += 1;
                }
            }
            let mut hunks = Vec::new();
            let mut removals = Vec::new();
            let mut additions = Vec::new();
            while i < lines.len() && !lines[i].starts_with("*** ") {
                let hl = lines[i];
                if hl.starts_with("@@") {
                    if !removals.is_empty() || !additions.is_empty() {
                        hunks.push(Hunk { removals, additions });
                        removals = Vec::new();
                        additions = Vec::new();
                    }
                } else if let Some(rest) = hl.strip_prefix('-') {
                    removals.push(rest.to_string());
                } else if let Some(rest) = hl.strip_prefix('+') {
                    additions.push(rest.to_string());
                } else if let Some(rest) = hl.strip_prefix(' ') {
                    // Context line: flush any in-progress hunk first.
                    if !removals.is_empty() || !additions.is_empty() {
                        hunks.push(Hunk { removals, additions });
                        removals = Vec::new();
                        additions = Vec::new();
                    }
                    let _ = rest;
                }
                i += 1;
            }
            if !removals.is_empty() || !additions.is_empty() {
                hunks.push(Hunk { removals, additions });
            }
            directives.push(Directive::Update { path, move_to, hunks });
        } else {
            return Err(format!("unrecognized patch directive: '{line}'"));
        }
    }

    Ok(directives)
}

/// Apply a single hunk by locating its contiguous removal block and
/// substituting the addition block. Pure additions append to file end.
fn apply_hunk(content: &str, hunk: &Hunk) -> Result<String, String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    if hunk.removals.is_empty() {
        lines.extend(hunk.additions.iter().cloned());
        return Ok(lines.join("\n"));
    }

    let window = hunk.removals.len();
    let found = lines
        .windows(window)
        .position(|w| w == hunk.removals.as_slice());

    match found {
        Some(start) => {
            lines.splice(start..start + window, hunk.additions.iter().cloned());
            Ok(lines.join("\n"))
        }
        None => Err("hunk context not found in file".to_string()),
    }
}

pub struct ApplyPatchTool {
    workspace_root: PathBuf,
    secret_guard: Arc<SecretGuard>,
}

impl ApplyPatchTool {
    pub fn new(workspace_root: PathBuf, secret_guard: Arc<SecretGuard>) -> Self {
        Self { workspace_root, secret_guard }
    }

    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        let resolved = sandbox::resolve(&self.workspace_root, raw)?;
        if let Some(reason) = self.secret_guard.check_path(&resolved) {
            return Err(reason);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a multi-file patch bounded by '*** Begin Patch'/'*** End Patch', with \
         Add File / Delete File / Update File directives."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patch": { "type": "string", "description": "The patch envelope." },
                "dry_run": { "type": "boolean", "description": "Validate without writing (default: false)." }
            },
            "required": ["patch"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let patch_text = args
            .get("patch")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'patch'")?
            .to_string();
        let dry_run = args.get("dry_run").and_then(Value::as_bool).unwrap_or(false);

        let directives = parse_envelope(&patch_text)?;

        let mut resolved = Vec::new();
        for directive in &directives {
            match directive {
                Directive::Add { path, .. } => resolved.push(self.resolve(path)?),
                Directive::Delete { path } => resolved.push(self.resolve(path)?),
                Directive::Update { path, move_to, .. } => {
                    resolved.push(self.resolve(path)?);
                    if let Some(dest) = move_to {
                        resolved.push(self.resolve(dest)?);
                    }
                }
            }
        }

        let workspace_root = self.workspace_root.clone();
        let result = tokio::task::spawn_blocking(move || {
            apply_directives_blocking(&workspace_root, directives, dry_run)
        })
        .await
        .map_err(|e| format!("blocking task panicked: {e}"))?;

        Ok(result)
    }
}

fn apply_directives_blocking(
    workspace_root: &std::path::Path,
    directives: Vec<Directive>,
    dry_run: bool,
) -> ToolResult {
    let mut reports = Vec::new();
    let mut any_failed = false;

    for directive in directives {
        let report = match directive {
            Directive::Add { path, content } => {
                let target = workspace_root.join(&path);
                if dry_run {
                    format!("would add '{path}'")
                } else {
                    match target.parent().map(std::fs::create_dir_all) {
                        Some(Err(e)) => {
                            any_failed = true;
                            format!("failed to add '{path}': {e}")
                        }
                        _ => match std::fs::write(&target, &content) {
                            Ok(()) => format!("added '{path}'"),
                            Err(e) => {
                                any_failed = true;
                                format!("failed to add '{path}': {e}")
                            }
                        },
                    }
                }
            }
            Directive::Delete { path } => {
                let target = workspace_root.join(&path);
                if dry_run {
                    format!("would delete '{path}'")
                } else {
                    match std::fs::remove_file(&target) {
                        Ok(()) => format!("deleted '{path}'"),
                        Err(e) => {
                            any_failed = true;
                            format!("failed to delete '{path}': {e}")
                        }
                    }
                }
            }
            Directive::Update { path, move_to, hunks } => {
                let target = workspace_root.join(&path);
                match std::fs::read_to_string(&target) {
                    Ok(mut content) => {
                        let mut failed_hunks = 0;
                        for hunk in &hunks {
                            match apply_hunk(&content, hunk) {
                                Ok(updated) => content = updated,
                                Err(_) => failed_hunks += 1,
                            }
                        }
                        if failed_hunks > 0 {
                            any_failed = true;
                            format!("'{path}': {failed_hunks} hunk(s) failed to match")
                        } else if dry_run {
                            format!("would update '{path}'{}",
                                move_to.as_ref().map(|m| format!(" (move to '{m}')")).unwrap_or_default())
                        } else {
                            let dest = match &move_to {
                                Some(new_path) => workspace_root.join(new_path),
                                None => target.clone(),
                            };
                            match std::fs::write(&dest, &content) {
                                Ok(()) => {
                                    if move_to.is_some() && dest != target {
                                        let _ = std::fs::remove_file(&target);
                                    }
                                    format!("updated '{path}'")
                                }
                                Err(e) => {
                                    any_failed = true;
                                    format!("failed to update '{path}': {e}")
                                }
                            }
                        }
                    }
                    Err(e) => {
                        any_failed = true;
                        format!("failed to read '{path}': {e}")
                    }
                }
            }
        };
        reports.push(report);
    }

    let output = reports.join("\n");
    if any_failed {
        ToolResult::err(output)
    } else {
        ToolResult::ok(output)
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
    async fn add_file_creates_it() {
        let dir = TempDir::new().unwrap();
        let tool = ApplyPatchTool::new(dir.path().to_path_buf(), guard());
        let patch = "*** Begin Patch\n*** Add File: new.txt\n+hello\n+world\n*** End Patch";
        let r = tool.execute(json!({"patch": patch})).await.unwrap();
        assert!(r.success);
        assert_eq!(std::fs::read_to_string(dir.path().join("new.txt")).unwrap(), "hello\nworld");
    }

    #[tokio::test]
    async fn delete_file_removes_it() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("doomed.txt"), "x").unwrap();
        let tool = ApplyPatchTool::new(dir.path().to_path_buf(), guard());
        let patch = "*** Begin Patch\n*** Delete File: doomed.txt\n*** End Patch";
        let r = tool.execute(json!({"patch": patch})).await.unwrap();
        assert!(r.success);
        assert!(!dir.path().join("doomed.txt").exists());
    }

    #[tokio::test]
    async fn update_file_replaces_hunk() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("test.txt"), "hello world\nsecond line").unwrap();
        let tool = ApplyPatchTool::new(dir.path().to_path_buf(), guard());
        let patch = "*** Begin Patch\n*** Update File: test.txt\n@@\n-hello world\n+hello universe\n*** End Patch";
        let r = tool.execute(json!({"patch": patch})).await.unwrap();
        assert!(r.success);
        let content = std::fs::read_to_string(dir.path().join("test.txt")).unwrap();
        assert!(content.contains("hello universe"));
        assert!(content.contains("second line"));
    }

    #[tokio::test]
    async fn update_with_move_renames_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.txt"), "content").unwrap();
        let tool = ApplyPatchTool::new(dir.path().to_path_buf(), guard());
        let patch = "*** Begin Patch\n*** Update File: old.txt\n*** Move to: new.txt\n@@\n-content\n+content changed\n*** End Patch";
        let r = tool.execute(json!({"patch": patch})).await.unwrap();
        assert!(r.success);
        assert!(!dir.path().join("old.txt").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("new.txt")).unwrap(),
            "content changed"
        );
    }

    #[tokio::test]
    async fn dry_run_does_not_modify() {
        let dir = TempDir::new().unwrap();
        let tool = ApplyPatchTool::new(dir.path().to_path_buf(), guard());
        let patch = "*** Begin Patch\n*** Add File: new.txt\n+content\n*** End Patch";
        let r = tool.execute(json!({"patch": patch, "dry_run": true})).await.unwrap();
        assert!(r.success);
        assert!(!dir.path().join("new.txt").exists());
    }

    #[tokio::test]
    async fn unmatched_hunk_reports_failure_without_aborting_others() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "unrelated content").unwrap();
        let tool = ApplyPatchTool::new(dir.path().to_path_buf(), guard());
        let patch = "*** Begin Patch\n*** Update File: a.txt\n@@\n-nonexistent line\n+replacement\n*** Add File: b.txt\n+added\n*** End Patch";
        let r = tool.execute(json!({"patch": patch})).await.unwrap();
        assert!(!r.success);
        assert!(dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn missing_envelope_markers_error() {
        let dir = TempDir::new().unwrap();
        let tool = ApplyPatchTool::new(dir.path().to_path_buf(), guard());
        let r = tool.execute(json!({"patch": "not a patch"})).await;
        assert!(r.is_err());
    }
}
