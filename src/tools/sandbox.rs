//! Path sandbox resolution.
//!
//! Built around a single workspace root rather than a blocked-dirs list:
//! every tool-supplied path is resolved relative to `workspace_root`, `~`
//! expands to the process home, and anything that escapes the root (via
//! `..` or a symlink) is rejected before the caller ever touches the
//! filesystem.

use std::path::{Path, PathBuf};

/// Resolve a user-supplied path against `workspace_root`.
///
/// Relative paths are joined onto the root; absolute paths are still
/// confined to the root (an absolute path outside it is rejected, it is
/// never reinterpreted relative to the root). `~` and `~/...` expand to the
/// process home directory, then must still resolve inside the root to be
/// allowed — this matches how `workspace_root` is typically set to (or
/// under) the home directory in practice, while keeping confinement the
/// single source of truth.
pub fn resolve(workspace_root: &Path, input: &str) -> Result<PathBuf, String> {
    let expanded = expand_tilde(input)?;

    let candidate = if expanded.is_absolute() {
        expanded
    } else {
        workspace_root.join(expanded)
    };

    let root_canonical = canonicalize_best_effort(workspace_root);

    // Reject lexical traversal before touching the filesystem: a `..`
    // component could still land inside the root numerically but we treat
    // its mere presence as untrusted input.
    if candidate
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err("path traversal ('..') is not allowed".into());
    }

    let resolved = canonicalize_best_effort(&candidate);

    if !resolved.starts_with(&root_canonical) {
        return Err(format!(
            "path '{}' escapes the workspace root '{}'",
            candidate.display(),
            workspace_root.display()
        ));
    }

    Ok(resolved)
}

fn expand_tilde(input: &str) -> Result<PathBuf, String> {
    if input == "~" {
        return dirs::home_dir().ok_or_else(|| "no home directory available".to_string());
    }
    if let Some(rest) = input.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| "no home directory available".to_string())?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(input))
}

/// Canonicalize when possible (resolving symlinks); fall back to the raw
/// path for files that don't exist yet (e.g. a `write_file` target), since
/// `canonicalize` fails on missing paths.
fn canonicalize_best_effort(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        path.parent()
            .and_then(|p| p.canonicalize().ok())
            .map(|parent| match path.file_name() {
                Some(name) => parent.join(name),
                None => parent,
            })
            .unwrap_or_else(|| path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_relative_path_inside_root() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve(dir.path(), "file.txt").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let dir = TempDir::new().unwrap();
        let result = resolve(dir.path(), "../../etc/passwd");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_absolute_path_outside_root() {
        let dir = TempDir::new().unwrap();
        let result = resolve(dir.path(), "/etc/passwd");
        assert!(result.is_err());
    }

    #[test]
    fn allows_absolute_path_inside_root() {
        let dir = TempDir::new().unwrap();
        let inside = dir.path().join("nested.txt");
        let resolved = resolve(dir.path(), inside.to_str().unwrap()).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn rejects_symlink_escape() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let link = dir.path().join("escape");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), &link).unwrap();
            let result = resolve(dir.path(), "escape/file.txt");
            assert!(result.is_err());
        }
    }
}
