//! Workspace path helpers
//!
//! Edits carry workspace-relative paths. The pipeline resolves them against
//! the working directory lexically (the file may not exist yet) and refuses
//! anything that climbs out of the workspace.

use std::path::{Component, Path, PathBuf};

/// Path resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Empty path
    #[error("empty path")]
    Empty,

    /// Path resolves outside the workspace
    #[error("path escapes workspace: {0}")]
    EscapesWorkspace(String),
}

/// Lexically normalize a path, folding `.` and `..` components
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` against `workdir`
///
/// Absolute paths are accepted when they stay under `workdir`.
///
/// # Errors
/// - `PathError::Empty` for an empty path
/// - `PathError::EscapesWorkspace` when the result is outside `workdir`
pub fn resolve_path(workdir: &Path, path: impl AsRef<Path>) -> Result<PathBuf, PathError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }

    let root = normalize(workdir);
    let joined = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    };

    if !joined.starts_with(&root) {
        return Err(PathError::EscapesWorkspace(path.display().to_string()));
    }
    Ok(joined)
}

/// Workspace-relative form of `path`, using `/` separators
///
/// Paths outside `workdir` are returned unchanged.
#[must_use]
pub fn relative_path(workdir: &Path, path: &Path) -> String {
    let root = normalize(workdir);
    let normalized = normalize(path);
    let rel = normalized.strip_prefix(&root).unwrap_or(&normalized);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Base name without extension (`tools/analyze.go` -> `analyze`)
#[must_use]
pub fn file_stem(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Heuristic test-file detection across the supported languages
#[must_use]
pub fn is_test_file(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if name.ends_with("_test.go")
        || name.ends_with("_test.py")
        || name.ends_with("_test.rs")
        || (name.starts_with("test_") && name.ends_with(".py"))
        || name.contains(".test.")
        || name.contains(".spec.")
        || (name.ends_with("test.java") && name.len() > "test.java".len())
    {
        return true;
    }

    path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("tests" | "__tests__" | "testdata")
        )
    })
}
