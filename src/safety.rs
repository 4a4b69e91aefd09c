//! Workspace guard - keeps patch targets inside the workspace root

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directory names that are never patch targets.
const FORBIDDEN_DIRS: &[&str] = &["node_modules", ".git"];

/// Workspace safety checks to prevent editing files outside the target workspace.
///
/// Checks are lexical so they work the same against any storage backend.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Normalized workspace root
    workspace_root: PathBuf,
    /// Directory names rejected anywhere below the root
    forbidden_dirs: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: String },
}

impl WorkspaceGuard {
    /// Create a new workspace guard with the given root.
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: normalize(workspace_root.as_ref()),
            forbidden_dirs: FORBIDDEN_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Create a guard with custom forbidden directory names.
    pub fn with_forbidden(workspace_root: impl AsRef<Path>, forbidden: Vec<String>) -> Self {
        Self {
            workspace_root: normalize(workspace_root.as_ref()),
            forbidden_dirs: forbidden,
        }
    }

    /// Resolve `path` against the workspace and check it is safe to edit.
    ///
    /// Returns the normalized absolute-or-root-relative path.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };
        let resolved = normalize(&joined);

        if !resolved.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: resolved,
                workspace: self.workspace_root.clone(),
            });
        }

        let relative = resolved
            .strip_prefix(&self.workspace_root)
            .unwrap_or(&resolved);
        for component in relative.components() {
            if let Component::Normal(name) = component {
                if let Some(forbidden) = self
                    .forbidden_dirs
                    .iter()
                    .find(|dir| name.to_str() == Some(dir.as_str()))
                {
                    return Err(SafetyError::ForbiddenPath {
                        path: resolved.clone(),
                        forbidden: forbidden.clone(),
                    });
                }
            }
        }

        Ok(resolved)
    }

    /// Get the workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
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
