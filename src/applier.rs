//! Patch applier - applies an ordered rule list to one file
//!
//! This module provides the single-file contract:
//! - Reads the full text through a [`TextStorage`]
//! - Applies every rule left-to-right over one buffer
//! - Writes back only when the buffer actually changed
//! - Optionally keeps the pre-patch text next to the target

use crate::config::schema::RuleCompileError;
use crate::rule::{apply_rules, PatchRule};
use crate::safety::SafetyError;
use crate::storage::TextStorage;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Options for a single apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Compute the result but never write
    pub dry_run: bool,
    /// Write the original text to `<path><suffix>` before overwriting.
    /// An existing backup is kept, so it always holds the oldest content.
    pub backup_suffix: Option<String>,
}

impl ApplyOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            backup_suffix: None,
        }
    }
}

/// Result of applying a rule set to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "FileOutcome should be checked for changed/unchanged"]
pub enum FileOutcome {
    /// At least one rule altered the text
    Changed {
        file: PathBuf,
        /// Per-rule match counts, in rule order
        hits: Vec<usize>,
        original: String,
        patched: String,
        /// False on dry runs
        persisted: bool,
        /// Where the pre-patch text was saved, if requested
        backup: Option<PathBuf>,
    },
    /// The final buffer equals the original; nothing was written
    Unchanged { file: PathBuf, hits: Vec<usize> },
}

impl FileOutcome {
    pub fn file(&self) -> &Path {
        match self {
            FileOutcome::Changed { file, .. } | FileOutcome::Unchanged { file, .. } => file,
        }
    }

    pub fn hits(&self) -> &[usize] {
        match self {
            FileOutcome::Changed { hits, .. } | FileOutcome::Unchanged { hits, .. } => hits,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, FileOutcome::Changed { .. })
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Changed {
                file,
                persisted: true,
                ..
            } => write!(f, "Patched {}", file.display()),
            FileOutcome::Changed { file, .. } => write!(f, "Would patch {}", file.display()),
            FileOutcome::Unchanged { file, .. } => {
                write!(f, "No changes needed in {}", file.display())
            }
        }
    }
}

/// Errors while patching a single file.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to patch: {0}")]
    Unsafe(#[from] SafetyError),

    #[error("Invalid rule in {0}")]
    InvalidRule(#[from] RuleCompileError),
}

/// Apply `rules` to the file at `path`.
///
/// Rules compose left-to-right over one buffer. The file is written if and
/// only if the final buffer differs from what was read, so re-running the same
/// rules over an already-patched file is a no-op.
pub fn apply<S: TextStorage + ?Sized>(
    storage: &mut S,
    path: &Path,
    rules: &[PatchRule],
    options: &ApplyOptions,
) -> Result<FileOutcome, PatchError> {
    if !storage.exists(path) {
        return Err(PatchError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let original = storage.read(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (patched, hits) = apply_rules(&original, rules);

    if patched == original {
        debug!(file = %path.display(), ?hits, "content already in target state");
        return Ok(FileOutcome::Unchanged {
            file: path.to_path_buf(),
            hits,
        });
    }

    if options.dry_run {
        debug!(file = %path.display(), ?hits, "dry run, skipping write");
        return Ok(FileOutcome::Changed {
            file: path.to_path_buf(),
            hits,
            original,
            patched,
            persisted: false,
            backup: None,
        });
    }

    let backup = match &options.backup_suffix {
        Some(suffix) => {
            let backup_path = backup_path(path, suffix);
            if storage.exists(&backup_path) {
                debug!(backup = %backup_path.display(), "keeping earlier backup");
            } else {
                storage
                    .write(&backup_path, &original)
                    .map_err(|source| PatchError::Io {
                        path: backup_path.clone(),
                        source,
                    })?;
                debug!(backup = %backup_path.display(), "saved pre-patch content");
            }
            Some(backup_path)
        }
        None => None,
    };

    storage
        .write(path, &patched)
        .map_err(|source| PatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    info!(file = %path.display(), ?hits, "patched");
    Ok(FileOutcome::Changed {
        file: path.to_path_buf(),
        hits,
        original,
        patched,
        persisted: true,
        backup,
    })
}

/// `<path><suffix>`, e.g. `App.tsx` + `.orig` -> `App.tsx.orig`.
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
