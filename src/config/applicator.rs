//! Manifest applicator - runs every target of a manifest in order
//!
//! This module provides batch application that:
//! - Resolves each target against the workspace (guarded)
//! - Applies the target's rules through the single-file applier
//! - Contains failures per file so one bad target never blocks the rest
//! - Reports per-file results and a summary tally

use crate::applier::{apply, backup_path, ApplyOptions, FileOutcome, PatchError};
use crate::config::schema::{PatchManifest, TargetDefinition};
use crate::safety::WorkspaceGuard;
use crate::storage::{OverlayStorage, TextStorage};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Batch-level options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub dry_run: bool,
    /// Keep pre-patch copies using the manifest's `backup_suffix`
    pub backup: bool,
}

/// Outcome for one manifest target.
#[derive(Debug)]
pub struct BatchEntry {
    /// Target as written in the manifest
    pub target: String,
    /// Resolved path (absent when resolution itself failed)
    pub path: Option<PathBuf>,
    pub result: Result<FileOutcome, PatchError>,
}

impl BatchEntry {
    pub fn status(&self) -> EntryStatus {
        match &self.result {
            Ok(FileOutcome::Changed { .. }) => EntryStatus::Changed,
            Ok(FileOutcome::Unchanged { .. }) => EntryStatus::Unchanged,
            Err(PatchError::NotFound { .. }) => EntryStatus::NotFound,
            Err(_) => EntryStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    Changed,
    Unchanged,
    NotFound,
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Changed => write!(f, "changed"),
            EntryStatus::Unchanged => write!(f, "unchanged"),
            EntryStatus::NotFound => write!(f, "not-found"),
            EntryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Results for a whole manifest, in manifest order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub name: String,
    pub dry_run: bool,
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub missing: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn merge(&mut self, other: BatchSummary) {
        self.changed += other.changed;
        self.unchanged += other.unchanged;
        self.missing += other.missing;
        self.failed += other.failed;
    }

    pub fn has_problems(&self) -> bool {
        self.missing > 0 || self.failed > 0
    }
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for entry in &self.entries {
            match entry.status() {
                EntryStatus::Changed => summary.changed += 1,
                EntryStatus::Unchanged => summary.unchanged += 1,
                EntryStatus::NotFound => summary.missing += 1,
                EntryStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Mark a report produced over staged storage as a dry run.
    fn into_preview(mut self) -> Self {
        self.dry_run = true;
        for entry in &mut self.entries {
            if let Ok(FileOutcome::Changed { persisted, .. }) = &mut entry.result {
                *persisted = false;
            }
        }
        self
    }

    /// Serializable view of the report.
    pub fn to_json_report(&self) -> JsonReport {
        JsonReport {
            name: self.name.clone(),
            dry_run: self.dry_run,
            summary: self.summary(),
            entries: self.entries.iter().map(JsonEntry::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub name: String,
    pub dry_run: bool,
    pub summary: BatchSummary,
    pub entries: Vec<JsonEntry>,
}

#[derive(Debug, Serialize)]
pub struct JsonEntry {
    pub target: String,
    pub path: Option<PathBuf>,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hits: Vec<usize>,
    /// xxh3-64 of the content before patching, hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&BatchEntry> for JsonEntry {
    fn from(entry: &BatchEntry) -> Self {
        let mut json = JsonEntry {
            target: entry.target.clone(),
            path: entry.path.clone(),
            status: entry.status(),
            hits: Vec::new(),
            before_hash: None,
            after_hash: None,
            backup: None,
            error: None,
        };

        match &entry.result {
            Ok(FileOutcome::Changed {
                hits,
                original,
                patched,
                backup,
                ..
            }) => {
                json.hits = hits.clone();
                json.before_hash = Some(fingerprint(original));
                json.after_hash = Some(fingerprint(patched));
                json.backup = backup.clone();
            }
            Ok(FileOutcome::Unchanged { hits, .. }) => json.hits = hits.clone(),
            Err(e) => json.error = Some(e.to_string()),
        }

        json
    }
}

/// xxh3-64 content fingerprint as 16 hex digits.
pub fn fingerprint(text: &str) -> String {
    format!("{:016x}", xxh3_64(text.as_bytes()))
}

/// Resolve a manifest target to the path the storage should see.
pub fn resolve_target(
    manifest: &PatchManifest,
    guard: &WorkspaceGuard,
    target: &TargetDefinition,
) -> Result<PathBuf, PatchError> {
    if manifest.meta.workspace_relative {
        Ok(guard.resolve(&target.file)?)
    } else {
        Ok(PathBuf::from(&target.file))
    }
}

/// Apply a manifest to a workspace.
///
/// Targets are processed sequentially in manifest order. Each target's
/// failure is recorded in its entry and the run continues.
pub fn apply_manifest<S: TextStorage + ?Sized>(
    storage: &mut S,
    workspace_root: &Path,
    manifest: &PatchManifest,
    options: BatchOptions,
) -> BatchReport {
    let guard = WorkspaceGuard::new(workspace_root);
    let apply_options = ApplyOptions {
        dry_run: options.dry_run,
        backup_suffix: options
            .backup
            .then(|| manifest.meta.backup_suffix.clone()),
    };

    let mut entries = Vec::with_capacity(manifest.targets.len());

    for target in &manifest.targets {
        let path = match resolve_target(manifest, &guard, target) {
            Ok(path) => path,
            Err(e) => {
                warn!(file = %target.file, error = %e, "target rejected");
                entries.push(BatchEntry {
                    target: target.file.clone(),
                    path: None,
                    result: Err(e),
                });
                continue;
            }
        };

        let rules = match target.compile_rules() {
            Ok(rules) => rules,
            Err(e) => {
                warn!(file = %target.file, error = %e, "rule failed to compile");
                entries.push(BatchEntry {
                    target: target.file.clone(),
                    path: Some(path),
                    result: Err(PatchError::InvalidRule(e)),
                });
                continue;
            }
        };

        debug!(file = %target.file, rules = rules.len(), "applying target");
        let result = apply(storage, &path, &rules, &apply_options);
        if let Err(e) = &result {
            warn!(file = %target.file, error = %e, "target not patched");
        }

        entries.push(BatchEntry {
            target: target.file.clone(),
            path: Some(path),
            result,
        });
    }

    BatchReport {
        name: manifest.meta.name.clone(),
        dry_run: options.dry_run,
        entries,
    }
}

/// Apply several manifests in order, each seeing the previous one's output.
///
/// On a dry run the manifests run over an [`OverlayStorage`], so a file
/// targeted by two manifests is previewed exactly as the real run would
/// change it. Nothing reaches `storage` and no backups are taken.
pub fn apply_manifests<'m, S, I>(
    storage: &mut S,
    workspace_root: &Path,
    manifests: I,
    options: BatchOptions,
) -> Vec<BatchReport>
where
    S: TextStorage + ?Sized,
    I: IntoIterator<Item = &'m PatchManifest>,
{
    if !options.dry_run {
        return manifests
            .into_iter()
            .map(|manifest| apply_manifest(storage, workspace_root, manifest, options))
            .collect();
    }

    let mut overlay = OverlayStorage::new(&*storage);
    let staged = BatchOptions {
        dry_run: false,
        backup: false,
    };
    manifests
        .into_iter()
        .map(|manifest| apply_manifest(&mut overlay, workspace_root, manifest, staged).into_preview())
        .collect()
}

/// Check manifest status without mutating the workspace.
///
/// `Changed` entries mean "would change if applied".
pub fn check_manifest<S: TextStorage + ?Sized>(
    storage: &mut S,
    workspace_root: &Path,
    manifest: &PatchManifest,
) -> BatchReport {
    apply_manifest(
        storage,
        workspace_root,
        manifest,
        BatchOptions {
            dry_run: true,
            backup: false,
        },
    )
}

/// Result of restoring one target from its backup.
#[derive(Debug)]
pub enum RestoreResult {
    Restored { file: PathBuf, backup: PathBuf },
    NoBackup { file: PathBuf },
    Failed { target: String, error: PatchError },
}

/// Restore every target that has a backup next to it, then drop the backup.
pub fn restore_manifest<S: TextStorage + ?Sized>(
    storage: &mut S,
    workspace_root: &Path,
    manifest: &PatchManifest,
) -> Vec<RestoreResult> {
    let guard = WorkspaceGuard::new(workspace_root);

    manifest
        .targets
        .iter()
        .map(|target| {
            let file = match resolve_target(manifest, &guard, target) {
                Ok(path) => path,
                Err(error) => {
                    return RestoreResult::Failed {
                        target: target.file.clone(),
                        error,
                    }
                }
            };

            let backup = backup_path(&file, &manifest.meta.backup_suffix);
            if !storage.exists(&backup) {
                return RestoreResult::NoBackup { file };
            }

            match restore_one(storage, &file, &backup) {
                Ok(()) => RestoreResult::Restored { file, backup },
                Err(error) => RestoreResult::Failed {
                    target: target.file.clone(),
                    error,
                },
            }
        })
        .collect()
}

fn restore_one<S: TextStorage + ?Sized>(
    storage: &mut S,
    file: &Path,
    backup: &Path,
) -> Result<(), PatchError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| PatchError::Io { path, source }
    };

    let original = storage.read(backup).map_err(io_err(backup))?;
    storage.write(file, &original).map_err(io_err(file))?;
    storage.remove(backup).map_err(io_err(backup))?;
    debug!(file = %file.display(), "restored from backup");
    Ok(())
}
