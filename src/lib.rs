//! textpatch: declarative find-and-replace patching for source trees
//!
//! Applies ordered literal and regex rules to text files, built for fixing
//! `react-hooks/exhaustive-deps` warnings across a front-end codebase
//! (adding a missing `useCallback` import, rewriting `useEffect` dependency
//! arrays).
//!
//! # Architecture
//!
//! Every patch compiles down to one operation: [`applier::apply`], which reads
//! a file through a [`TextStorage`], runs a list of [`PatchRule`]s over a
//! single buffer, and writes back only if the buffer changed. Manifests
//! ([`config`]) are just lists of `(file, rules)` fed to that operation.
//!
//! # Safety
//!
//! - Files are written only when content actually changes (idempotent re-runs)
//! - Atomic file writes (tempfile + fsync + rename)
//! - Workspace boundary enforcement for manifest targets
//! - Dry-run mode and optional pre-patch backups with restore
//!
//! # Example
//!
//! ```no_run
//! use textpatch::{apply, ApplyOptions, FsStorage, PatchRule};
//! use std::path::Path;
//!
//! let rules = vec![
//!     PatchRule::literal("import { useEffect", "import { useEffect, useCallback")
//!         .unless_contains("useCallback"),
//! ];
//!
//! match apply(&mut FsStorage, Path::new("src/App.tsx"), &rules, &ApplyOptions::default()) {
//!     Ok(outcome) => println!("{outcome}"),
//!     Err(e) => eprintln!("Patch failed: {e}"),
//! }
//! ```

pub mod applier;
pub mod config;
pub mod diff;
pub mod rule;
pub mod safety;
pub mod storage;

// Re-exports
pub use applier::{apply, ApplyOptions, FileOutcome, PatchError};
pub use config::{
    apply_manifest, apply_manifests, check_manifest, load_from_path, load_from_str,
    restore_manifest, BatchOptions, BatchReport, BatchSummary, ConfigError, PatchManifest,
};
pub use rule::{apply_rules, Guard, Matcher, PatchRule, Scope};
pub use safety::{SafetyError, WorkspaceGuard};
pub use storage::{FsStorage, MemoryStorage, OverlayStorage, TextStorage};
