pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_manifest, apply_manifests, check_manifest, fingerprint, restore_manifest, BatchEntry,
    BatchOptions, BatchReport, BatchSummary, EntryStatus, JsonReport, RestoreResult,
};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    Metadata, PatchManifest, RuleCompileError, RuleDefinition, RuleKind, TargetDefinition,
    ValidationError, ValidationIssue,
};
