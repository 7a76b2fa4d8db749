//! Quarantine, apply and rollback.
//!
//! `stage_changes` copies sources into `staging/<id>/` and writes a manifest.
//! `apply_manifest` moves those copies into place, parking displaced files under
//! `logs/<id>/`. `rollback_manifest` reads that log and puts everything back.

pub mod apply;
pub mod manifest;
pub mod preview;
pub mod rollback;
pub mod stage;
pub mod verify;

pub use apply::{apply_manifest, load_apply_log, read_apply_log, ApplyLog, ApplyLogEntry};
pub use manifest::{
    list_manifests, load_manifest, load_manifest_file, ApplyState, ManifestSummary, StageEntry,
    StageManifest, MANIFEST_FILENAME,
};
pub use preview::preview_diff;
pub use rollback::{rollback_manifest, RollbackFailure, RollbackReport};
pub use stage::{generate_manifest_id, stage_changes};
pub use verify::{verify_manifest, EntryCheck, VerifiedEntry};
