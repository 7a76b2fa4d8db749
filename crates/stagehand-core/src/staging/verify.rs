use serde::Serialize;
use std::path::PathBuf;

use super::manifest::StageManifest;
use crate::error::{IoContext, Result};
use crate::hasher;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryCheck {
    Ok,
    /// The quarantined copy is gone, typically because the manifest was applied.
    Missing,
    Mismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedEntry {
    pub index: usize,
    pub staged_path: PathBuf,
    pub check: EntryCheck,
}

/// Re-hash each quarantined copy and compare with the recorded checksum.
pub fn verify_manifest(manifest: &StageManifest) -> Result<Vec<VerifiedEntry>> {
    manifest
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let staged_path = manifest.staged_path(entry);
            let check = if !staged_path.is_file() {
                EntryCheck::Missing
            } else {
                let actual = hasher::sha256_file(&staged_path).op_context("hash", &staged_path)?;
                if actual == entry.checksum {
                    EntryCheck::Ok
                } else {
                    EntryCheck::Mismatch {
                        expected: entry.checksum.clone(),
                        actual,
                    }
                }
            };
            Ok(VerifiedEntry {
                index,
                staged_path,
                check,
            })
        })
        .collect()
}
