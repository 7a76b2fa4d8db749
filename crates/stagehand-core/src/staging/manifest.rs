use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::WorkPaths;
use crate::error::{Error, IoContext, Result};
use crate::fsops;
use crate::rules::ActionKind;

pub const MANIFEST_FILENAME: &str = "manifest.json";

/// One quarantined copy and where it is headed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEntry {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub action: ActionKind,
    /// File name of the copy inside the manifest directory.
    pub staged_relpath: String,
    /// Hex SHA-256 of the copy at staging time.
    pub checksum: String,
}

/// Durable record of a staged batch. Read-only once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageManifest {
    pub identifier: String,
    /// Location of the manifest file; its parent holds the staged copies.
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<StageEntry>,
}

/// On-disk shape of `staging/<id>/manifest.json`.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    id: String,
    created_at: DateTime<Utc>,
    entries: Vec<StageEntry>,
}

impl StageManifest {
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn staged_path(&self, entry: &StageEntry) -> PathBuf {
        self.directory().join(&entry.staged_relpath)
    }

    pub(crate) fn write(&self) -> Result<()> {
        let file = ManifestFile {
            id: self.identifier.clone(),
            created_at: self.created_at,
            entries: self.entries.clone(),
        };
        fsops::write_json_atomic(&self.path, &file)
    }
}

/// Read a staged manifest back from disk.
pub fn load_manifest(paths: &WorkPaths, manifest_id: &str) -> Result<StageManifest> {
    fsops::validate_manifest_id(manifest_id)?;
    let path = paths.manifest_dir(manifest_id).join(MANIFEST_FILENAME);
    load_manifest_file(&path).map_err(|e| match e {
        Error::FileOperation { source, .. } if source.kind() == io::ErrorKind::NotFound => {
            Error::ManifestNotFound {
                id: manifest_id.to_string(),
                path: path.clone(),
            }
        }
        other => other,
    })
}

pub fn load_manifest_file(path: &Path) -> Result<StageManifest> {
    let text = fs::read_to_string(path).op_context("read manifest", path)?;
    let file: ManifestFile = serde_json::from_str(&text)?;
    Ok(StageManifest {
        identifier: file.id,
        path: path.to_path_buf(),
        created_at: file.created_at,
        entries: file.entries,
    })
}

/// Where a staged manifest stands, as far as its apply log says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    Staged,
    Applied,
    RolledBack,
    /// The apply log exists but could not be read.
    Unknown,
}

/// Summary row for `list_manifests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub identifier: String,
    pub created_at: DateTime<Utc>,
    pub entries: usize,
    pub state: ApplyState,
}

/// Every readable manifest under the staging dir, sorted by identifier.
/// Directories without a readable manifest are skipped; an unreadable apply
/// log leaves its row in `ApplyState::Unknown`.
pub fn list_manifests(paths: &WorkPaths) -> Result<Vec<ManifestSummary>> {
    let entries = match fs::read_dir(&paths.staging_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::file_op("list", &paths.staging_dir, e)),
    };

    let mut summaries = Vec::new();
    for entry in entries {
        let entry = entry.op_context("list", &paths.staging_dir)?;
        let manifest_path = entry.path().join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            continue;
        }
        let manifest = match load_manifest_file(&manifest_path) {
            Ok(m) => m,
            Err(e) => {
                warn!("Skipping unreadable manifest {}: {}", manifest_path.display(), e);
                continue;
            }
        };
        let state = match super::apply::read_apply_log(paths, &manifest.identifier) {
            Ok(None) => ApplyState::Staged,
            Ok(Some(log)) if log.rolled_back_at.is_some() => ApplyState::RolledBack,
            Ok(Some(_)) => ApplyState::Applied,
            Err(e) => {
                warn!(
                    "Unreadable apply log for manifest {}: {}",
                    manifest.identifier, e
                );
                ApplyState::Unknown
            }
        };
        summaries.push(ManifestSummary {
            identifier: manifest.identifier,
            created_at: manifest.created_at,
            entries: manifest.entries.len(),
            state,
        });
    }

    summaries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::rules::SuggestedChange;
    use crate::staging::apply::apply_log_path;
    use crate::staging::stage::stage_changes;
    use tempfile::tempdir;

    #[test]
    fn test_list_survives_corrupt_apply_log() {
        let tmp = tempdir().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));
        for id in ["broken", "fresh"] {
            let source = tmp.path().join(format!("{}.txt", id));
            fs::write(&source, id).unwrap();
            let change = SuggestedChange::new(
                "Move",
                &source,
                &tmp.path().join("out").join(format!("{}.txt", id)),
                ActionKind::Move,
            );
            stage_changes(&[change], &paths, Some(id), &SilentReporter).unwrap();
        }
        let log_path = apply_log_path(&paths, "broken");
        fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        fs::write(&log_path, "{ not json").unwrap();

        let listed = list_manifests(&paths).unwrap();
        let states: Vec<_> = listed
            .iter()
            .map(|m| (m.identifier.as_str(), m.state))
            .collect();
        assert_eq!(
            states,
            vec![("broken", ApplyState::Unknown), ("fresh", ApplyState::Staged)]
        );
    }
}
