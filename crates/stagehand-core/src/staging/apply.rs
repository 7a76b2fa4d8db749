use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::manifest::{StageManifest, MANIFEST_FILENAME};
use crate::config::WorkPaths;
use crate::error::{Error, IoContext, Result};
use crate::fsops;
use crate::progress::ProgressReporter;
use crate::rules::ActionKind;

/// What apply did for one manifest entry, including where displaced files went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyLogEntry {
    pub action: ActionKind,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub backup_source: PathBuf,
    pub backup_destination: Option<PathBuf>,
}

/// Durable record of an apply, stored as `logs/<id>/manifest.json`.
///
/// Entries keep manifest order so rollback can walk them backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyLog {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    /// False while apply is running or if it stopped at a failing entry.
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub entries: Vec<ApplyLogEntry>,
    #[serde(skip)]
    pub path: PathBuf,
}

impl ApplyLog {
    pub(crate) fn write(&self) -> Result<()> {
        fsops::write_json_atomic(&self.path, self)
    }
}

pub fn apply_log_path(paths: &WorkPaths, manifest_id: &str) -> PathBuf {
    paths.manifest_log_dir(manifest_id).join(MANIFEST_FILENAME)
}

/// `Ok(None)` when no apply has been recorded for `manifest_id`.
pub fn read_apply_log(paths: &WorkPaths, manifest_id: &str) -> Result<Option<ApplyLog>> {
    let path = apply_log_path(paths, manifest_id);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).op_context("read apply log", &path)?;
    let mut log: ApplyLog = serde_json::from_str(&text)?;
    log.path = path;
    Ok(Some(log))
}

pub fn load_apply_log(paths: &WorkPaths, manifest_id: &str) -> Result<ApplyLog> {
    fsops::validate_manifest_id(manifest_id)?;
    read_apply_log(paths, manifest_id)?.ok_or_else(|| Error::NoLogManifest {
        id: manifest_id.to_string(),
        path: apply_log_path(paths, manifest_id),
    })
}

/// Move staged copies into place, backing up whatever they displace.
///
/// Entries run in manifest order. Tag and trash entries are informational and
/// skipped. For move and rename:
/// 1. the quarantined copy must exist (`StagedFileMissing`)
/// 2. the original source must still exist (`SourceVanished`)
/// 3. an occupied destination other than the source moves to `<index>_dest`
/// 4. the source moves to `<index>_source`
/// 5. the quarantined copy moves to the destination
///
/// Fails with `ManifestInUse` if an earlier apply of the same id was never
/// rolled back, and with `UnrestoredBackups` if a rollback left backups behind
/// in the log directory. Existing backups are never overwritten.
///
/// Nothing is deleted. Apply is not atomic across entries: a failure at entry
/// *k* leaves entries before it applied, and the log on disk (rewritten after
/// every entry) already lists them, so `rollback_manifest` can undo them.
pub fn apply_manifest(
    paths: &WorkPaths,
    manifest: &StageManifest,
    reporter: &dyn ProgressReporter,
) -> Result<PathBuf> {
    fsops::validate_manifest_id(&manifest.identifier)?;

    if let Some(previous) = read_apply_log(paths, &manifest.identifier)? {
        if previous.rolled_back_at.is_none() {
            return Err(Error::ManifestInUse {
                id: manifest.identifier.clone(),
            });
        }
    }

    let log_dir = fsops::absolutize(&paths.manifest_log_dir(&manifest.identifier));
    fs::create_dir_all(&log_dir).op_context("create log directory", &log_dir)?;
    let leftovers = leftover_backups(&log_dir)?;
    if !leftovers.is_empty() {
        warn!(
            id = %manifest.identifier,
            count = leftovers.len(),
            "refusing to apply over unrestored backups"
        );
        return Err(Error::UnrestoredBackups {
            id: manifest.identifier.clone(),
            path: log_dir,
        });
    }

    let start = Instant::now();
    reporter.on_apply_start(manifest.entries.len());

    let mut log = ApplyLog {
        id: manifest.identifier.clone(),
        applied_at: Utc::now(),
        complete: false,
        rolled_back_at: None,
        entries: Vec::new(),
        path: log_dir.join(MANIFEST_FILENAME),
    };

    for (index, entry) in manifest.entries.iter().enumerate() {
        if !entry.action.mutates_filesystem() {
            debug!(index, action = %entry.action, "informational entry, nothing to apply");
            continue;
        }

        let staged_path = manifest.staged_path(entry);
        if !staged_path.is_file() {
            return Err(Error::StagedFileMissing { path: staged_path });
        }

        let source = &entry.source_path;
        let destination = &entry.destination_path;
        if !fsops::occupied(source) {
            return Err(Error::SourceVanished {
                path: source.clone(),
            });
        }

        let backup_source = log_dir.join(format!("{:04}_source", index));
        let backup_dest_path = log_dir.join(format!("{:04}_dest", index));
        for backup in [&backup_source, &backup_dest_path] {
            if fsops::occupied(backup) {
                return Err(Error::UnrestoredBackups {
                    id: manifest.identifier.clone(),
                    path: backup.clone(),
                });
            }
        }
        let backup_destination = if fsops::occupied(destination) && destination != source {
            let backup = backup_dest_path;
            fsops::move_path(destination, &backup)?;
            debug!(
                destination = %destination.display(),
                backup = %backup.display(),
                "backed up existing destination"
            );
            Some(backup)
        } else {
            None
        };

        {
            let mut done: Vec<(&Path, &Path)> = Vec::new();
            if let Some(backup) = &backup_destination {
                done.push((destination.as_path(), backup.as_path()));
            }
            if let Err(e) = fsops::move_path(source, &backup_source) {
                undo_entry_moves(&done);
                return Err(e);
            }
            done.push((source.as_path(), backup_source.as_path()));
            if let Err(e) = fsops::move_path(&staged_path, destination) {
                undo_entry_moves(&done);
                return Err(e);
            }
        }

        log.entries.push(ApplyLogEntry {
            action: entry.action,
            source_path: source.clone(),
            destination_path: destination.clone(),
            backup_source,
            backup_destination,
        });
        log.write()?;

        debug!(
            index,
            source = %source.display(),
            destination = %destination.display(),
            "applied"
        );
        reporter.on_apply_entry(index, destination);
    }

    log.complete = true;
    log.write()?;

    let duration = start.elapsed();
    info!(
        "Applied {} of {} entries from manifest {} in {:.2}s",
        log.entries.len(),
        manifest.entries.len(),
        manifest.identifier,
        duration.as_secs_f64()
    );
    reporter.on_apply_complete(log.entries.len(), duration.as_secs_f64());

    Ok(log.path)
}

/// Backup files in `log_dir`, i.e. anything but the log itself and temp files.
fn leftover_backups(log_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(log_dir).op_context("list", log_dir)? {
        let entry = entry.op_context("list", log_dir)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == MANIFEST_FILENAME || name.starts_with('.') {
            continue;
        }
        found.push(entry.path());
    }
    Ok(found)
}

/// Put back files moved earlier in the same failing entry, newest first.
fn undo_entry_moves(done: &[(&Path, &Path)]) {
    for (original, backup) in done.iter().rev() {
        if let Err(e) = fsops::move_path(backup, original) {
            warn!(
                "Could not restore {} from {}: {}",
                original.display(),
                backup.display(),
                e
            );
        }
    }
}
