use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::apply::{load_apply_log, ApplyLogEntry};
use crate::config::WorkPaths;
use crate::error::{Error, Result};
use crate::fsops;
use crate::progress::ProgressReporter;

/// An entry rollback could not fully restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackFailure {
    pub index: usize,
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub manifest_id: String,
    pub restored: usize,
    pub failures: Vec<RollbackFailure>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Undo an applied manifest from its apply log, newest entry first.
///
/// Best effort: a failing entry is logged and recorded in the report and the
/// walk continues. The log is stamped `rolled_back_at` afterwards even when
/// some entries failed, so a second call raises `AlreadyRolledBack` instead of
/// replaying moves over restored files.
pub fn rollback_manifest(
    paths: &WorkPaths,
    manifest_id: &str,
    reporter: &dyn ProgressReporter,
) -> Result<RollbackReport> {
    let mut log = load_apply_log(paths, manifest_id)?;
    if log.rolled_back_at.is_some() {
        return Err(Error::AlreadyRolledBack {
            id: manifest_id.to_string(),
        });
    }

    let start = Instant::now();
    reporter.on_rollback_start(log.entries.len());

    let mut report = RollbackReport {
        manifest_id: manifest_id.to_string(),
        ..RollbackReport::default()
    };

    for (index, entry) in log.entries.iter().enumerate().rev() {
        match restore_entry(entry) {
            Ok(()) => {
                debug!(index, source = %entry.source_path.display(), "restored");
                report.restored += 1;
            }
            Err(e) => {
                warn!(
                    "Rollback of {} entry {} ({}) failed: {}",
                    manifest_id,
                    index,
                    entry.source_path.display(),
                    e
                );
                report.failures.push(RollbackFailure {
                    index,
                    path: entry.source_path.clone(),
                    message: e.to_string(),
                });
            }
        }
        reporter.on_rollback_entry(index, &entry.source_path);
    }

    log.rolled_back_at = Some(Utc::now());
    log.write()?;

    let duration = start.elapsed();
    info!(
        "Rolled back manifest {}: {} restored, {} failed in {:.2}s",
        manifest_id,
        report.restored,
        report.failures.len(),
        duration.as_secs_f64()
    );
    reporter.on_rollback_complete(report.restored, report.failures.len(), duration.as_secs_f64());

    Ok(report)
}

/// Remove what apply placed, then move backups home.
///
/// A missing source backup fails the entry before anything is touched, since
/// the destination then holds the only copy. The destination backup is only
/// restored once the destination is clear, so a failed removal never lets it
/// clobber anything. The source backup is attempted regardless.
fn restore_entry(entry: &ApplyLogEntry) -> Result<()> {
    if !fsops::occupied(&entry.backup_source) {
        return Err(Error::file_op(
            "restore from",
            &entry.backup_source,
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    let destination = &entry.destination_path;
    let mut first_error = None;

    let cleared = if fsops::occupied(destination) {
        match fs::remove_file(destination) {
            Ok(()) => true,
            Err(e) => {
                first_error = Some(Error::file_op("remove", destination, e));
                false
            }
        }
    } else {
        true
    };

    if cleared {
        if let Some(backup) = &entry.backup_destination {
            if fsops::occupied(backup) {
                if let Err(e) = fsops::move_path(backup, destination) {
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    if let Err(e) = fsops::move_path(&entry.backup_source, &entry.source_path) {
        first_error.get_or_insert(e);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
