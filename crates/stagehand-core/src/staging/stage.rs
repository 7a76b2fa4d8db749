use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::apply::read_apply_log;
use super::manifest::{StageEntry, StageManifest, MANIFEST_FILENAME};
use crate::config::WorkPaths;
use crate::error::{Error, IoContext, Result};
use crate::fsops;
use crate::hasher;
use crate::progress::ProgressReporter;
use crate::rules::SuggestedChange;

/// Timestamp identifier with microsecond precision, e.g. `20240501093015123456`.
pub fn generate_manifest_id() -> String {
    Utc::now().format("%Y%m%d%H%M%S%6f").to_string()
}

/// Copy every change's source into a fresh quarantine directory and persist
/// the manifest describing them.
///
/// Entries keep input order. Each copy is named `<index>_<file name>` so
/// same-named sources cannot collide. Fails before any I/O on an empty batch,
/// and before touching the staging area if `manifest_id` belongs to an apply
/// that has not been rolled back.
pub fn stage_changes(
    changes: &[SuggestedChange],
    paths: &WorkPaths,
    manifest_id: Option<&str>,
    reporter: &dyn ProgressReporter,
) -> Result<StageManifest> {
    if changes.is_empty() {
        return Err(Error::EmptyBatch);
    }

    let identifier = match manifest_id {
        Some(id) => id.to_string(),
        None => generate_manifest_id(),
    };
    fsops::validate_manifest_id(&identifier)?;

    if let Some(log) = read_apply_log(paths, &identifier)? {
        if log.rolled_back_at.is_none() {
            return Err(Error::ManifestInUse { id: identifier });
        }
    }

    let start = Instant::now();
    reporter.on_stage_start(changes.len());

    let manifest_dir = paths.manifest_dir(&identifier);
    if fsops::occupied(&manifest_dir) {
        debug!(dir = %manifest_dir.display(), "replacing existing staging directory");
        fs::remove_dir_all(&manifest_dir).op_context("clear staging directory", &manifest_dir)?;
    }
    fs::create_dir_all(&manifest_dir).op_context("create staging directory", &manifest_dir)?;

    let mut entries = Vec::with_capacity(changes.len());
    for (index, change) in changes.iter().enumerate() {
        reporter.on_stage_entry(index, &change.source);

        let source_path = resolve_source(&change.source)?;
        let destination_path = fsops::resolve_lenient(&change.destination);

        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let staged_relpath = format!("{:04}_{}", index, file_name);
        let staged_path = manifest_dir.join(&staged_relpath);

        fsops::copy_with_metadata(&source_path, &staged_path)?;
        let checksum = hasher::sha256_file(&staged_path).op_context("hash", &staged_path)?;

        debug!(
            index,
            source = %source_path.display(),
            staged = %staged_relpath,
            checksum = %checksum,
            "staged"
        );

        entries.push(StageEntry {
            source_path,
            destination_path,
            action: change.action,
            staged_relpath,
            checksum,
        });
    }

    let manifest = StageManifest {
        identifier,
        path: manifest_dir.join(MANIFEST_FILENAME),
        created_at: Utc::now(),
        entries,
    };
    manifest.write()?;

    let duration = start.elapsed();
    info!(
        "Staged {} change(s) as manifest {} in {:.2}s",
        manifest.entries.len(),
        manifest.identifier,
        duration.as_secs_f64()
    );
    reporter.on_stage_complete(
        &manifest.identifier,
        manifest.entries.len(),
        duration.as_secs_f64(),
    );

    Ok(manifest)
}

/// Absolute, symlink-resolved path of an existing regular file.
fn resolve_source(source: &Path) -> Result<PathBuf> {
    let expanded = fsops::expand_tilde(source);
    let resolved = match fs::canonicalize(&expanded) {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::SourceMissing {
                path: fsops::absolutize(&expanded),
            })
        }
        Err(e) => return Err(Error::file_op("resolve", expanded, e)),
    };
    if !resolved.is_file() {
        return Err(Error::InvalidArgument(format!(
            "can only stage regular files, {} is not one",
            resolved.display()
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::rules::ActionKind;
    use tempfile::tempdir;

    fn move_change(source: &Path, destination: &Path) -> SuggestedChange {
        SuggestedChange::new("Move", source, destination, ActionKind::Move)
    }

    #[test]
    fn test_empty_batch_rejected_before_io() {
        let tmp = tempdir().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));
        let err = stage_changes(&[], &paths, Some("x"), &SilentReporter).unwrap_err();
        assert!(matches!(err, Error::EmptyBatch));
        assert!(!paths.root.exists());
    }

    #[test]
    fn test_generated_ids_are_timestamps() {
        let id = generate_manifest_id();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_same_named_sources_get_distinct_copies() {
        let tmp = tempdir().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));
        let a = tmp.path().join("a").join("notes.txt");
        let b = tmp.path().join("b").join("notes.txt");
        for (path, body) in [(&a, "from a"), (&b, "from b")] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }

        let out = tmp.path().join("out");
        let manifest = stage_changes(
            &[
                move_change(&a, &out.join("a-notes.txt")),
                move_change(&b, &out.join("b-notes.txt")),
            ],
            &paths,
            Some("dupes"),
            &SilentReporter,
        )
        .unwrap();

        assert_eq!(manifest.entries[0].staged_relpath, "0000_notes.txt");
        assert_eq!(manifest.entries[1].staged_relpath, "0001_notes.txt");
        assert_eq!(
            fs::read_to_string(manifest.staged_path(&manifest.entries[1])).unwrap(),
            "from b"
        );
        assert_ne!(manifest.entries[0].checksum, manifest.entries[1].checksum);
    }

    #[test]
    fn test_missing_source_names_path() {
        let tmp = tempdir().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));
        let ghost = tmp.path().join("ghost.txt");
        let err = stage_changes(
            &[move_change(&ghost, &tmp.path().join("dest.txt"))],
            &paths,
            Some("ghost"),
            &SilentReporter,
        )
        .unwrap_err();
        match err {
            Error::SourceMissing { path } => assert!(path.ends_with("ghost.txt")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_restage_replaces_quarantine_dir() {
        let tmp = tempdir().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));
        let first = tmp.path().join("first.txt");
        let second = tmp.path().join("second.txt");
        fs::write(&first, "1").unwrap();
        fs::write(&second, "2").unwrap();

        stage_changes(
            &[move_change(&first, &tmp.path().join("x/first.txt"))],
            &paths,
            Some("again"),
            &SilentReporter,
        )
        .unwrap();
        let manifest = stage_changes(
            &[move_change(&second, &tmp.path().join("x/second.txt"))],
            &paths,
            Some("again"),
            &SilentReporter,
        )
        .unwrap();

        let names: Vec<_> = fs::read_dir(manifest.directory())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"0000_second.txt".to_string()));
        assert!(!names.contains(&"0000_first.txt".to_string()));
    }

    #[test]
    fn test_directory_source_rejected() {
        let tmp = tempdir().unwrap();
        let paths = WorkPaths::new(tmp.path().join("work"));
        let dir = tmp.path().join("folder");
        fs::create_dir(&dir).unwrap();
        let err = stage_changes(
            &[move_change(&dir, &tmp.path().join("elsewhere"))],
            &paths,
            Some("dir"),
            &SilentReporter,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
