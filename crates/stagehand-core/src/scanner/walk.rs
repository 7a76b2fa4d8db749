use glob::Pattern;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::AppConfig;
use crate::fsops;
use crate::rules::FileMetadata;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub include_hidden: bool,
    /// Levels below each root to descend; `None` walks everything.
    pub max_depth: Option<usize>,
    pub ignore_patterns: Vec<String>,
}

impl ScanOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            include_hidden: config.include_hidden,
            max_depth: None,
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }
}

/// A path the scanner could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutput {
    /// Deduplicated by resolved path and sorted by path string.
    pub files: Vec<FileMetadata>,
    pub errors: Vec<ScanError>,
}

/// Walk `roots` and describe every regular file found.
///
/// Roots may be files or directories. Symlinks are not followed. Hidden
/// entries (leading `.`) are skipped unless `include_hidden`; an explicitly
/// named root is always scanned. Ignore globs match either the full path or
/// the file name.
pub fn scan_paths(roots: &[PathBuf], options: &ScanOptions) -> ScanOutput {
    let ignore_patterns: Vec<Pattern> = options
        .ignore_patterns
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let mut candidates = Vec::new();
    let mut errors = Vec::new();

    for root in roots {
        let root = fsops::expand_tilde(root);
        if !root.exists() {
            warn!("Scan root does not exist: {}", root.display());
            errors.push(ScanError {
                path: fsops::absolutize(&root),
                message: "path does not exist".to_string(),
            });
            continue;
        }

        let mut walker = WalkDir::new(&root).follow_links(false);
        if let Some(depth) = options.max_depth {
            walker = walker.max_depth(depth);
        }
        let entries = walker.into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || ((options.include_hidden || !is_hidden(entry))
                    && !is_ignored(entry.path(), &ignore_patterns))
        });

        for entry in entries {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    candidates.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    warn!("Skipping {}: {}", path.display(), e);
                    errors.push(ScanError {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    let described: Vec<Result<FileMetadata, ScanError>> =
        candidates.par_iter().map(|path| describe(path)).collect();

    let mut files = BTreeMap::new();
    for result in described {
        match result {
            Ok(metadata) => {
                let key = metadata.path.to_string_lossy().into_owned();
                files.entry(key).or_insert(metadata);
            }
            Err(e) => {
                warn!("Skipping {}: {}", e.path.display(), e.message);
                errors.push(e);
            }
        }
    }
    errors.sort_by(|a, b| a.path.cmp(&b.path));

    debug!(files = files.len(), errors = errors.len(), "scan finished");
    ScanOutput {
        files: files.into_values().collect(),
        errors,
    }
}

fn describe(path: &Path) -> Result<FileMetadata, ScanError> {
    let fail = |e: std::io::Error| ScanError {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let resolved = fs::canonicalize(path).map_err(fail)?;
    let meta = fs::metadata(&resolved).map_err(fail)?;

    let mut file = FileMetadata::new(&resolved);
    file.extension = resolved
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    file.size = Some(meta.len());
    file.kind = mime_guess::from_path(&resolved)
        .first()
        .map(|mime| mime.type_().as_str().to_string());
    Ok(file)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_ignored(path: &Path, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| {
        pattern.matches_path(path)
            || path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| pattern.matches(name))
    })
}
