use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{AppConfig, WorkPaths};
use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::rules::{self, FileMetadata, Rule, SuggestedChange};
use crate::scanner::{self, ScanOptions, ScanOutput};
use crate::staging::{
    self, ManifestSummary, RollbackReport, StageManifest, VerifiedEntry,
};
use crate::storage::{self, MemoryStore};

/// Binds a configuration and its working directory to the pipeline:
/// scan, suggest, stage, preview, verify, apply, rollback.
pub struct Organizer {
    config: AppConfig,
    paths: WorkPaths,
}

impl Organizer {
    pub fn new(config: AppConfig) -> Self {
        let paths = config.work_paths();
        Self { config, paths }
    }

    pub fn with_work_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = WorkPaths::new(root);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn paths(&self) -> &WorkPaths {
        &self.paths
    }

    pub fn memory(&self) -> MemoryStore {
        MemoryStore::new(&self.paths.memory_file)
    }

    /// Scan with the configured hidden-file and ignore settings.
    pub fn scan(&self, roots: &[PathBuf], max_depth: Option<usize>) -> ScanOutput {
        let options = ScanOptions {
            max_depth,
            ..ScanOptions::from_config(&self.config)
        };
        let output = scanner::scan_paths(roots, &options);
        info!(
            "Scanned {} file(s), {} error(s)",
            output.files.len(),
            output.errors.len()
        );
        output
    }

    /// Rules from memory (unless `use_memory` is false) merged with `caller`.
    pub fn rules(&self, caller: &Value, use_memory: bool) -> Result<Vec<Rule>> {
        if use_memory {
            storage::gather_rules(&self.memory().load()?, caller)
        } else {
            rules::load_rules(caller)
        }
    }

    /// `default_destination` falls back to the configured one.
    pub fn suggest(
        &self,
        files: &[FileMetadata],
        rules: &[Rule],
        default_destination: Option<&Path>,
    ) -> Result<Vec<SuggestedChange>> {
        let configured = self.config.default_destination_path();
        let destination = default_destination.or(configured.as_deref());
        rules::build_suggestions(files, rules, destination)
    }

    pub fn stage(
        &self,
        changes: &[SuggestedChange],
        manifest_id: Option<&str>,
        reporter: &dyn ProgressReporter,
    ) -> Result<StageManifest> {
        self.paths.ensure_dirs()?;
        staging::stage_changes(changes, &self.paths, manifest_id, reporter)
    }

    pub fn load_manifest(&self, manifest_id: &str) -> Result<StageManifest> {
        staging::load_manifest(&self.paths, manifest_id)
    }

    pub fn preview(&self, manifest_id: &str) -> Result<String> {
        Ok(staging::preview_diff(&self.load_manifest(manifest_id)?))
    }

    pub fn verify(&self, manifest_id: &str) -> Result<Vec<VerifiedEntry>> {
        staging::verify_manifest(&self.load_manifest(manifest_id)?)
    }

    /// Returns the path of the apply log.
    pub fn apply(&self, manifest_id: &str, reporter: &dyn ProgressReporter) -> Result<PathBuf> {
        let manifest = self.load_manifest(manifest_id)?;
        self.paths.ensure_dirs()?;
        staging::apply_manifest(&self.paths, &manifest, reporter)
    }

    pub fn rollback(
        &self,
        manifest_id: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<RollbackReport> {
        staging::rollback_manifest(&self.paths, manifest_id, reporter)
    }

    pub fn list(&self) -> Result<Vec<ManifestSummary>> {
        staging::list_manifests(&self.paths)
    }
}
