use std::path::Path;

/// Trait for reporting pipeline progress.
///
/// The CLI implements it with indicatif; library callers can ignore it.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_stage_start(&self, _total_entries: usize) {}
    fn on_stage_entry(&self, _index: usize, _source: &Path) {}
    fn on_stage_complete(&self, _manifest_id: &str, _entries: usize, _duration_secs: f64) {}
    fn on_apply_start(&self, _total_entries: usize) {}
    fn on_apply_entry(&self, _index: usize, _destination: &Path) {}
    fn on_apply_complete(&self, _applied: usize, _duration_secs: f64) {}
    fn on_rollback_start(&self, _total_entries: usize) {}
    fn on_rollback_entry(&self, _index: usize, _source: &Path) {}
    fn on_rollback_complete(&self, _restored: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
