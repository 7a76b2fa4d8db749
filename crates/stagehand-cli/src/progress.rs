use indicatif::{ProgressBar, ProgressStyle};
use stagehand_core::ProgressReporter;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// CLI progress reporter: one bar per pipeline step, sized by entry count.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn start(&self, verb: &str, total: usize) {
        let style = ProgressStyle::with_template(&format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} {{wide_msg}}",
            verb
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

        let pb = ProgressBar::new(total as u64);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn advance(&self, path: &Path) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.inc(1);
                pb.set_message(path.display().to_string());
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_stage_start(&self, total_entries: usize) {
        self.start("Staging", total_entries);
    }

    fn on_stage_entry(&self, _index: usize, source: &Path) {
        self.advance(source);
    }

    fn on_stage_complete(&self, manifest_id: &str, entries: usize, duration_secs: f64) {
        self.finish();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Staged {} entries as {} in {:.2}s",
            entries, manifest_id, duration_secs
        );
    }

    fn on_apply_start(&self, total_entries: usize) {
        self.start("Applying", total_entries);
    }

    fn on_apply_entry(&self, _index: usize, destination: &Path) {
        self.advance(destination);
    }

    fn on_apply_complete(&self, applied: usize, duration_secs: f64) {
        self.finish();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Applied {} entries in {:.2}s",
            applied, duration_secs
        );
    }

    fn on_rollback_start(&self, total_entries: usize) {
        self.start("Restoring", total_entries);
    }

    fn on_rollback_entry(&self, _index: usize, source: &Path) {
        self.advance(source);
    }

    fn on_rollback_complete(&self, restored: usize, failed: usize, duration_secs: f64) {
        self.finish();
        let mark = if failed == 0 {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[33m!\x1b[0m"
        };
        eprintln!(
            "  {} Rollback: {} restored, {} failed in {:.2}s",
            mark, restored, failed, duration_secs
        );
    }
}
