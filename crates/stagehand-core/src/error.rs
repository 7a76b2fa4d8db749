use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed rule definition. Raised while parsing, never while matching.
    #[error("Invalid rule '{rule}': {message}")]
    Configuration { rule: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No changes provided for staging")]
    EmptyBatch,

    #[error("Source file missing during staging: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("Source disappeared before apply: {}", path.display())]
    SourceVanished { path: PathBuf },

    #[error("Missing staged file: {}", path.display())]
    StagedFileMissing { path: PathBuf },

    #[error("No log manifest for id '{id}' at {}", path.display())]
    NoLogManifest { id: String, path: PathBuf },

    #[error("Manifest '{id}' not found at {}", path.display())]
    ManifestNotFound { id: String, path: PathBuf },

    #[error("Manifest '{id}' has already been rolled back")]
    AlreadyRolledBack { id: String },

    #[error("Manifest '{id}' has an apply log that was never rolled back")]
    ManifestInUse { id: String },

    /// Backups from an earlier apply of this id were never restored.
    #[error("Manifest '{id}' still has unrestored backups in {}", path.display())]
    UnrestoredBackups { id: String, path: PathBuf },

    #[error("Failed to {op} {}: {source}", path.display())]
    FileOperation {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Memory store error at {}: {message}", path.display())]
    Memory { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn file_op(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::FileOperation {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn configuration(rule: &str, message: impl Into<String>) -> Self {
        Error::Configuration {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

/// Attach the attempted operation and offending path to an io error.
pub(crate) trait IoContext<T> {
    fn op_context(self, op: &'static str, path: &std::path::Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn op_context(self, op: &'static str, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| Error::file_op(op, path, e))
    }
}
