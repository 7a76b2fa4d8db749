//! Rule-driven file organization with a staged, reversible apply.
//!
//! Files are described ([`rules::FileMetadata`]), matched against ordered
//! rules into [`rules::SuggestedChange`]s, quarantined by
//! [`staging::stage_changes`], moved into place by [`staging::apply_manifest`]
//! and undone by [`staging::rollback_manifest`]. Every step after suggestion
//! reads and writes durable JSON under the working directory.

pub mod config;
pub mod engine;
pub mod error;
pub mod fsops;
pub mod hasher;
pub mod progress;
pub mod rules;
pub mod scanner;
pub mod staging;
pub mod storage;

pub use config::{AppConfig, WorkPaths};
pub use engine::Organizer;
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
