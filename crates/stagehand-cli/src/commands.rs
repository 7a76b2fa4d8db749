use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stagehand")]
#[command(about = "Rule-driven file organizer with staged, reversible moves", long_about = None)]
pub struct Cli {
    /// Override the configured working directory
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the working directory and a starter Config.toml
    Init,
    /// Describe files under the given paths
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        max_depth: Option<usize>,
        /// Write the file list as JSON instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Scan paths and propose changes from the rule set
    Suggest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// JSON rules file, merged over rules stored in memory
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Ignore rules stored in memory
        #[arg(long)]
        no_memory: bool,
        #[arg(long)]
        default_destination: Option<PathBuf>,
        #[arg(long)]
        max_depth: Option<usize>,
        /// Write suggestions as JSON (input for `stage`)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Quarantine copies of suggested changes into a new manifest
    Stage {
        /// JSON file of suggestions produced by `suggest --out`
        suggestions: PathBuf,
        #[arg(long)]
        manifest_id: Option<String>,
    },
    /// Show what a staged manifest would do
    Preview { manifest_id: String },
    /// Re-hash quarantined copies against their recorded checksums
    Verify { manifest_id: String },
    /// Move a staged manifest's files into place
    Apply {
        manifest_id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Undo an applied manifest
    Rollback {
        manifest_id: String,
        #[arg(long)]
        yes: bool,
    },
    /// List staged manifests and their apply state
    List,
    /// Manage rules stored in memory
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// Show stored rules in priority order
    List,
    /// Store a rule definition read from a JSON file
    Add { name: String, file: PathBuf },
    /// Delete a stored rule
    Remove { name: String },
}
