mod commands;
mod logging;
mod progress;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, RulesCommand};
use dotenv::dotenv;
use progress::CliReporter;
use serde_json::Value;
use stagehand_core::rules::{self, SuggestedChange};
use stagehand_core::staging::{ApplyState, EntryCheck};
use stagehand_core::{AppConfig, Organizer};
use tracing::{error, info, warn};

const CONFIG_FILENAME: &str = "Config.toml";

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match stagehand_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let mut organizer = Organizer::new(config.clone());
    if let Some(dir) = &args.work_dir {
        organizer = organizer.with_work_dir(dir);
    }

    let result = match args.command {
        Some(Commands::Init) => run_init(&organizer),
        Some(Commands::Scan {
            paths,
            max_depth,
            out,
        }) => run_scan(&organizer, &paths, max_depth, out.as_deref()),
        Some(Commands::Suggest {
            paths,
            rules,
            no_memory,
            default_destination,
            max_depth,
            out,
        }) => run_suggest(
            &organizer,
            &paths,
            rules.as_deref(),
            !no_memory,
            default_destination.as_deref(),
            max_depth,
            out.as_deref(),
        ),
        Some(Commands::Stage {
            suggestions,
            manifest_id,
        }) => run_stage(&organizer, &suggestions, manifest_id.as_deref()),
        Some(Commands::Preview { manifest_id }) => organizer
            .preview(&manifest_id)
            .map(|text| println!("{}", text))
            .map_err(Into::into),
        Some(Commands::Verify { manifest_id }) => run_verify(&organizer, &manifest_id),
        Some(Commands::Apply { manifest_id, yes }) => run_apply(&organizer, &manifest_id, yes),
        Some(Commands::Rollback { manifest_id, yes }) => {
            run_rollback(&organizer, &manifest_id, yes)
        }
        Some(Commands::List) => run_list(&organizer),
        Some(Commands::Rules { action }) => run_rules(&organizer, action),
        Some(Commands::PrintConfig) => toml::to_string_pretty(&config)
            .map(|text| println!("{}", text))
            .context("Failed to render configuration"),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run_init(organizer: &Organizer) -> Result<()> {
    let paths = organizer.paths();
    paths.ensure_dirs()?;
    info!("Working directory ready at {}", paths.root.display());

    let config_path = Path::new(CONFIG_FILENAME);
    if config_path.exists() {
        info!("{} already exists, leaving it unchanged", CONFIG_FILENAME);
        return Ok(());
    }
    let starter = AppConfig {
        work_dir: Some(paths.root.display().to_string()),
        ..organizer.config().clone()
    };
    let text = toml::to_string_pretty(&starter).context("Failed to render starter config")?;
    fs::write(config_path, text).with_context(|| format!("Failed to write {}", CONFIG_FILENAME))?;
    info!("Wrote {}", CONFIG_FILENAME.green());
    Ok(())
}

fn run_scan(
    organizer: &Organizer,
    paths: &[PathBuf],
    max_depth: Option<usize>,
    out: Option<&Path>,
) -> Result<()> {
    let scan = organizer.scan(paths, max_depth);
    for e in &scan.errors {
        warn!("{}: {}", e.path.display(), e.message);
    }
    match out {
        Some(out) => write_json(out, &scan.files)?,
        None => {
            for file in &scan.files {
                println!(
                    "{:>10}  {:<12} {}",
                    file.size.unwrap_or(0),
                    file.kind.as_deref().unwrap_or("-").cyan(),
                    file.path.display()
                );
            }
        }
    }
    info!(
        "{} files, {} errors",
        format!("{}", scan.files.len()).green(),
        format!("{}", scan.errors.len()).red()
    );
    Ok(())
}

fn run_suggest(
    organizer: &Organizer,
    paths: &[PathBuf],
    rules_file: Option<&Path>,
    use_memory: bool,
    default_destination: Option<&Path>,
    max_depth: Option<usize>,
    out: Option<&Path>,
) -> Result<()> {
    let caller = match rules_file {
        Some(path) => read_json(path)?,
        None => Value::Null,
    };
    let rules = organizer.rules(&caller, use_memory)?;
    if rules.is_empty() {
        warn!("No rules available; add some with `stagehand rules add` or pass --rules");
    }

    let scan = organizer.scan(paths, max_depth);
    for e in &scan.errors {
        warn!("{}: {}", e.path.display(), e.message);
    }
    let changes = organizer.suggest(&scan.files, &rules, default_destination)?;

    for change in &changes {
        println!(
            "{:<7} {} -> {}  ({})",
            change.action.as_str().to_uppercase().yellow(),
            change.source.display(),
            change.destination.display(),
            change.rule_name.dimmed()
        );
    }
    if let Some(out) = out {
        write_json(out, &changes)?;
        info!("Wrote {} suggestion(s) to {}", changes.len(), out.display());
    }
    Ok(())
}

fn run_stage(organizer: &Organizer, suggestions: &Path, manifest_id: Option<&str>) -> Result<()> {
    let changes: Vec<SuggestedChange> = serde_json::from_value(read_json(suggestions)?)
        .with_context(|| format!("{} is not a suggestion list", suggestions.display()))?;
    let reporter = CliReporter::new();
    let manifest = organizer.stage(&changes, manifest_id, &reporter)?;
    println!("{}", manifest.identifier.green());
    Ok(())
}

fn run_verify(organizer: &Organizer, manifest_id: &str) -> Result<()> {
    let results = organizer.verify(manifest_id)?;
    let mut bad = 0;
    for result in &results {
        let status = match &result.check {
            EntryCheck::Ok => "ok".green(),
            EntryCheck::Missing => "missing".yellow(),
            EntryCheck::Mismatch { .. } => {
                bad += 1;
                "MISMATCH".red()
            }
        };
        println!("{:>4} {:<8} {}", result.index, status, result.staged_path.display());
    }
    if bad > 0 {
        anyhow::bail!("{} staged file(s) changed since staging", bad);
    }
    Ok(())
}

fn run_apply(organizer: &Organizer, manifest_id: &str, yes: bool) -> Result<()> {
    println!("{}", organizer.preview(manifest_id)?);
    if !yes && !prompt_confirm("Apply these changes?", Some(false))? {
        info!("Apply cancelled");
        return Ok(());
    }
    let reporter = CliReporter::new();
    let log_path = organizer.apply(manifest_id, &reporter)?;
    info!("Apply log written to {}", log_path.display());
    Ok(())
}

fn run_rollback(organizer: &Organizer, manifest_id: &str, yes: bool) -> Result<()> {
    if !yes
        && !prompt_confirm(
            &format!("Roll back manifest {}?", manifest_id),
            Some(false),
        )?
    {
        info!("Rollback cancelled");
        return Ok(());
    }
    let reporter = CliReporter::new();
    let report = organizer.rollback(manifest_id, &reporter)?;
    for failure in &report.failures {
        println!(
            "{} entry {} ({}): {}",
            "FAILED".red(),
            failure.index,
            failure.path.display(),
            failure.message
        );
    }
    if !report.is_clean() {
        anyhow::bail!(
            "{} entr(ies) need manual recovery; backups remain under {}",
            report.failures.len(),
            organizer.paths().manifest_log_dir(manifest_id).display()
        );
    }
    Ok(())
}

fn run_list(organizer: &Organizer) -> Result<()> {
    let manifests = organizer.list()?;
    if manifests.is_empty() {
        info!("No staged manifests");
    }
    for m in &manifests {
        let state = match m.state {
            ApplyState::Staged => "staged".cyan(),
            ApplyState::Applied => "applied".green(),
            ApplyState::RolledBack => "rolled back".yellow(),
            ApplyState::Unknown => "log unreadable".red(),
        };
        println!(
            "{}  {}  {:>4} entries  {}",
            m.identifier,
            m.created_at.format("%Y-%m-%d %H:%M:%S"),
            m.entries,
            state
        );
    }
    Ok(())
}

fn run_rules(organizer: &Organizer, action: RulesCommand) -> Result<()> {
    let memory = organizer.memory();
    match action {
        RulesCommand::List => {
            let stored = organizer.rules(&Value::Null, true)?;
            for (position, rule) in stored.iter().enumerate() {
                let actions: Vec<_> = rule.actions.iter().map(|a| a.kind().as_str()).collect();
                let destinations: Vec<_> = rules::parse::rule_destinations(rule)
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect();
                println!(
                    "{:>3}. {}  [{}] {}",
                    position + 1,
                    rule.name.bold(),
                    actions.join(", "),
                    destinations.join(", ").dimmed()
                );
            }
        }
        RulesCommand::Add { name, file } => {
            let rule = memory.upsert_rule(&name, read_json(&file)?)?;
            info!("Stored rule {}", rule.name.green());
        }
        RulesCommand::Remove { name } => {
            if memory.remove_rule(&name)? {
                info!("Removed rule {}", name);
            } else {
                warn!("No stored rule named {}", name);
            }
        }
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
