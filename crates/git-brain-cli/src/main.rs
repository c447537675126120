#![forbid(unsafe_code)]

use std::io::{BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use git_brain_core::config::{BrainDescriptor, ConflictStrategy, ConsumerDescriptor};
use git_brain_core::git::RealGitDriver;
use git_brain_core::{detector, export, sync};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const BRAIN_DESCRIPTOR_NAME: &str = ".brain";
const CONSUMER_DESCRIPTOR_NAME: &str = ".consumer";

#[derive(Parser, Debug)]
#[command(
    name = "git-brain",
    author,
    version,
    about = "Share versioned files and directories between Git repositories",
    long_about = None
)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Materialize neurons from their brains into this repository.
    Sync {
        /// Limit to mappings whose destination is one of these paths.
        paths: Vec<PathBuf>,

        /// Override the configured conflict strategy for this run only.
        #[arg(long, value_enum)]
        strategy: Option<CliConflictStrategy>,

        /// Treat local modifications as allowed for this run only,
        /// suppressing the prompt-degrades-to-prefer-brain rule.
        #[arg(long)]
        reset: bool,
    },
    /// Export modified neurons back into their brains.
    Export {
        /// Limit to these destination paths instead of auto-detecting.
        paths: Vec<PathBuf>,

        /// Skip the interactive confirmation before exporting.
        #[arg(long)]
        force: bool,
    },
    /// Create a `.brain` descriptor at the repository root.
    InitBrain {
        /// Brain identifier.
        id: String,
    },
    /// Create a `.consumer` descriptor at the repository root.
    InitConsumer,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliConflictStrategy {
    Prompt,
    PreferBrain,
    PreferLocal,
}

impl From<CliConflictStrategy> for ConflictStrategy {
    fn from(value: CliConflictStrategy) -> Self {
        match value {
            CliConflictStrategy::Prompt => ConflictStrategy::Prompt,
            CliConflictStrategy::PreferBrain => ConflictStrategy::PreferBrain,
            CliConflictStrategy::PreferLocal => ConflictStrategy::PreferLocal,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let repo_root = std::env::current_dir().context("failed to resolve current directory")?;

    let exit_code = match run(&cli, &repo_root) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli, repo_root: &Path) -> Result<i32> {
    match &cli.command {
        Commands::Sync {
            paths,
            strategy,
            reset,
        } => cmd_sync(repo_root, paths, *strategy, *reset),
        Commands::Export { paths, force } => cmd_export(repo_root, paths, *force),
        Commands::InitBrain { id } => cmd_init_brain(repo_root, id),
        Commands::InitConsumer => cmd_init_consumer(repo_root),
    }
}

fn cmd_sync(
    repo_root: &Path,
    paths: &[PathBuf],
    strategy: Option<CliConflictStrategy>,
    reset: bool,
) -> Result<i32> {
    let descriptor_path = repo_root.join(CONSUMER_DESCRIPTOR_NAME);
    let mut consumer = ConsumerDescriptor::load(&descriptor_path)
        .with_context(|| format!("failed to load {}", descriptor_path.display()))?;

    if reset {
        consumer.policy.allow_local_modifications = true;
    }

    if !paths.is_empty() {
        let wanted: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        consumer
            .mappings
            .retain(|m| wanted.iter().any(|w| w == &m.destination));
    }

    let git = RealGitDriver::new();
    let interactive = std::io::stdin().is_terminal();
    let mut reader = BufReader::new(std::io::stdin());
    let mut writer = std::io::stdout();

    let outcomes = sync::sync_all(
        &consumer,
        repo_root,
        strategy.map(Into::into),
        interactive,
        &git,
        &mut reader,
        &mut writer,
    );

    let mut had_error = false;
    for outcome in &outcomes {
        let action = match outcome.action {
            sync::SyncAction::Added => "added",
            sync::SyncAction::Updated => "updated",
            sync::SyncAction::Unchanged => "unchanged",
            sync::SyncAction::Skipped => "skipped",
        };
        match outcome.status {
            sync::SyncStatus::Success => {
                println!(
                    "{}: {} ({}){}",
                    outcome.destination,
                    action,
                    outcome.brain_id,
                    if outcome.requirements_merged {
                        ", requirements merged"
                    } else {
                        ""
                    }
                );
            }
            sync::SyncStatus::Error => {
                had_error = true;
                println!(
                    "{}: error ({}): {}",
                    outcome.destination, outcome.brain_id, outcome.message
                );
            }
        }
    }

    let summary = sync::summarize(&outcomes);
    println!(
        "{} added, {} updated, {} unchanged, {} skipped, {} error(s)",
        summary.added, summary.updated, summary.unchanged, summary.skipped, summary.errors
    );

    Ok(if had_error { 1 } else { 0 })
}

fn cmd_export(repo_root: &Path, paths: &[PathBuf], force: bool) -> Result<i32> {
    let descriptor_path = repo_root.join(CONSUMER_DESCRIPTOR_NAME);
    let consumer = ConsumerDescriptor::load(&descriptor_path)
        .with_context(|| format!("failed to load {}", descriptor_path.display()))?;

    let git = RealGitDriver::new();

    let mappings = if paths.is_empty() {
        detector::modified_mappings(&consumer, repo_root, &git)
            .context("failed to detect modified neurons")?
    } else {
        let wanted: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        consumer
            .mappings
            .iter()
            .filter(|m| wanted.iter().any(|w| w == &m.destination))
            .cloned()
            .collect()
    };

    if mappings.is_empty() {
        println!("no modified neurons to export");
        return Ok(0);
    }

    if !force {
        print!("export {} neuron(s)? [y/N] ", mappings.len());
        std::io::stdout().flush().ok();
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer).ok();
        if answer.trim().to_lowercase() != "y" {
            info!("export cancelled by user");
            return Ok(0);
        }
    }

    let outcomes = export::export(&consumer, &mappings, repo_root, None, &git)?;

    let mut had_error = false;
    for outcome in &outcomes {
        match outcome.status {
            export::ExportStatus::Success => {
                println!(
                    "{}: {} ({} neuron(s))",
                    outcome.brain_id,
                    outcome.message,
                    outcome.exported_neurons.len()
                );
            }
            export::ExportStatus::Error => {
                had_error = true;
                println!("{}: error: {}", outcome.brain_id, outcome.message);
            }
        }
    }

    Ok(if had_error { 1 } else { 0 })
}

fn cmd_init_brain(repo_root: &Path, id: &str) -> Result<i32> {
    let path = repo_root.join(BRAIN_DESCRIPTOR_NAME);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let descriptor = BrainDescriptor {
        id: id.to_string(),
        description: None,
        export: Vec::new(),
        access: Vec::new(),
        update_policy: Default::default(),
    };
    descriptor
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("created {}", path.display());
    Ok(0)
}

fn cmd_init_consumer(repo_root: &Path) -> Result<i32> {
    let path = repo_root.join(CONSUMER_DESCRIPTOR_NAME);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let descriptor = ConsumerDescriptor {
        brains: Vec::new(),
        policy: Default::default(),
        mappings: Vec::new(),
    };
    descriptor
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("created {}", path.display());
    Ok(0)
}
