//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// anatprep - anatomical MRI preprocessing orchestrator.
#[derive(Debug, Parser)]
#[command(name = "anatprep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file (overrides .anatprep/config.yml discovery)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to project root (overrides current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build, resolve and execute the pipeline for each participant
    Run(RunArgs),

    /// Show which steps would run and why
    Plan(PlanArgs),

    /// Print the resolved graph in Graphviz DOT format
    Graph(GraphArgs),

    /// Show persisted step status
    Status(StatusArgs),

    /// Show past runs
    History(HistoryArgs),

    /// List assembly rules in evaluation order
    Rules(RulesArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Input manifest and participant selection shared by several commands.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SelectionArgs {
    /// Input manifest (YAML or JSON) listing each participant's images
    #[arg(short, long, env = "ANATPREP_INPUTS", value_name = "FILE")]
    pub inputs: PathBuf,

    /// Process only these participants (comma-separated, `sub-` optional)
    #[arg(long, value_delimiter = ',', value_name = "ID")]
    pub participant: Vec<String>,
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Force re-run of specified steps (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_name = "STEP")]
    pub force: Vec<String>,

    /// Report what would run without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Override the CPU thread budget
    #[arg(long, value_name = "N")]
    pub nprocs: Option<usize>,

    /// Override the memory budget (GB)
    #[arg(long, value_name = "GB")]
    pub mem_gb: Option<f64>,
}

/// Arguments for the `plan` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Also list rule decisions
    #[arg(long)]
    pub rules: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `graph` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct GraphArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StatusArgs {
    /// Participant to show
    #[arg(value_name = "ID")]
    pub participant: String,

    /// Show status for specific step
    #[arg(long)]
    pub step: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `history` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct HistoryArgs {
    /// Participant to show
    #[arg(value_name = "ID")]
    pub participant: String,

    /// Number of runs to show
    #[arg(long)]
    pub limit: Option<usize>,

    /// Show steps of each run
    #[arg(long)]
    pub detail: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `rules` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RulesArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
