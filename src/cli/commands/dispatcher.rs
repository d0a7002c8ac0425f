//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::path::{Path, PathBuf};

use crate::cli::args::{Cli, Commands};
use crate::error::Result;
use crate::ui::UserInterface;

use super::project::Project;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
pub trait Command {
    /// Execute the command.
    ///
    /// # Returns
    ///
    /// A [`CommandResult`] indicating success/failure and exit code. Errors
    /// that abort the command map to an exit code through
    /// [`AnatprepError::exit_code`](crate::error::AnatprepError::exit_code).
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }

    /// Result carrying a run's exit code.
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            Self::success()
        } else {
            Self::failure(exit_code)
        }
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    project_root: PathBuf,
    config_override: Option<PathBuf>,
}

impl CommandDispatcher {
    /// Create a new dispatcher for the given project root.
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            config_override: None,
        }
    }

    /// Load configuration from an explicit file instead of discovering it.
    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config_override = config;
        self
    }

    /// Get the project root path.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn project(&self) -> Result<Project> {
        Project::load(&self.project_root, self.config_override.as_deref())
    }

    /// Dispatch and execute a command.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        match &cli.command {
            Commands::Run(args) => {
                super::run::RunCommand::new(self.project()?, args.clone()).execute(ui)
            }
            Commands::Plan(args) => {
                super::plan::PlanCommand::new(self.project()?, args.clone()).execute(ui)
            }
            Commands::Graph(args) => {
                super::graph::GraphCommand::new(self.project()?, args.clone()).execute(ui)
            }
            Commands::Status(args) => {
                super::status::StatusCommand::new(self.project()?, args.clone()).execute(ui)
            }
            Commands::History(args) => {
                super::history::HistoryCommand::new(self.project()?, args.clone()).execute(ui)
            }
            Commands::Rules(args) => super::rules::RulesCommand::new(args.clone()).execute(ui),
            Commands::Completions(args) => {
                super::completions::CompletionsCommand::new(args.clone()).execute(ui)
            }
        }
    }
}
