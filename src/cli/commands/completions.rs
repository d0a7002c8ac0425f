//! Shell completions generation.
//!
//! The `anatprep completions` command generates shell completion scripts.

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::Result;
use crate::ui::UserInterface;
use clap::CommandFactory;
use clap_complete::Shell;

use super::dispatcher::{Command, CommandResult};

/// The completions command implementation.
pub struct CompletionsCommand {
    args: CompletionsArgs,
}

impl CompletionsCommand {
    /// Create a new completions command.
    pub fn new(args: CompletionsArgs) -> Self {
        Self { args }
    }
}

/// Completion script for `shell`.
pub fn completion_script(shell: Shell) -> Result<String> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "anatprep", &mut buf);
    String::from_utf8(buf)
        .map_err(|e| anyhow::anyhow!("completion script is not UTF-8: {}", e).into())
}

impl Command for CompletionsCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        ui.output(&completion_script(self.args.shell)?);
        Ok(CommandResult::success())
    }
}
