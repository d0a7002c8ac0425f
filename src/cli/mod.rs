//! Command-line interface for anatprep.
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations

pub mod args;
pub mod commands;

pub use args::{
    Cli, Commands, CompletionsArgs, GraphArgs, HistoryArgs, PlanArgs, RulesArgs, RunArgs,
    SelectionArgs, StatusArgs,
};
pub use commands::{Command, CommandDispatcher, CommandResult, Project};
