//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! Commands are dispatched via [`CommandDispatcher`], which loads the
//! [`Project`] configuration once and routes CLI subcommands to their
//! implementations.

pub mod completions;
pub mod dispatcher;
pub mod display;
pub mod graph;
pub mod history;
pub mod plan;
pub mod project;
pub mod rules;
pub mod run;
pub mod status;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
pub use project::Project;
