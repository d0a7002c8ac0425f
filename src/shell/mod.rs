//! Shell command execution for external tool wrappers.

pub mod command;

pub use command::{
    detect_shell, execute_streaming, CommandOptions, CommandResult, OutputCallback, OutputLine,
};
