//! User interface components.
//!
//! - [`UserInterface`] trait for UI abstraction
//! - [`TerminalUI`] for terminal usage, [`MockUI`] for tests
//! - An `indicatif` progress bar, status styling and tables
//!
//! # Example
//!
//! ```
//! use anatprep::ui::{create_ui, OutputMode};
//!
//! let mut ui = create_ui(OutputMode::Quiet);
//! ui.message("suppressed in quiet mode");
//! ```

pub mod mock;
pub mod output;
pub mod progress;
pub mod table;
pub mod terminal;
pub mod theme;

pub use mock::{MockProgress, MockUI, ProgressLog};
pub use output::OutputMode;
pub use progress::{format_duration, format_relative_time, RunProgressBar};
pub use table::Table;
pub use terminal::{create_ui, TerminalUI};
pub use theme::{should_use_colors, AnatprepTheme};

use crate::runner::RunReport;

/// Trait for user interface interactions.
///
/// This trait allows mocking the UI in tests.
pub trait UserInterface {
    /// Get the current output mode.
    fn output_mode(&self) -> OutputMode;

    /// Write command output (tables, DOT, JSON). Printed in every mode.
    fn output(&mut self, text: &str);

    /// Display an informational message.
    fn message(&mut self, msg: &str);

    /// Display a success message.
    fn success(&mut self, msg: &str);

    /// Display a warning message.
    fn warning(&mut self, msg: &str);

    /// Display an error message.
    fn error(&mut self, msg: &str);

    /// Show a header/banner.
    fn show_header(&mut self, title: &str);

    /// Start a progress display over `total` steps.
    fn start_progress(&mut self, label: &str, total: usize) -> Box<dyn ProgressHandle>;

    /// Summarize a finished run.
    fn show_run_summary(&mut self, report: &RunReport);

    /// Check if attached to a terminal.
    fn is_interactive(&self) -> bool;
}

/// Handle for a running progress display.
pub trait ProgressHandle {
    /// Update the trailing message (e.g. the running steps).
    fn set_message(&mut self, msg: &str);

    /// Print a line without disturbing the bar.
    fn println(&mut self, line: &str);

    /// Count one more step as settled.
    fn advance(&mut self);

    /// Remove the bar.
    fn finish(&mut self);
}
