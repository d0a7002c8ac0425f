//! Terminal UI.

use console::Term;
use std::io::Write;
use std::time::Duration;

use crate::runner::RunReport;
use crate::state::StepStatus;

use super::progress::{format_duration, RunProgressBar};
use super::{AnatprepTheme, OutputMode, ProgressHandle, UserInterface};

/// Writes to the terminal with `console` styling.
///
/// Status goes to stdout, errors to stderr.
pub struct TerminalUI {
    out: Term,
    err: Term,
    theme: AnatprepTheme,
    mode: OutputMode,
}

impl TerminalUI {
    /// Create a terminal UI.
    pub fn new(mode: OutputMode) -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            theme: AnatprepTheme::detect(),
            mode,
        }
    }
}

impl UserInterface for TerminalUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn output(&mut self, text: &str) {
        writeln!(self.out, "{}", text.trim_end_matches('\n')).ok();
    }

    fn message(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "{}", msg).ok();
        }
    }

    fn success(&mut self, msg: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "{}", self.theme.format_success(msg)).ok();
        }
    }

    fn warning(&mut self, msg: &str) {
        writeln!(self.err, "{}", self.theme.format_warning(msg)).ok();
    }

    fn error(&mut self, msg: &str) {
        writeln!(self.err, "{}", self.theme.format_error(msg)).ok();
    }

    fn show_header(&mut self, title: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "\n{}\n", self.theme.format_header(title)).ok();
        }
    }

    fn start_progress(&mut self, label: &str, total: usize) -> Box<dyn ProgressHandle> {
        if self.mode.shows_progress() && self.out.is_term() {
            Box::new(RunProgressBar::new(label, total))
        } else {
            Box::new(RunProgressBar::hidden())
        }
    }

    fn show_run_summary(&mut self, report: &RunReport) {
        let counts = report.counts();
        let duration = format_duration(Duration::from_millis(report.duration_ms()));
        let line = format!(
            "sub-{}: {} done {} {} skipped {} {} failed {} {} blocked {}",
            report.subject_id,
            counts.done,
            self.theme.dim.apply_to("·"),
            counts.skipped,
            self.theme.dim.apply_to("·"),
            counts.failed,
            self.theme.dim.apply_to("·"),
            counts.blocked,
            self.theme.duration.apply_to(format!("({})", duration)),
        );

        if report.success() {
            writeln!(self.out, "{}", self.theme.format_success(&line)).ok();
        } else if report.interrupted {
            writeln!(
                self.err,
                "{}",
                self.theme.format_warning(&format!("{} (interrupted)", line))
            )
            .ok();
        } else {
            writeln!(self.err, "{}", self.theme.format_error(&line)).ok();
        }

        for outcome in report
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
        {
            let message = outcome.message.as_deref().unwrap_or("");
            writeln!(
                self.err,
                "  {}",
                self.theme
                    .format_step_line(&outcome.step, outcome.status, "")
            )
            .ok();
            for detail in message.lines() {
                writeln!(self.err, "      {}", self.theme.dim.apply_to(detail)).ok();
            }
        }

        if self.mode.shows_step_detail() && !report.outputs.is_empty() {
            writeln!(self.out, "\n  {}", self.theme.key.apply_to("Derivatives:")).ok();
            for (role, output) in &report.outputs {
                writeln!(
                    self.out,
                    "    {:<28} {}",
                    role,
                    self.theme.dim.apply_to(output.path.display())
                )
                .ok();
            }
        }
    }

    fn is_interactive(&self) -> bool {
        self.out.is_term()
    }
}

/// Create the UI for the current process.
pub fn create_ui(mode: OutputMode) -> Box<dyn UserInterface> {
    Box::new(TerminalUI::new(mode))
}
