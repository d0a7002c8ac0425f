//! Mock UI implementation for testing.
//!
//! `MockUI` implements [`UserInterface`] and captures every interaction for
//! later assertion.
//!
//! # Example
//!
//! ```
//! use anatprep::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.message("Planning sub-01");
//! ui.success("Done");
//!
//! assert!(ui.messages().contains(&"Planning sub-01".to_string()));
//! assert!(ui.successes().contains(&"Done".to_string()));
//! ```

use std::sync::{Arc, Mutex};

use crate::runner::RunReport;

use super::{OutputMode, ProgressHandle, UserInterface};

/// Captures progress lines written through a [`MockProgress`].
#[derive(Debug, Default, Clone)]
pub struct ProgressLog {
    /// Lines printed above the bar.
    pub lines: Vec<String>,
    /// Number of `advance` calls.
    pub advanced: usize,
    /// Whether `finish` was called.
    pub finished: bool,
}

/// Progress handle recording into a shared [`ProgressLog`].
#[derive(Debug, Clone)]
pub struct MockProgress {
    log: Arc<Mutex<ProgressLog>>,
}

impl ProgressHandle for MockProgress {
    fn set_message(&mut self, _msg: &str) {}

    fn println(&mut self, line: &str) {
        if let Ok(mut log) = self.log.lock() {
            log.lines.push(line.to_string());
        }
    }

    fn advance(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.advanced += 1;
        }
    }

    fn finish(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.finished = true;
        }
    }
}

/// Mock UI implementation for testing.
#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    outputs: Vec<String>,
    messages: Vec<String>,
    successes: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
    headers: Vec<String>,
    progress: Vec<(String, usize, Arc<Mutex<ProgressLog>>)>,
    summaries: Vec<(String, i32)>,
}

impl MockUI {
    /// Create a MockUI in normal output mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a MockUI with a specific output mode.
    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Raw data written with `output`.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// `(subject_id, exit_code)` of every summarized run.
    pub fn summaries(&self) -> &[(String, i32)] {
        &self.summaries
    }

    /// Label, total and captured log of every progress bar started.
    pub fn progress(&self) -> Vec<(String, usize, ProgressLog)> {
        self.progress
            .iter()
            .map(|(label, total, log)| {
                let log = log.lock().map(|l| l.clone()).unwrap_or_default();
                (label.clone(), *total, log)
            })
            .collect()
    }

    /// Whether any captured text contains `needle`.
    pub fn has_text(&self, needle: &str) -> bool {
        self.outputs
            .iter()
            .chain(&self.messages)
            .chain(&self.successes)
            .chain(&self.warnings)
            .chain(&self.errors)
            .chain(&self.headers)
            .any(|s| s.contains(needle))
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn output(&mut self, text: &str) {
        self.outputs.push(text.to_string());
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.successes.push(msg.to_string());
    }

    fn warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn show_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    fn start_progress(&mut self, label: &str, total: usize) -> Box<dyn ProgressHandle> {
        let log = Arc::new(Mutex::new(ProgressLog::default()));
        self.progress
            .push((label.to_string(), total, Arc::clone(&log)));
        Box::new(MockProgress { log })
    }

    fn show_run_summary(&mut self, report: &RunReport) {
        self.summaries
            .push((report.subject_id.clone(), report.exit_code()));
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
