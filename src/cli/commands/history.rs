//! History command implementation.
//!
//! `anatprep history <participant>` shows past runs, newest first.

use std::time::Duration;

use crate::cli::args::HistoryArgs;
use crate::context::subject_label;
use crate::error::Result;
use crate::state::{RunHistory, RunRecord, RunStatus};
use crate::ui::{format_duration, format_relative_time, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::project::Project;

const DEFAULT_LIMIT: usize = 10;

/// The history command implementation.
pub struct HistoryCommand {
    project: Project,
    args: HistoryArgs,
}

impl HistoryCommand {
    /// Create a new history command.
    pub fn new(project: Project, args: HistoryArgs) -> Self {
        Self { project, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &HistoryArgs {
        &self.args
    }

    /// Format a single run entry line.
    fn format_run_line(run: &RunRecord) -> String {
        let status = match run.status {
            RunStatus::Success => "[ok]",
            RunStatus::Failed => "[FAIL]",
            RunStatus::Interrupted => "[int]",
        };

        format!(
            "{} {} ({}) - {} run, {} skipped, {} failed, {} blocked ({})",
            status,
            format_relative_time(run.timestamp),
            run.timestamp.format("%Y-%m-%d %H:%M"),
            run.steps_run.len(),
            run.steps_skipped.len(),
            run.steps_failed.len(),
            run.steps_blocked.len(),
            format_duration(Duration::from_millis(run.duration_ms))
        )
    }

    /// Show detailed info for a run.
    fn show_run_detail(ui: &mut dyn UserInterface, run: &RunRecord) {
        let groups = [
            ("Ran", &run.steps_run),
            ("Skipped", &run.steps_skipped),
            ("Failed", &run.steps_failed),
            ("Blocked", &run.steps_blocked),
        ];
        for (label, steps) in groups {
            if !steps.is_empty() {
                ui.message(&format!("    {}: {}", label, steps.join(", ")));
            }
        }
    }
}

impl Command for HistoryCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let subject_id = self.args.participant.trim_start_matches("sub-");
        let history = RunHistory::load(&self.project.layout().history_file(subject_id))?;
        let runs = history.recent(self.args.limit.unwrap_or(DEFAULT_LIMIT));

        if self.args.json {
            let json = serde_json::to_string_pretty(runs)
                .map_err(|e| anyhow::anyhow!("failed to serialize history: {}", e))?;
            ui.output(&json);
            return Ok(CommandResult::success());
        }

        if runs.is_empty() {
            ui.message(&format!("No run history for {}.", subject_label(subject_id)));
            return Ok(CommandResult::success());
        }

        ui.show_header(&format!("Run history of {}", subject_label(subject_id)));

        for run in runs {
            let line = Self::format_run_line(run);
            match run.status {
                RunStatus::Success => ui.success(&line),
                RunStatus::Failed => ui.error(&line),
                RunStatus::Interrupted => ui.warning(&line),
            }

            if self.args.detail {
                Self::show_run_detail(ui, run);
            }
        }

        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnatprepConfig;
    use crate::state::RunHistoryBuilder;
    use crate::ui::MockUI;
    use tempfile::TempDir;

    fn args(limit: Option<usize>, detail: bool, json: bool) -> HistoryArgs {
        HistoryArgs {
            participant: "01".into(),
            limit,
            detail,
            json,
        }
    }

    fn setup(temp: &TempDir) -> Project {
        let project = Project::new(temp.path(), AnatprepConfig::default());
        let mut history = RunHistory::default();

        let mut first = RunHistoryBuilder::start("01", "abc");
        first.step_run("bias_correct");
        first.step_failed("brain_extraction");
        first.step_blocked("tissue_segmentation");
        history.record(first.finish(false), 20);

        let mut second = RunHistoryBuilder::start("01", "abc");
        second.step_skipped("bias_correct");
        second.step_run("brain_extraction");
        second.step_run("tissue_segmentation");
        history.record(second.finish(false), 20);

        history
            .save(&project.layout().history_file("01"))
            .unwrap();
        project
    }

    #[test]
    fn history_no_runs() {
        let temp = TempDir::new().unwrap();
        let project = Project::new(temp.path(), AnatprepConfig::default());
        let mut ui = MockUI::new();

        let result = HistoryCommand::new(project, args(None, false, false))
            .execute(&mut ui)
            .unwrap();

        assert!(result.success);
        assert!(ui.has_text("No run history for sub-01"));
    }

    #[test]
    fn newest_run_first() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();

        HistoryCommand::new(setup(&temp), args(None, false, false))
            .execute(&mut ui)
            .unwrap();

        assert_eq!(ui.successes().len(), 1);
        assert_eq!(ui.errors().len(), 1);
        assert!(ui.successes()[0].contains("2 run, 1 skipped"));
    }

    #[test]
    fn limit_and_detail() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();

        HistoryCommand::new(setup(&temp), args(Some(1), true, false))
            .execute(&mut ui)
            .unwrap();

        assert!(ui.errors().is_empty());
        assert!(ui
            .messages()
            .iter()
            .any(|m| m.contains("Ran: brain_extraction, tissue_segmentation")));
        assert!(ui.messages().iter().any(|m| m.contains("Skipped: bias_correct")));
    }

    #[test]
    fn json_output() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();

        HistoryCommand::new(setup(&temp), args(None, false, true))
            .execute(&mut ui)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&ui.outputs()[0]).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["status"], "failed");
    }
}
