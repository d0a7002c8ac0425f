//! Status command implementation.
//!
//! `anatprep status <participant>` shows the persisted execution state of
//! one participant.

use std::time::Duration;

use crate::cli::args::StatusArgs;
use crate::context::subject_label;
use crate::error::Result;
use crate::state::{ExecutionState, StepRecord};
use crate::ui::{format_duration, format_relative_time, AnatprepTheme, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::display::show_step_status;
use super::project::Project;

/// The status command implementation.
pub struct StatusCommand {
    project: Project,
    args: StatusArgs,
}

impl StatusCommand {
    /// Create a new status command.
    pub fn new(project: Project, args: StatusArgs) -> Self {
        Self { project, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &StatusArgs {
        &self.args
    }

    fn detail(record: &StepRecord) -> String {
        let mut parts = Vec::new();
        if let Some(ms) = record.duration_ms() {
            parts.push(format_duration(Duration::from_millis(ms)));
        }
        if let Some(message) = record.message.as_deref().and_then(|m| m.lines().next()) {
            parts.push(message.to_string());
        }
        parts.join(" · ")
    }
}

impl Command for StatusCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let subject_id = self.args.participant.trim_start_matches("sub-");
        let path = self.project.layout().state_file(subject_id);

        let Some(state) = ExecutionState::load(&path)? else {
            ui.message(&format!("No runs recorded for {}.", subject_label(subject_id)));
            return Ok(CommandResult::success());
        };

        let records: Vec<(&String, &StepRecord)> = match &self.args.step {
            Some(step) => match state.steps.get_key_value(step) {
                Some(entry) => vec![entry],
                None => {
                    ui.error(&format!(
                        "Step '{}' is not part of the last graph for {}",
                        step,
                        subject_label(subject_id)
                    ));
                    return Ok(CommandResult::failure(1));
                }
            },
            None => state.steps.iter().collect(),
        };

        if self.args.json {
            let selected: std::collections::BTreeMap<&String, &StepRecord> =
                records.into_iter().collect();
            let json = serde_json::json!({
                "subject_id": state.subject_id,
                "graph_hash": state.graph_hash,
                "updated": state.updated,
                "complete": state.is_complete(),
                "counts": state.counts(),
                "steps": selected,
            });
            let text = serde_json::to_string_pretty(&json)
                .map_err(|e| anyhow::anyhow!("failed to serialize status: {}", e))?;
            ui.output(&text);
            return Ok(CommandResult::success());
        }

        let theme = AnatprepTheme::detect();
        ui.show_header(&subject_label(&state.subject_id));
        if let Some(updated) = state.updated {
            ui.message(&format!(
                "Last update: {} ({})",
                updated.format("%Y-%m-%d %H:%M"),
                format_relative_time(updated)
            ));
        }

        for (step, record) in records {
            show_step_status(ui, &theme, step, record.status, &Self::detail(record));
        }

        let counts = state.counts();
        ui.message("");
        ui.message(&format!(
            "{} of {} steps satisfied{}",
            counts.done + counts.skipped,
            counts.total(),
            if state.is_complete() { "" } else { "; run again to resume" }
        ));

        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnatprepConfig;
    use crate::state::StepStatus;
    use crate::ui::MockUI;
    use tempfile::TempDir;

    fn args(step: Option<&str>, json: bool) -> StatusArgs {
        StatusArgs {
            participant: "sub-01".into(),
            step: step.map(String::from),
            json,
        }
    }

    fn setup(temp: &TempDir) -> Project {
        let project = Project::new(temp.path(), AnatprepConfig::default());
        let mut state = ExecutionState::new("01", "abc123");
        state.transition("bias_correct", StepStatus::Done, None);
        state.transition(
            "brain_extraction",
            StepStatus::Failed,
            Some("command exited with code Some(1)".into()),
        );
        state.transition("tissue_segmentation", StepStatus::Blocked, None);
        state.save(&project.layout().state_file("01")).unwrap();
        project
    }

    #[test]
    fn no_state_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let project = Project::new(temp.path(), AnatprepConfig::default());
        let mut ui = MockUI::new();

        let result = StatusCommand::new(project, args(None, false))
            .execute(&mut ui)
            .unwrap();
        assert!(result.success);
        assert!(ui.has_text("No runs recorded for sub-01"));
    }

    #[test]
    fn shows_every_step() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();

        StatusCommand::new(setup(&temp), args(None, false))
            .execute(&mut ui)
            .unwrap();

        assert_eq!(ui.headers(), ["sub-01"]);
        assert!(ui.errors().iter().any(|e| e.contains("brain_extraction")));
        assert!(ui.warnings().iter().any(|w| w.contains("tissue_segmentation")));
        assert!(ui.has_text("1 of 3 steps satisfied; run again to resume"));
    }

    #[test]
    fn json_for_one_step() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();

        StatusCommand::new(setup(&temp), args(Some("bias_correct"), true))
            .execute(&mut ui)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&ui.outputs()[0]).unwrap();
        assert_eq!(value["graph_hash"], "abc123");
        assert_eq!(value["steps"]["bias_correct"]["status"], "done");
        assert!(value["steps"].get("brain_extraction").is_none());
        assert_eq!(value["counts"]["failed"], 1);
    }

    #[test]
    fn unknown_step_fails() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();

        let result = StatusCommand::new(setup(&temp), args(Some("nope"), false))
            .execute(&mut ui)
            .unwrap();
        assert_eq!(result.exit_code, 1);
    }
}
