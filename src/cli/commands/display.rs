//! Shared display helpers for skip decisions and step status.
//!
//! Used by `run --dry-run`, `plan` and `status`.

use serde::Serialize;

use crate::cache::SkipDecision;
use crate::graph::ResolvedGraph;
use crate::runner::PlannedStep;
use crate::state::StepStatus;
use crate::ui::{AnatprepTheme, Table, UserInterface};

/// One row of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub step: String,
    pub rule: String,
    pub operation: String,
    /// `run` or `skip`.
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub depends_on: Vec<String>,
}

impl PlanEntry {
    /// Whether the step would execute.
    pub fn runs(&self) -> bool {
        self.action == "run"
    }
}

/// Join skip decisions with graph metadata, in resolved order.
pub fn plan_entries(graph: &ResolvedGraph, planned: &[PlannedStep]) -> Vec<PlanEntry> {
    planned
        .iter()
        .filter_map(|p| {
            let step = graph.step(&p.step)?;
            let (action, reason) = match &p.decision {
                SkipDecision::Skip(_) => ("skip", None),
                SkipDecision::Run(reason) => ("run", Some(reason.to_string())),
            };
            Some(PlanEntry {
                step: p.step.clone(),
                rule: step.rule.clone(),
                operation: step.descriptor.operation.name.clone(),
                action,
                reason,
                depends_on: step.dependencies.clone(),
            })
        })
        .collect()
}

/// Render plan rows as a table.
pub fn plan_table(entries: &[PlanEntry], theme: &AnatprepTheme) -> Table {
    let mut table = Table::new(&["Step", "Operation", "Action", "Reason"]);
    for entry in entries {
        let action = if entry.runs() {
            theme.highlight.apply_to("run").to_string()
        } else {
            theme.dim.apply_to("skip").to_string()
        };
        table.add_row(&[
            entry.step.as_str(),
            entry.operation.as_str(),
            action.as_str(),
            entry.reason.as_deref().unwrap_or(""),
        ]);
    }
    table
}

/// Print one step's status line, styled by severity.
pub fn show_step_status(
    ui: &mut dyn UserInterface,
    theme: &AnatprepTheme,
    step: &str,
    status: StepStatus,
    detail: &str,
) {
    let line = format!("  {}", theme.format_step_line(step, status, detail));
    match status {
        StepStatus::Failed => ui.error(&line),
        StepStatus::Blocked => ui.warning(&line),
        _ => ui.message(&line),
    }
}
