//! Plan command implementation.
//!
//! `anatprep plan` builds and resolves each participant's graph and shows
//! which steps a run would execute, without executing or persisting
//! anything.

use serde::Serialize;

use crate::cli::args::PlanArgs;
use crate::error::Result;
use crate::graph::{GraphBuilder, RuleStatus};
use crate::runner::{Engine, EngineOptions};
use crate::ui::{AnatprepTheme, Table, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::display::{plan_entries, plan_table, PlanEntry};
use super::project::Project;

/// The plan command implementation.
pub struct PlanCommand {
    project: Project,
    args: PlanArgs,
}

#[derive(Debug, Serialize)]
struct RuleEntry {
    rule: String,
    priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    status: String,
}

#[derive(Debug, Serialize)]
struct SubjectPlan {
    subject_id: String,
    graph_hash: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rules: Vec<RuleEntry>,
    steps: Vec<PlanEntry>,
}

impl PlanCommand {
    /// Create a new plan command.
    pub fn new(project: Project, args: PlanArgs) -> Self {
        Self { project, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &PlanArgs {
        &self.args
    }

    fn subject_plans(&self) -> Result<Vec<SubjectPlan>> {
        let manifest = self.project.manifest(&self.args.selection.inputs)?;
        let builder = GraphBuilder::new()?;
        let mut plans = Vec::new();

        for (subject_id, inputs) in manifest.select(&self.args.selection.participant)? {
            let (ctx, graph) = self.project.plan(&subject_id, inputs)?;

            let rules = if self.args.rules {
                builder
                    .evaluate(&ctx, inputs)
                    .into_iter()
                    .map(|d| RuleEntry {
                        rule: d.rule,
                        priority: d.priority.0,
                        group: d.group,
                        status: match d.status {
                            RuleStatus::Applied => "applied".to_string(),
                            RuleStatus::NotApplicable => "not applicable".to_string(),
                            RuleStatus::Shadowed { by } => format!("shadowed by {}", by),
                        },
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let engine = Engine::new(
                self.project.operations(),
                self.project.layout(),
                EngineOptions::for_context(&ctx),
            );
            let steps = plan_entries(&graph, &engine.preview(&graph)?);

            plans.push(SubjectPlan {
                subject_id,
                graph_hash: graph.hash(),
                rules,
                steps,
            });
        }

        Ok(plans)
    }
}

impl Command for PlanCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let plans = self.subject_plans()?;

        if self.args.json {
            let json = serde_json::to_string_pretty(&plans)
                .map_err(|e| anyhow::anyhow!("failed to serialize plan: {}", e))?;
            ui.output(&json);
            return Ok(CommandResult::success());
        }

        let theme = AnatprepTheme::detect();
        for plan in &plans {
            ui.show_header(&format!("sub-{}", plan.subject_id));

            if !plan.rules.is_empty() {
                let mut table = Table::new(&["Priority", "Rule", "Group", "Status"]);
                for rule in &plan.rules {
                    table.add_row(&[
                        rule.priority.to_string(),
                        rule.rule.clone(),
                        rule.group.clone().unwrap_or_default(),
                        rule.status.clone(),
                    ]);
                }
                ui.output(&table.render());
            }

            ui.output(&plan_table(&plan.steps, &theme).render());
            let runs = plan.steps.iter().filter(|s| s.runs()).count();
            ui.message(&format!(
                "{} of {} steps would run (graph {})",
                runs,
                plan.steps.len(),
                &plan.graph_hash[..plan.graph_hash.len().min(12)]
            ));
        }

        Ok(CommandResult::success())
    }
}
