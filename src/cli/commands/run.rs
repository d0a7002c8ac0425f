//! Run command implementation.
//!
//! `anatprep run` plans every selected participant first, so configuration
//! and graph errors abort before any step executes, then runs the
//! participants one after another.

use std::time::Instant;

use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::config::validate;
use crate::context::RunContext;
use crate::error::Result;
use crate::graph::ResolvedGraph;
use crate::runner::{Engine, EngineEvent, EngineOptions};
use crate::state::StepStatus;
use crate::ui::{format_duration, AnatprepTheme, ProgressHandle, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::display::{plan_entries, plan_table};
use super::project::Project;

/// The run command implementation.
pub struct RunCommand {
    project: Project,
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(project: Project, args: RunArgs) -> Self {
        Self { project, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    /// Project with the command-line resource overrides applied.
    fn effective_project(&self) -> Result<Project> {
        let mut project = self.project.clone();
        let settings = &mut project.config_mut().settings;
        if let Some(nprocs) = self.args.nprocs {
            settings.nprocs = Some(nprocs);
            if settings.omp_nthreads.is_some_and(|omp| omp > nprocs) {
                settings.omp_nthreads = Some(nprocs);
            }
        }
        if let Some(mem_gb) = self.args.mem_gb {
            settings.mem_gb = Some(mem_gb);
        }
        validate(project.config())?;
        Ok(project)
    }

    fn engine_options(&self, project: &Project, ctx: &RunContext) -> EngineOptions {
        let mut options = EngineOptions::for_context(ctx);
        options.force = self.args.force.iter().cloned().collect();
        options.dry_run = self.args.dry_run;
        options.history_retention = project.config().settings.history_retention;
        options
    }

    fn warn_unknown_forced(&self, ui: &mut dyn UserInterface, graph: &ResolvedGraph) {
        for step in &self.args.force {
            if graph.step(step).is_none() {
                ui.warning(&format!(
                    "--force {}: no such step in the graph for sub-{}",
                    step, graph.subject_id
                ));
            }
        }
    }

    fn preview(
        &self,
        ui: &mut dyn UserInterface,
        engine: &Engine,
        graph: &ResolvedGraph,
    ) -> Result<()> {
        let theme = AnatprepTheme::detect();
        let entries = plan_entries(graph, &engine.preview(graph)?);
        let runs = entries.iter().filter(|e| e.runs()).count();

        ui.show_header(&format!("sub-{} (dry run)", graph.subject_id));
        ui.output(&plan_table(&entries, &theme).render());
        ui.message(&format!(
            "{} of {} steps would run",
            runs,
            entries.len()
        ));
        Ok(())
    }

    fn execute_graph(
        &self,
        ui: &mut dyn UserInterface,
        engine: &Engine,
        graph: &ResolvedGraph,
    ) -> Result<(i32, bool)> {
        let theme = AnatprepTheme::detect();
        let verbose = ui.output_mode().shows_step_detail();

        ui.show_header(&format!("sub-{} ({} steps)", graph.subject_id, graph.len()));
        let mut progress = ui.start_progress(&format!("sub-{}", graph.subject_id), graph.len());

        let report = engine.run_with_progress(graph, |event| {
            on_event(progress.as_mut(), &theme, verbose, event);
        });
        progress.finish();
        let report = report?;

        ui.show_run_summary(&report);
        Ok((report.exit_code(), report.interrupted))
    }
}

fn on_event(
    progress: &mut dyn ProgressHandle,
    theme: &AnatprepTheme,
    verbose: bool,
    event: EngineEvent<'_>,
) {
    match event {
        EngineEvent::Started { .. } => {}
        EngineEvent::Skipped { step } => {
            if verbose {
                progress.println(&theme.format_step_line(step, StepStatus::Skipped, "up to date"));
            }
            progress.advance();
        }
        EngineEvent::Dispatched { step, granted, running } => {
            progress.set_message(step);
            if verbose {
                progress.println(&theme.format_step_line(
                    step,
                    StepStatus::Running,
                    &format!("{} ({} running)", granted, running),
                ));
            }
        }
        EngineEvent::Finished { step, duration } => {
            progress.println(&theme.format_step_line(
                step,
                StepStatus::Done,
                &format_duration(duration),
            ));
            progress.advance();
        }
        EngineEvent::Failed { step, message } => {
            let first = message.lines().next().unwrap_or("");
            progress.println(&theme.format_step_line(step, StepStatus::Failed, first));
            progress.advance();
        }
        EngineEvent::Blocked { step, by } => {
            progress.println(&theme.format_step_line(
                step,
                StepStatus::Blocked,
                &format!("blocked by {}", by),
            ));
            progress.advance();
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.effective_project()?;
        let manifest = project.manifest(&self.args.selection.inputs)?;
        let selected = manifest.select(&self.args.selection.participant)?;

        if selected.is_empty() {
            ui.warning("The input manifest lists no participants.");
            return Ok(CommandResult::success());
        }

        let mut planned = Vec::with_capacity(selected.len());
        for (subject_id, inputs) in &selected {
            planned.push(project.plan(subject_id, inputs)?);
        }

        let mut exit_code = 0;
        for (ctx, graph) in &planned {
            self.warn_unknown_forced(ui, graph);
            let engine = Engine::new(
                project.operations(),
                project.layout(),
                self.engine_options(&project, ctx),
            );

            if self.args.dry_run {
                self.preview(ui, &engine, graph)?;
                continue;
            }

            let started = Instant::now();
            let (code, interrupted) = self.execute_graph(ui, &engine, graph)?;
            info!(
                "sub-{} finished in {}",
                graph.subject_id,
                format_duration(started.elapsed())
            );
            exit_code = exit_code.max(code);

            if interrupted {
                warn!("Interrupted; remaining participants not started");
                ui.warning("Interrupted; remaining participants were not started.");
                break;
            }
        }

        Ok(CommandResult::from_exit_code(exit_code))
    }
}
