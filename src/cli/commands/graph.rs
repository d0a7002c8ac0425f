//! Graph command implementation.
//!
//! `anatprep graph` prints each selected participant's resolved graph in
//! Graphviz DOT format.

use crate::cli::args::GraphArgs;
use crate::error::Result;
use crate::graph::to_dot;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::project::Project;

/// The graph command implementation.
pub struct GraphCommand {
    project: Project,
    args: GraphArgs,
}

impl GraphCommand {
    /// Create a new graph command.
    pub fn new(project: Project, args: GraphArgs) -> Self {
        Self { project, args }
    }
}

impl Command for GraphCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let manifest = self.project.manifest(&self.args.selection.inputs)?;

        for (subject_id, inputs) in manifest.select(&self.args.selection.participant)? {
            let (_, graph) = self.project.plan(&subject_id, inputs)?;
            ui.output(&to_dot(&graph));
        }

        Ok(CommandResult::success())
    }
}
