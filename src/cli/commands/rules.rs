//! Rules command implementation.
//!
//! `anatprep rules` lists the built-in assembly rules in evaluation order.

use serde::Serialize;

use crate::cli::args::RulesArgs;
use crate::error::Result;
use crate::graph::RuleRegistry;
use crate::ui::{Table, UserInterface};

use super::dispatcher::{Command, CommandResult};

/// The rules command implementation.
pub struct RulesCommand {
    args: RulesArgs,
}

#[derive(Debug, Serialize)]
struct RuleListing<'a> {
    priority: u32,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    description: &'a str,
}

impl RulesCommand {
    /// Create a new rules command.
    pub fn new(args: RulesArgs) -> Self {
        Self { args }
    }
}

impl Command for RulesCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let registry = RuleRegistry::with_builtins()?;
        let listings: Vec<RuleListing<'_>> = registry
            .iter()
            .map(|rule| RuleListing {
                priority: rule.priority().0,
                name: rule.name(),
                group: rule.exclusive_group(),
                description: rule.description(),
            })
            .collect();

        if self.args.json {
            let json = serde_json::to_string_pretty(&listings)
                .map_err(|e| anyhow::anyhow!("failed to serialize rules: {}", e))?;
            ui.output(&json);
            return Ok(CommandResult::success());
        }

        let mut table = Table::new(&["Priority", "Rule", "Group", "Description"]);
        for listing in &listings {
            table.add_row(&[
                listing.priority.to_string().as_str(),
                listing.name,
                listing.group.unwrap_or(""),
                listing.description,
            ]);
        }
        ui.output(&table.render());
        ui.message("Rules sharing a group are alternatives; the first applicable one wins.");

        Ok(CommandResult::success())
    }
}
