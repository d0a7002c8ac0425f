//! Graph assembly from prioritised rules.
//!
//! [`GraphBuilder::build`] validates the run options against the subject's
//! inputs, evaluates every registered rule in priority order and merges the
//! fragments of the applicable ones. Within an exclusive group the first
//! applicable rule wins and the remaining members are recorded as shadowed.
//! The builder never touches the filesystem.

use crate::config::ReconMethod;
use crate::context::RunContext;
use crate::error::{AnatprepError, Result};
use crate::graph::model::Graph;
use crate::graph::rules::{AssemblyRule, RulePriority, RuleRegistry};
use crate::inputs::AvailableInputs;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleStatus {
    /// The rule contributed its fragment.
    Applied,
    /// The rule's predicate was false.
    NotApplicable,
    /// An earlier rule of the same exclusive group already applied.
    Shadowed {
        /// Winning rule.
        by: String,
    },
}

/// Rule evaluation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDecision {
    /// Rule name.
    pub rule: String,
    /// Rule priority.
    pub priority: RulePriority,
    /// Exclusive group, if any.
    pub group: Option<String>,
    /// What happened.
    pub status: RuleStatus,
}

/// Builds per-subject pipeline graphs.
pub struct GraphBuilder {
    registry: RuleRegistry,
}

impl GraphBuilder {
    /// Builder over the built-in rules.
    pub fn new() -> Result<Self> {
        Ok(Self::with_registry(RuleRegistry::with_builtins()?))
    }

    /// Builder over a custom rule set.
    pub fn with_registry(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    /// Registered rules.
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Decide which rules contribute, without building anything.
    pub fn evaluate(&self, ctx: &RunContext, inputs: &AvailableInputs) -> Vec<RuleDecision> {
        let mut winners: HashMap<&str, &str> = HashMap::new();
        let mut decisions = Vec::with_capacity(self.registry.len());

        for rule in self.registry.iter() {
            let group = rule.exclusive_group();
            let status = match group.and_then(|g| winners.get(g)) {
                Some(winner) => RuleStatus::Shadowed {
                    by: winner.to_string(),
                },
                None if rule.applies(ctx, inputs) => {
                    if let Some(g) = group {
                        winners.insert(g, rule.name());
                    }
                    RuleStatus::Applied
                }
                None => RuleStatus::NotApplicable,
            };

            debug!(
                "Rule {} (priority {}): {:?}",
                rule.name(),
                rule.priority(),
                status
            );

            decisions.push(RuleDecision {
                rule: rule.name().to_string(),
                priority: rule.priority(),
                group: group.map(String::from),
                status,
            });
        }

        decisions
    }

    /// Assemble the graph for one subject.
    ///
    /// # Errors
    ///
    /// `Configuration` or `UnsupportedCombination` when the options cannot
    /// be satisfied with the available inputs, and `DuplicateStep` when two
    /// rules declare the same step.
    pub fn build(&self, ctx: &RunContext, inputs: &AvailableInputs) -> Result<Graph> {
        validate_run(ctx, inputs)?;

        let mut graph = Graph::new(ctx.subject_id.clone(), ctx.template_vars());
        let decisions = self.evaluate(ctx, inputs);

        for decision in decisions
            .iter()
            .filter(|d| d.status == RuleStatus::Applied)
        {
            let Some(rule) = self.registry.get(&decision.rule) else {
                continue;
            };
            let fragment = rule.fragment(ctx, inputs)?;
            debug!(
                "Rule {} contributes {} step(s)",
                rule.name(),
                fragment.step_ids().count()
            );
            graph.add_fragment(rule.name(), fragment)?;
        }

        debug!(
            "Built graph for sub-{} with {} steps",
            ctx.subject_id,
            graph.len()
        );
        Ok(graph)
    }
}

/// Check that the run options can be satisfied for this subject.
pub fn validate_run(ctx: &RunContext, inputs: &AvailableInputs) -> Result<()> {
    let config_error = |message: String| AnatprepError::Configuration {
        subject: ctx.subject_id.clone(),
        message,
    };

    if inputs.t1w.is_empty() {
        return Err(config_error("no T1w image available".to_string()));
    }

    let spaces = ctx
        .template_spaces()
        .map_err(|bad| config_error(format!("invalid output space '{}'", bad)))?;
    if let Some(surface) = spaces.iter().find(|s| s.is_surface()) {
        return Err(config_error(format!(
            "'{}' is a surface space; request grayordinates with cifti_output",
            surface
        )));
    }

    let wants_reuse = ctx.recon.is_enabled() && ctx.reuse_derivatives && !ctx.force_recompute;
    if let Some(dir) = inputs.freesurfer_derivatives() {
        if wants_reuse && !inputs.derivatives.freesurfer_present {
            return Err(config_error(format!(
                "FreeSurfer derivatives requested for reuse but '{}' does not exist",
                dir.display()
            )));
        }
    }

    if ctx.longitudinal && ctx.sessions.len() < 2 {
        return Err(AnatprepError::UnsupportedCombination {
            message: format!(
                "longitudinal processing needs at least two sessions, sub-{} has {}",
                ctx.subject_id,
                ctx.sessions.len()
            ),
        });
    }

    if ctx.cifti.is_some() && !ctx.recon.is_enabled() {
        return Err(AnatprepError::UnsupportedCombination {
            message: "CIFTI output requires surface reconstruction".to_string(),
        });
    }

    if ctx.recon == ReconMethod::FastSurfer && ctx.longitudinal {
        return Err(AnatprepError::UnsupportedCombination {
            message: "FastSurfer does not support longitudinal processing".to_string(),
        });
    }

    if ctx.use_t2w
        && ctx.use_flair
        && inputs.t2w_image().is_some()
        && inputs.flair_image().is_some()
        && ctx.recon == ReconMethod::FreeSurfer
    {
        return Err(AnatprepError::UnsupportedCombination {
            message: "pial refinement with both T2w and FLAIR requested; disable one".to_string(),
        });
    }

    Ok(())
}

/// Names of rules as `priority name [group]`, for listings.
pub fn describe_rule(rule: &dyn AssemblyRule) -> String {
    match rule.exclusive_group() {
        Some(group) => format!("{} {} [{}]", rule.priority(), rule.name(), group),
        None => format!("{} {}", rule.priority(), rule.name()),
    }
}
