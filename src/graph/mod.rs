//! Pipeline graph assembly and resolution.
//!
//! - [`builder`] evaluates the assembly [`rules`] into a [`Graph`]
//! - [`resolve`] binds, validates and orders it into a [`ResolvedGraph`]
//! - [`roles`] lists the canonical derivative names
//! - [`dot`] exports a resolved graph for Graphviz

pub mod builder;
pub mod dot;
pub mod fragment;
pub mod model;
pub mod resolve;
pub mod roles;
pub mod rules;

pub use builder::{describe_rule, validate_run, GraphBuilder, RuleDecision, RuleStatus};
pub use dot::to_dot;
pub use fragment::Fragment;
pub use model::{Graph, SlotRef, Source, Wire};
pub use resolve::{resolve, Binding, Edge, ResolvedGraph, ResolvedStep};
pub use rules::{AssemblyRule, RulePriority, RuleRegistry};

use crate::context::RunContext;
use crate::error::Result;
use crate::inputs::AvailableInputs;

/// Build and resolve the graph for one subject with the built-in rules.
pub fn plan(ctx: &RunContext, inputs: &AvailableInputs) -> Result<ResolvedGraph> {
    let graph = GraphBuilder::new()?.build(ctx, inputs)?;
    resolve(graph)
}
