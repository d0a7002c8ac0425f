//! Assembly rules.
//!
//! Each rule inspects the [`RunContext`] and the available inputs and, when
//! it applies, contributes a [`Fragment`]. Rules run in ascending
//! [`RulePriority`]; rules sharing an exclusive group are alternatives, and
//! only the first applicable one in a group contributes.
//!
//! Built-in order:
//!
//! | priority | rule | group |
//! |---|---|---|
//! | 100 | `anat_conform` | |
//! | 110 | `anat_preproc` | |
//! | 200 | `normalization` | |
//! | 300 | `recon_force_scratch` | `surface_recon` |
//! | 310 | `recon_reuse` | `surface_recon` |
//! | 320 | `recon_fastsurfer` | `surface_recon` |
//! | 330 | `recon_freesurfer` | `surface_recon` |
//! | 400 | `post_recon` | |
//! | 410 | `cifti_grayordinates` | |
//! | 500 | `mask_from_brain_extraction` | |

mod anatomical;
mod cifti;
mod normalization;
mod post_recon;
mod recon;

pub use anatomical::{AnatConformRule, AnatPreprocRule, MaskFromBrainExtractionRule};
pub use cifti::CiftiGrayordinatesRule;
pub use normalization::NormalizationRule;
pub use post_recon::PostReconRule;
pub use recon::{FastSurferRule, FreeSurferRule, ReconForceScratchRule, ReconReuseRule};

use crate::context::RunContext;
use crate::error::{AnatprepError, Result};
use crate::graph::fragment::Fragment;
use crate::inputs::AvailableInputs;
use std::fmt;

/// Exclusive group of the surface reconstruction alternatives.
pub const SURFACE_RECON_GROUP: &str = "surface_recon";

/// Position of a rule in the evaluation order. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RulePriority(pub u32);

impl fmt::Display for RulePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rule that contributes part of the pipeline graph.
pub trait AssemblyRule: Send + Sync {
    /// Unique rule name.
    fn name(&self) -> &str;

    /// Evaluation order.
    fn priority(&self) -> RulePriority;

    /// Group of mutually exclusive alternatives this rule belongs to.
    fn exclusive_group(&self) -> Option<&str> {
        None
    }

    /// One-line description for `anatprep rules`.
    fn description(&self) -> &str;

    /// Whether the rule contributes for this run.
    fn applies(&self, ctx: &RunContext, inputs: &AvailableInputs) -> bool;

    /// Steps, wires, raw values and publications contributed by the rule.
    fn fragment(&self, ctx: &RunContext, inputs: &AvailableInputs) -> Result<Fragment>;
}

/// Registry of assembly rules, kept in priority order.
pub struct RuleRegistry {
    rules: Vec<Box<dyn AssemblyRule>>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a registry with all built-in rules.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(AnatConformRule))?;
        registry.register(Box::new(AnatPreprocRule))?;
        registry.register(Box::new(NormalizationRule))?;
        registry.register(Box::new(ReconForceScratchRule))?;
        registry.register(Box::new(ReconReuseRule))?;
        registry.register(Box::new(FastSurferRule))?;
        registry.register(Box::new(FreeSurferRule))?;
        registry.register(Box::new(PostReconRule))?;
        registry.register(Box::new(CiftiGrayordinatesRule))?;
        registry.register(Box::new(MaskFromBrainExtractionRule))?;
        Ok(registry)
    }

    /// Register a rule.
    ///
    /// Returns `RulePriorityConflict` if another rule already holds the
    /// same priority.
    pub fn register(&mut self, rule: Box<dyn AssemblyRule>) -> Result<()> {
        if let Some(existing) = self.rules.iter().find(|r| r.priority() == rule.priority()) {
            return Err(AnatprepError::RulePriorityConflict {
                priority: rule.priority().0,
                first: existing.name().to_string(),
                second: rule.name().to_string(),
            });
        }
        let pos = self
            .rules
            .partition_point(|r| r.priority() < rule.priority());
        self.rules.insert(pos, rule);
        Ok(())
    }

    /// Get a rule by name.
    pub fn get(&self, name: &str) -> Option<&dyn AssemblyRule> {
        self.rules
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.as_ref())
    }

    /// Iterate in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn AssemblyRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
