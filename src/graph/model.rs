//! Unresolved pipeline graph.
//!
//! A [`Graph`] is the union of the fragments contributed by the assembly
//! rules: steps in declaration order, wires binding consumer slots to their
//! sources, raw values and role publications. Nothing is validated beyond
//! step id uniqueness until [`crate::graph::resolve`] runs.

use crate::artifact::RawValue;
use crate::error::{AnatprepError, Result};
use crate::graph::fragment::Fragment;
use crate::steps::StepDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A named slot on a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRef {
    /// Step id.
    pub step: String,
    /// Slot name.
    pub slot: String,
}

impl SlotRef {
    /// Create a slot reference.
    pub fn new(step: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            slot: slot.into(),
        }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.step, self.slot)
    }
}

/// Where a consumer slot gets its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Output slot of another step.
    Step(SlotRef),
    /// Raw value registered under a key.
    Raw(String),
    /// Whatever step output publishes the role.
    Role(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Step(slot) => write!(f, "{}", slot),
            Source::Raw(key) => write!(f, "raw:{}", key),
            Source::Role(role) => write!(f, "role:{}", role),
        }
    }
}

/// Binding of one consumer slot to a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    /// Consuming step and input slot.
    pub consumer: SlotRef,
    /// Value source.
    pub source: Source,
}

/// Steps, wires, raw values and role publications of one subject run.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Participant id.
    pub subject_id: String,
    /// Run-level template variables.
    pub vars: BTreeMap<String, String>,
    steps: Vec<StepDescriptor>,
    index: HashMap<String, usize>,
    wires: Vec<Wire>,
    raw: BTreeMap<String, RawValue>,
    roles: BTreeMap<String, Vec<SlotRef>>,
    provenance: HashMap<String, String>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(subject_id: impl Into<String>, vars: BTreeMap<String, String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            vars,
            ..Default::default()
        }
    }

    /// Merge a fragment contributed by `rule`.
    ///
    /// # Errors
    ///
    /// `DuplicateStep` when the fragment re-declares a step id, and
    /// `AmbiguousBinding` when it registers a raw key with a different value.
    pub fn add_fragment(&mut self, rule: &str, fragment: Fragment) -> Result<()> {
        let (steps, wires, raw, publications) = fragment.into_parts();

        for step in steps {
            if self.index.contains_key(&step.id) {
                return Err(AnatprepError::DuplicateStep {
                    step: step.id,
                    rule: rule.to_string(),
                });
            }
            self.index.insert(step.id.clone(), self.steps.len());
            self.provenance.insert(step.id.clone(), rule.to_string());
            self.steps.push(step);
        }

        for (key, value) in raw {
            match self.raw.get(&key) {
                Some(existing) if existing != &value => {
                    return Err(AnatprepError::AmbiguousBinding {
                        step: format!("<raw input from rule '{}'>", rule),
                        slot: key,
                        sources: format!("{}, {}", existing, value),
                    });
                }
                _ => {
                    self.raw.insert(key, value);
                }
            }
        }

        self.wires.extend(wires);

        for (role, slot) in publications {
            self.roles.entry(role).or_default().push(slot);
        }

        Ok(())
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Look up a step.
    pub fn step(&self, id: &str) -> Option<&StepDescriptor> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// Declaration index of a step.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether a step is declared.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All wires in declaration order.
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Raw values by key.
    pub fn raw(&self) -> &BTreeMap<String, RawValue> {
        &self.raw
    }

    /// Role publications (possibly several per role until resolution).
    pub fn roles(&self) -> &BTreeMap<String, Vec<SlotRef>> {
        &self.roles
    }

    /// Rule that contributed a step.
    pub fn rule_of(&self, step: &str) -> Option<&str> {
        self.provenance.get(step).map(|s| s.as_str())
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the graph has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::SlotKind;

    fn step(id: &str) -> StepDescriptor {
        StepDescriptor::builder(id, "op")
            .input("in_file", SlotKind::Volume)
            .output("out_file", SlotKind::Volume, "${step_dir}/out.nii.gz")
            .build()
            .unwrap()
    }

    #[test]
    fn add_fragment_keeps_declaration_order_and_provenance() {
        let mut graph = Graph::new("01", BTreeMap::new());

        let mut first = Fragment::new();
        first.add_step(step("a"));
        first.add_step(step("b"));
        first.publish("t1w_preproc", "b", "out_file");
        graph.add_fragment("anat", first).unwrap();

        let mut second = Fragment::new();
        second.add_step(step("c"));
        second.from_step("c", "in_file", "b", "out_file");
        graph.add_fragment("norm", second).unwrap();

        let ids: Vec<&str> = graph.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(graph.position("c"), Some(2));
        assert_eq!(graph.rule_of("c"), Some("norm"));
        assert_eq!(graph.wires().len(), 1);
        assert_eq!(graph.roles()["t1w_preproc"], vec![SlotRef::new("b", "out_file")]);
    }

    #[test]
    fn duplicate_step_names_offending_rule() {
        let mut graph = Graph::new("01", BTreeMap::new());
        let mut first = Fragment::new();
        first.add_step(step("bias_correct"));
        graph.add_fragment("anat", first).unwrap();

        let mut second = Fragment::new();
        second.add_step(step("bias_correct"));
        let err = graph.add_fragment("other", second).unwrap_err();

        assert!(matches!(
            err,
            AnatprepError::DuplicateStep { ref step, ref rule } if step == "bias_correct" && rule == "other"
        ));
    }

    #[test]
    fn identical_raw_values_merge_but_conflicts_fail() {
        let mut graph = Graph::new("01", BTreeMap::new());

        let mut a = Fragment::new();
        a.raw("t2w", RawValue::Path("/raw/T2w.nii.gz".into()));
        graph.add_fragment("a", a).unwrap();

        let mut b = Fragment::new();
        b.raw("t2w", RawValue::Path("/raw/T2w.nii.gz".into()));
        graph.add_fragment("b", b).unwrap();

        let mut c = Fragment::new();
        c.raw("t2w", RawValue::Path("/other.nii.gz".into()));
        let err = graph.add_fragment("c", c).unwrap_err();
        assert!(matches!(err, AnatprepError::AmbiguousBinding { .. }));
    }

    #[test]
    fn source_display() {
        assert_eq!(Source::Step(SlotRef::new("a", "x")).to_string(), "a.x");
        assert_eq!(Source::Raw("t1w".into()).to_string(), "raw:t1w");
        assert_eq!(Source::Role("t1w_mask".into()).to_string(), "role:t1w_mask");
    }
}
