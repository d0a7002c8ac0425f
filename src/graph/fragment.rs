//! Sub-graph fragments contributed by assembly rules.

use crate::artifact::RawValue;
use crate::graph::model::{SlotRef, Source, Wire};
use crate::steps::StepDescriptor;
use std::collections::BTreeMap;

/// Steps, wires, raw values and role publications from one rule.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    steps: Vec<StepDescriptor>,
    wires: Vec<Wire>,
    raw: BTreeMap<String, RawValue>,
    publications: Vec<(String, SlotRef)>,
}

impl Fragment {
    /// Create an empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a step.
    pub fn add_step(&mut self, step: StepDescriptor) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Bind `consumer.slot` to an arbitrary source.
    pub fn wire(&mut self, consumer: &str, slot: &str, source: Source) -> &mut Self {
        self.wires.push(Wire {
            consumer: SlotRef::new(consumer, slot),
            source,
        });
        self
    }

    /// Bind `consumer.slot` to `producer.output`.
    pub fn from_step(
        &mut self,
        consumer: &str,
        slot: &str,
        producer: &str,
        output: &str,
    ) -> &mut Self {
        self.wire(consumer, slot, Source::Step(SlotRef::new(producer, output)))
    }

    /// Bind `consumer.slot` to whichever output publishes `role`.
    pub fn from_role(&mut self, consumer: &str, slot: &str, role: &str) -> &mut Self {
        self.wire(consumer, slot, Source::Role(role.to_string()))
    }

    /// Bind `consumer.slot` to the raw value registered under `key`.
    pub fn from_raw(&mut self, consumer: &str, slot: &str, key: &str) -> &mut Self {
        self.wire(consumer, slot, Source::Raw(key.to_string()))
    }

    /// Register a raw value.
    pub fn raw(&mut self, key: impl Into<String>, value: RawValue) -> &mut Self {
        self.raw.insert(key.into(), value);
        self
    }

    /// Publish `step.output` under a canonical role.
    pub fn publish(&mut self, role: impl Into<String>, step: &str, output: &str) -> &mut Self {
        self.publications
            .push((role.into(), SlotRef::new(step, output)));
        self
    }

    /// Step ids declared by this fragment.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.id.as_str())
    }

    /// Roles published by this fragment.
    pub fn published_roles(&self) -> impl Iterator<Item = &str> {
        self.publications.iter().map(|(role, _)| role.as_str())
    }

    /// Whether the fragment contributes nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
            && self.wires.is_empty()
            && self.raw.is_empty()
            && self.publications.is_empty()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<StepDescriptor>,
        Vec<Wire>,
        BTreeMap<String, RawValue>,
        Vec<(String, SlotRef)>,
    ) {
        (self.steps, self.wires, self.raw, self.publications)
    }
}
