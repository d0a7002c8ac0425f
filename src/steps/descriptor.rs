//! Declarative step descriptors.
//!
//! A [`StepDescriptor`] says what a processing step consumes, what it
//! produces, which external operation performs the work and how much of the
//! machine it needs. It never says *where its inputs come from*; that is the
//! job of the wiring in [`crate::graph`].

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::artifact::RawValue;
use crate::error::{AnatprepError, Result};

const GIB: u64 = 1024 * 1024 * 1024;

/// Type/shape tag of a slot.
///
/// Used to validate wiring and to decide whether an output on disk is well
/// formed. It says nothing about the physical file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// 3-D (or 4-D) image.
    Volume,
    /// Binary mask image.
    Mask,
    /// Label image (discrete segmentation).
    Segmentation,
    /// Affine or nonlinear transform.
    Transform,
    /// Surface mesh.
    Surface,
    /// Per-vertex scalar map (thickness, curvature, sulcal depth).
    Morphometry,
    /// CIFTI grayordinate file.
    Cifti,
    /// Tabular statistics file.
    Stats,
    /// A directory (e.g. the FreeSurfer subjects directory).
    Directory,
    /// A literal value with no file behind it.
    Value,
}

impl SlotKind {
    /// Lowercase tag used in messages and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Volume => "volume",
            SlotKind::Mask => "mask",
            SlotKind::Segmentation => "segmentation",
            SlotKind::Transform => "transform",
            SlotKind::Surface => "surface",
            SlotKind::Morphometry => "morphometry",
            SlotKind::Cifti => "cifti",
            SlotKind::Stats => "stats",
            SlotKind::Directory => "directory",
            SlotKind::Value => "value",
        }
    }

    /// Whether outputs of this kind are regular files that must be non-empty.
    pub fn is_file(&self) -> bool {
        !matches!(self, SlotKind::Directory | SlotKind::Value)
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one input or output slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    /// Type/shape tag.
    pub kind: SlotKind,
    /// Input may be left unbound.
    pub optional: bool,
    /// Value used when an optional input is left unbound.
    pub default: Option<RawValue>,
    /// Output location template (outputs only).
    pub location: Option<String>,
}

impl SlotSpec {
    /// Required input of the given kind.
    pub fn required(kind: SlotKind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
            location: None,
        }
    }

    /// Optional input, with an optional default.
    pub fn optional(kind: SlotKind, default: Option<RawValue>) -> Self {
        Self {
            kind,
            optional: true,
            default,
            location: None,
        }
    }

    /// Output written to a templated location.
    pub fn output(kind: SlotKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
            location: Some(location.into()),
        }
    }
}

/// Resource requirement (or ceiling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Worker threads the step occupies.
    pub cpu_threads: usize,
    /// Peak memory in bytes.
    pub memory_bytes: u64,
}

impl Resources {
    /// Create a resource amount.
    pub fn new(cpu_threads: usize, memory_bytes: u64) -> Self {
        Self {
            cpu_threads,
            memory_bytes,
        }
    }

    /// Convenience constructor taking memory in GiB.
    pub fn gib(cpu_threads: usize, memory_gib: f64) -> Self {
        Self::new(cpu_threads, (memory_gib * GIB as f64) as u64)
    }

    /// Whether `self` fits inside `ceiling` on every axis.
    pub fn fits_within(&self, ceiling: &Resources) -> bool {
        self.cpu_threads <= ceiling.cpu_threads && self.memory_bytes <= ceiling.memory_bytes
    }

    /// Component-wise minimum.
    pub fn clamp_to(&self, ceiling: &Resources) -> Resources {
        Resources {
            cpu_threads: self.cpu_threads.min(ceiling.cpu_threads),
            memory_bytes: self.memory_bytes.min(ceiling.memory_bytes),
        }
    }

    /// Memory in whole MiB, for command templates.
    pub fn memory_mb(&self) -> u64 {
        self.memory_bytes / (1024 * 1024)
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpu_threads: self.cpu_threads + rhs.cpu_threads,
            memory_bytes: self.memory_bytes + rhs.memory_bytes,
        }
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            cpu_threads: self.cpu_threads.saturating_sub(rhs.cpu_threads),
            memory_bytes: self.memory_bytes.saturating_sub(rhs.memory_bytes),
        }
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} thread(s), {:.1} GiB",
            self.cpu_threads,
            self.memory_bytes as f64 / GIB as f64
        )
    }
}

/// Opaque handle to the external collaborator performing a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRef {
    /// Operation name, looked up in the operation registry.
    pub name: String,
    /// Operation-specific parameters (directive, hemisphere, template...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl OperationRef {
    /// Reference an operation without parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }
}

/// Immutable description of one processing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Unique id within a graph.
    pub id: String,
    /// Human readable title.
    pub title: String,
    /// Input slots.
    pub inputs: BTreeMap<String, SlotSpec>,
    /// Output slots.
    pub outputs: BTreeMap<String, SlotSpec>,
    /// Resource requirement.
    pub resources: Resources,
    /// External operation.
    pub operation: OperationRef,
    /// Never skipped by the resume layer.
    pub always_run: bool,
}

impl StepDescriptor {
    /// Start building a descriptor.
    pub fn builder(id: impl Into<String>, operation: impl Into<String>) -> StepBuilder {
        StepBuilder::new(id, operation)
    }

    /// Look up a declared input slot.
    pub fn input(&self, slot: &str) -> Option<&SlotSpec> {
        self.inputs.get(slot)
    }

    /// Look up a declared output slot.
    pub fn output(&self, slot: &str) -> Option<&SlotSpec> {
        self.outputs.get(slot)
    }
}

/// Builder for [`StepDescriptor`].
#[derive(Debug)]
pub struct StepBuilder {
    id: String,
    title: Option<String>,
    inputs: BTreeMap<String, SlotSpec>,
    outputs: Vec<(String, SlotSpec)>,
    resources: Resources,
    operation: OperationRef,
    always_run: bool,
}

impl StepBuilder {
    /// Create a builder for a single-threaded step with 1 GiB memory.
    pub fn new(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            inputs: BTreeMap::new(),
            outputs: Vec::new(),
            resources: Resources::gib(1, 1.0),
            operation: OperationRef::new(operation),
            always_run: false,
        }
    }

    /// Set a display title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Declare a required input.
    pub fn input(mut self, name: impl Into<String>, kind: SlotKind) -> Self {
        self.inputs.insert(name.into(), SlotSpec::required(kind));
        self
    }

    /// Declare an optional input.
    pub fn optional_input(
        mut self,
        name: impl Into<String>,
        kind: SlotKind,
        default: Option<RawValue>,
    ) -> Self {
        self.inputs
            .insert(name.into(), SlotSpec::optional(kind, default));
        self
    }

    /// Declare an output written to `location`.
    pub fn output(
        mut self,
        name: impl Into<String>,
        kind: SlotKind,
        location: impl Into<String>,
    ) -> Self {
        self.outputs
            .push((name.into(), SlotSpec::output(kind, location)));
        self
    }

    /// Set an operation parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.operation.params.insert(key.into(), value.into());
        self
    }

    /// Set the resource requirement.
    pub fn resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Mark the step as never skippable.
    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }

    /// Finish the descriptor.
    ///
    /// Returns `DuplicateSlot` if two outputs share a name.
    pub fn build(self) -> Result<StepDescriptor> {
        let mut outputs = BTreeMap::new();
        for (name, spec) in self.outputs {
            if outputs.contains_key(&name) {
                return Err(AnatprepError::DuplicateSlot {
                    step: self.id,
                    slot: name,
                });
            }
            outputs.insert(name, spec);
        }

        Ok(StepDescriptor {
            title: self.title.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            inputs: self.inputs,
            outputs,
            resources: self.resources,
            operation: self.operation,
            always_run: self.always_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_slots_and_params() {
        let step = StepDescriptor::builder("bias_correct", "n4")
            .title("N4 bias field correction")
            .input("in_file", SlotKind::Volume)
            .optional_input("weight_mask", SlotKind::Mask, None)
            .output("out_file", SlotKind::Volume, "${step_dir}/corrected.nii.gz")
            .param("shrink", "4")
            .resources(Resources::gib(4, 2.0))
            .build()
            .unwrap();

        assert_eq!(step.id, "bias_correct");
        assert_eq!(step.title, "N4 bias field correction");
        assert!(!step.input("in_file").unwrap().optional);
        assert!(step.input("weight_mask").unwrap().optional);
        assert_eq!(
            step.output("out_file").unwrap().location.as_deref(),
            Some("${step_dir}/corrected.nii.gz")
        );
        assert_eq!(step.operation.name, "n4");
        assert_eq!(step.operation.params["shrink"], "4");
        assert_eq!(step.resources.cpu_threads, 4);
    }

    #[test]
    fn title_defaults_to_id() {
        let step = StepDescriptor::builder("gcareg", "recon_all").build().unwrap();
        assert_eq!(step.title, "gcareg");
        assert!(!step.always_run);
    }

    #[test]
    fn duplicate_output_slot_is_rejected() {
        let err = StepDescriptor::builder("a", "op")
            .output("out_file", SlotKind::Volume, "${step_dir}/a.nii")
            .output("out_file", SlotKind::Mask, "${step_dir}/b.nii")
            .build()
            .unwrap_err();
        assert!(matches!(err, AnatprepError::DuplicateSlot { .. }));
    }

    #[test]
    fn resources_fit_and_clamp() {
        let ceiling = Resources::gib(8, 16.0);
        assert!(Resources::gib(8, 16.0).fits_within(&ceiling));
        assert!(!Resources::gib(9, 1.0).fits_within(&ceiling));
        assert!(!Resources::gib(1, 17.0).fits_within(&ceiling));

        let clamped = Resources::gib(16, 32.0).clamp_to(&ceiling);
        assert_eq!(clamped, ceiling);
    }

    #[test]
    fn resources_arithmetic() {
        let a = Resources::new(2, 100);
        let b = Resources::new(3, 50);
        assert_eq!(a + b, Resources::new(5, 150));
        assert_eq!((a + b) - b, a);
        assert_eq!(a - b, Resources::new(0, 50));
    }

    #[test]
    fn slot_kind_file_classification() {
        assert!(SlotKind::Volume.is_file());
        assert!(SlotKind::Surface.is_file());
        assert!(!SlotKind::Directory.is_file());
        assert!(!SlotKind::Value.is_file());
        assert_eq!(SlotKind::Segmentation.to_string(), "segmentation");
    }
}
