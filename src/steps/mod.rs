//! Step descriptors and the operations that execute them.
//!
//! - [`StepDescriptor`] - declarative unit: slots, resources, operation
//! - [`Operation`] - the seam to external tool wrappers
//! - [`ShellOperation`] - runs a configured command template
//! - [`OperationRegistry`] - maps operation names to implementations
//!
//! # Example
//!
//! ```
//! use anatprep::steps::{SlotKind, StepDescriptor, Resources};
//!
//! let step = StepDescriptor::builder("bias_correct", "n4")
//!     .input("in_file", SlotKind::Volume)
//!     .output("out_file", SlotKind::Volume, "${step_dir}/t1w_corrected.nii.gz")
//!     .resources(Resources::gib(4, 2.0))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(step.outputs.len(), 1);
//! ```

pub mod descriptor;
pub mod executor;

pub use descriptor::{OperationRef, Resources, SlotKind, SlotSpec, StepBuilder, StepDescriptor};
pub use executor::{Invocation, Operation, OperationRegistry, ShellOperation};
