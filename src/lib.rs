//! anatprep - anatomical MRI preprocessing pipeline orchestration.
//!
//! anatprep assembles a per-subject pipeline graph from rules, resolves it
//! into a validated execution order, and runs it with bounded parallelism
//! under a CPU and memory budget. Steps whose outputs are already fresh are
//! skipped, so an interrupted run resumes where it stopped.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration loading, parsing, and validation
//! - [`context`] - Per-subject run options and directory layout
//! - [`inputs`] - Input manifest of raw images and existing derivatives
//! - [`steps`] - Step descriptors and the operations that execute them
//! - [`graph`] - Rule-based graph assembly and dependency resolution
//! - [`cache`] - Freshness checks deciding which steps can be skipped
//! - [`runner`] - Bounded-parallel execution engine and run reports
//! - [`state`] - Persisted execution state and run history
//! - [`shell`] - Shell command execution
//! - [`ui`] - Terminal output, progress and tables
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```
//! use anatprep::context::{Layout, RunContext};
//! use anatprep::config::ReconMethod;
//! use anatprep::graph::plan;
//! use anatprep::inputs::{AvailableInputs, ImageInput};
//! use std::path::Path;
//!
//! let mut ctx = RunContext::new("01", Layout::under(Path::new("/study")));
//! ctx.recon = ReconMethod::None;
//! let inputs = AvailableInputs {
//!     t1w: vec![ImageInput::new("/raw/sub-01_T1w.nii.gz")],
//!     ..Default::default()
//! };
//!
//! let graph = plan(&ctx, &inputs).unwrap();
//! let order = graph.order();
//! let pos = |id: &str| order.iter().position(|s| *s == id).unwrap();
//! assert!(pos("bias_correct") < pos("brain_extraction"));
//! ```

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod inputs;
pub mod runner;
pub mod shell;
pub mod state;
pub mod steps;
pub mod ui;

pub use error::{AnatprepError, Result};
