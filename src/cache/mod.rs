//! Resume layer.
//!
//! Decides from the artifacts on disk whether a step's previous results can
//! be reused.

pub mod freshness;

pub use freshness::{observe_outputs, should_skip, RunReason, SkipDecision};
