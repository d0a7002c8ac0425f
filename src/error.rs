//! Error types for anatprep operations.
//!
//! This module defines [`AnatprepError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Taxonomy
//!
//! - Configuration errors (missing raw input, unsupported option combination)
//!   are detected before any step runs and are never retried.
//! - Graph integrity errors (unresolved slot, cycle, type mismatch, ambiguous
//!   binding) are raised by the resolver and indicate a rule-authoring bug.
//! - Step execution errors stay local to the failing step; the engine records
//!   them in the run report instead of propagating them.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for anatprep operations.
#[derive(Debug, Error)]
pub enum AnatprepError {
    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse a configuration, manifest or state file.
    #[error("Failed to parse {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// A required raw input is absent or a run option is malformed.
    #[error("Configuration error for subject '{subject}': {message}")]
    Configuration { subject: String, message: String },

    /// Requested options cannot be combined.
    #[error("Unsupported option combination: {message}")]
    UnsupportedCombination { message: String },

    /// Two fragments declared the same step id.
    #[error("Step '{step}' declared twice (by rule '{rule}')")]
    DuplicateStep { step: String, rule: String },

    /// Two output slots with the same name on one step.
    #[error("Step '{step}' declares output slot '{slot}' twice")]
    DuplicateSlot { step: String, slot: String },

    /// A wire references a step that is not in the graph.
    #[error("Step '{step}' is wired to unknown step '{unknown}'")]
    UnknownStep { step: String, unknown: String },

    /// A required input slot has no source.
    #[error("Input '{slot}' of step '{step}' has no source{}", detail_suffix(.detail))]
    UnresolvedSlot {
        step: String,
        slot: String,
        detail: Option<String>,
    },

    /// A consumer slot has more than one source.
    #[error("Input '{slot}' of step '{step}' is bound more than once: {sources}")]
    AmbiguousBinding {
        step: String,
        slot: String,
        sources: String,
    },

    /// A role is published by more than one step output.
    #[error("Role '{role}' is published more than once: {publishers}")]
    AmbiguousRole { role: String, publishers: String },

    /// Two assembly rules share a priority.
    #[error("Rules '{first}' and '{second}' share priority {priority}")]
    RulePriorityConflict {
        priority: u32,
        first: String,
        second: String,
    },

    /// Producer and consumer slot kinds disagree.
    #[error("Type mismatch wiring {producer} -> {consumer}: expected {expected}, found {found}")]
    TypeMismatch {
        producer: String,
        consumer: String,
        expected: String,
        found: String,
    },

    /// Step dependency cycle detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// A step cannot be reached from any raw input.
    #[error("Step '{step}' is not reachable from any raw input")]
    UnreachableStep { step: String },

    /// No operation is registered under the referenced name.
    #[error("Step '{step}' references unknown operation '{operation}'")]
    UnknownOperation { step: String, operation: String },

    /// Step execution failed.
    #[error("Step '{step}' failed: {message}")]
    StepExecutionError { step: String, message: String },

    /// Shell command failed.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

impl AnatprepError {
    /// Errors detected from inputs and options before a graph exists.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AnatprepError::ConfigNotFound { .. }
                | AnatprepError::ConfigParseError { .. }
                | AnatprepError::ConfigValidationError { .. }
                | AnatprepError::Configuration { .. }
                | AnatprepError::UnsupportedCombination { .. }
                | AnatprepError::UnknownOperation { .. }
        )
    }

    /// Errors that signal a malformed graph.
    pub fn is_graph_integrity(&self) -> bool {
        matches!(
            self,
            AnatprepError::DuplicateStep { .. }
                | AnatprepError::DuplicateSlot { .. }
                | AnatprepError::UnknownStep { .. }
                | AnatprepError::UnresolvedSlot { .. }
                | AnatprepError::AmbiguousBinding { .. }
                | AnatprepError::AmbiguousRole { .. }
                | AnatprepError::RulePriorityConflict { .. }
                | AnatprepError::TypeMismatch { .. }
                | AnatprepError::CircularDependency { .. }
                | AnatprepError::UnreachableStep { .. }
        )
    }

    /// Process exit code for an error that aborted a command.
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() || self.is_graph_integrity() {
            2
        } else {
            1
        }
    }
}

/// Result type alias for anatprep operations.
pub type Result<T> = std::result::Result<T, AnatprepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_not_found_displays_path() {
        let err = AnatprepError::ConfigNotFound {
            path: PathBuf::from("/foo/config.yml"),
        };
        assert!(err.to_string().contains("/foo/config.yml"));
    }

    #[test]
    fn configuration_error_names_subject() {
        let err = AnatprepError::Configuration {
            subject: "01".into(),
            message: "no T1w image".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'01'"));
        assert!(msg.contains("no T1w image"));
        assert!(err.is_configuration());
        assert!(!err.is_graph_integrity());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unresolved_slot_names_step_and_slot() {
        let err = AnatprepError::UnresolvedSlot {
            step: "norm_mni".into(),
            slot: "moving".into(),
            detail: Some("role 't1w_preproc' is not published".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("norm_mni"));
        assert!(msg.contains("moving"));
        assert!(msg.contains("t1w_preproc"));
        assert!(err.is_graph_integrity());
    }

    #[test]
    fn unresolved_slot_without_detail() {
        let err = AnatprepError::UnresolvedSlot {
            step: "a".into(),
            slot: "in_file".into(),
            detail: None,
        };
        assert_eq!(err.to_string(), "Input 'in_file' of step 'a' has no source");
    }

    #[test]
    fn circular_dependency_displays_cycle() {
        let err = AnatprepError::CircularDependency {
            cycle: "a -> b -> a".into(),
        };
        assert!(err.to_string().contains("a -> b -> a"));
        assert!(err.is_graph_integrity());
    }

    #[test]
    fn type_mismatch_displays_both_ends() {
        let err = AnatprepError::TypeMismatch {
            producer: "a.out_file".into(),
            consumer: "b.in_mask".into(),
            expected: "mask".into(),
            found: "volume".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.out_file -> b.in_mask"));
        assert!(msg.contains("expected mask"));
    }

    #[test]
    fn step_execution_error_is_not_fatal_class() {
        let err = AnatprepError::StepExecutionError {
            step: "autorecon1".into(),
            message: "exit 1".into(),
        };
        assert!(!err.is_configuration());
        assert!(!err.is_graph_integrity());
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: AnatprepError = io_err.into();
        assert!(matches!(err, AnatprepError::Io(_)));
    }
}
