//! Configuration validation rules.
//!
//! This module validates configuration for correctness:
//! - Resource settings must be positive
//! - Output spaces must be well formed volume spaces
//! - Option combinations that no subject could satisfy are rejected
//! - Tool templates may only reference known variables

use crate::config::interpolation::extract_variables;
use crate::config::schema::{AnatprepConfig, ReconMethod};
use crate::context::TemplateSpace;
use crate::error::{AnatprepError, Result};

/// Variables every command template may reference besides `in.*`,
/// `out.*` and `param.*`.
const TEMPLATE_VARIABLES: &[&str] = &[
    "threads",
    "memory_mb",
    "subject_id",
    "subjects_dir",
    "work_dir",
    "output_dir",
    "step_id",
    "step_dir",
    "anatprep_version",
];

/// Validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: String,
    /// Human-readable error message
    pub message: String,
    /// Offending configuration key, e.g. `settings.nprocs`
    pub field: Option<String>,
}

impl ValidationError {
    fn new(rule: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Validate a configuration and return all errors.
///
/// This function collects all validation errors rather than stopping
/// at the first one, allowing users to fix multiple issues at once.
pub fn validate_config(config: &AnatprepConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_settings(config));
    errors.extend(validate_spaces(config));
    errors.extend(validate_combinations(config));
    errors.extend(validate_tools(config));

    errors
}

fn validate_settings(config: &AnatprepConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let settings = &config.settings;

    if settings.nprocs == Some(0) {
        errors.push(ValidationError::new(
            "invalid-nprocs",
            "settings.nprocs",
            "nprocs must be at least 1",
        ));
    }

    if let Some(mem) = settings.mem_gb {
        if mem.is_nan() || mem <= 0.0 {
            errors.push(ValidationError::new(
                "invalid-mem-gb",
                "settings.mem_gb",
                format!("mem_gb must be positive, got {}", mem),
            ));
        }
    }

    match (settings.omp_nthreads, settings.nprocs) {
        (Some(0), _) => errors.push(ValidationError::new(
            "invalid-omp-nthreads",
            "settings.omp_nthreads",
            "omp_nthreads must be at least 1",
        )),
        (Some(omp), Some(nprocs)) if nprocs > 0 && omp > nprocs => {
            errors.push(ValidationError::new(
                "omp-exceeds-nprocs",
                "settings.omp_nthreads",
                format!("omp_nthreads ({}) exceeds nprocs ({})", omp, nprocs),
            ))
        }
        _ => {}
    }

    if settings.history_retention == 0 {
        errors.push(ValidationError::new(
            "invalid-history-retention",
            "settings.history_retention",
            "history_retention must be at least 1",
        ));
    }

    errors
}

fn validate_spaces(config: &AnatprepConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for space in &config.run.spaces {
        match TemplateSpace::parse(space) {
            None => errors.push(ValidationError::new(
                "invalid-space",
                "run.spaces",
                format!("'{}' is not a valid output space", space),
            )),
            Some(parsed) if parsed.is_surface() => errors.push(ValidationError::new(
                "surface-space",
                "run.spaces",
                format!(
                    "'{}' is a surface space; request grayordinates with run.cifti_output",
                    space
                ),
            )),
            Some(_) => {}
        }
    }

    errors
}

fn validate_combinations(config: &AnatprepConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let run = &config.run;

    if run.cifti_output.is_some() && run.recon == ReconMethod::None {
        errors.push(ValidationError::new(
            "cifti-without-recon",
            "run.cifti_output",
            "CIFTI output requires surface reconstruction",
        ));
    }

    if run.longitudinal && run.recon == ReconMethod::FastSurfer {
        errors.push(ValidationError::new(
            "fastsurfer-longitudinal",
            "run.longitudinal",
            "FastSurfer does not support longitudinal processing",
        ));
    }

    errors
}

fn validate_tools(config: &AnatprepConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (name, template) in &config.tools {
        let field = format!("tools.{}", name);
        if template.trim().is_empty() {
            errors.push(ValidationError::new(
                "empty-tool-template",
                field,
                format!("Tool '{}' has an empty command template", name),
            ));
            continue;
        }

        let mut unknown: Vec<String> = extract_variables(template)
            .into_iter()
            .filter(|v| !is_template_variable(v))
            .collect();
        unknown.sort();
        for var in unknown {
            errors.push(ValidationError::new(
                "unknown-template-variable",
                field.clone(),
                format!("Tool '{}' references unknown variable ${{{}}}", name, var),
            ));
        }
    }

    errors
}

fn is_template_variable(name: &str) -> bool {
    TEMPLATE_VARIABLES.contains(&name)
        || ["in.", "out.", "param."]
            .iter()
            .any(|prefix| name.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()))
}

/// Validate and return Result (for convenience).
///
/// # Errors
///
/// Returns `ConfigValidationError` if any validation rules fail.
pub fn validate(config: &AnatprepConfig) -> Result<()> {
    let errors = validate_config(config);

    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<_> = errors.iter().map(|e| e.message.clone()).collect();
        Err(AnatprepError::ConfigValidationError {
            message: messages.join("; "),
        })
    }
}
