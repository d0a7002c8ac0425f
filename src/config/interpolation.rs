//! Variable interpolation for command and location templates.
//!
//! Tool command lines and output locations use `${variable}` syntax.
//!
//! # Syntax
//!
//! - `${variable_name}` - replaced with variable value
//! - `$${escaped}` - produces literal `${escaped}` in output
//!
//! # Example
//!
//! ```yaml
//! tools:
//!   n4: "N4BiasFieldCorrection -d 3 -i ${in.in_file} -o ${out.out_file}"
//! ```

use crate::error::{AnatprepError, Result};
use std::collections::{HashMap, HashSet};

/// A segment of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text
    Literal(String),
    /// Variable reference: ${name}
    Variable(String),
}

/// Parse a string containing ${var} interpolations.
///
/// Supports:
/// - `${variable_name}` - variable interpolation
/// - `$${escaped}` - literal `${escaped}` in output
pub fn parse_interpolation(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = input.chars().peekable();
    let mut current_literal = String::new();

    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    if chars.peek() == Some(&'{') {
                        // $${...} -> literal ${...}
                        chars.next();
                        current_literal.push('$');
                        current_literal.push('{');
                        for c in chars.by_ref() {
                            current_literal.push(c);
                            if c == '}' {
                                break;
                            }
                        }
                    } else {
                        current_literal.push('$');
                    }
                }
                Some('{') => {
                    chars.next();

                    if !current_literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut current_literal)));
                    }

                    let mut var_name = String::new();
                    for c in chars.by_ref() {
                        if c == '}' {
                            break;
                        }
                        var_name.push(c);
                    }

                    segments.push(Segment::Variable(var_name));
                }
                _ => {
                    current_literal.push(c);
                }
            }
        } else {
            current_literal.push(c);
        }
    }

    if !current_literal.is_empty() {
        segments.push(Segment::Literal(current_literal));
    }

    segments
}

/// Extract all variable names from an interpolated string.
pub fn extract_variables(input: &str) -> HashSet<String> {
    parse_interpolation(input)
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Variable(name) => Some(name),
            _ => None,
        })
        .collect()
}

/// Check if a string contains any interpolation.
pub fn has_interpolation(input: &str) -> bool {
    parse_interpolation(input)
        .iter()
        .any(|seg| matches!(seg, Segment::Variable(_)))
}

/// Context for variable resolution.
///
/// Variables are resolved in priority order:
/// 1. Step variables (`in.*`, `out.*`, `param.*`, `threads`, ...)
/// 2. Run variables (`subject_id`, `subjects_dir`, `work_dir`, ...)
/// 3. Built-in variables (lowest priority)
#[derive(Debug, Default, Clone)]
pub struct InterpolationContext {
    /// Variables of the step being rendered
    pub step: HashMap<String, String>,

    /// Variables shared by every step of a run
    pub run: HashMap<String, String>,

    /// Built-in variables (anatprep_version)
    pub builtins: HashMap<String, String>,
}

impl InterpolationContext {
    /// Create a new context with built-in variables.
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        builtins.insert(
            "anatprep_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );

        Self {
            builtins,
            ..Default::default()
        }
    }

    /// Add a run-level variable.
    pub fn with_run_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.run.insert(name.to_string(), value.into());
        self
    }

    /// Set a step-level variable.
    pub fn set_step_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.step.insert(name.into(), value.into());
    }

    /// Resolve a variable name to its value.
    ///
    /// Resolution order: step > run > builtins
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.step
            .get(name)
            .or_else(|| self.run.get(name))
            .or_else(|| self.builtins.get(name))
            .cloned()
    }
}

/// Resolve all variables in an interpolated string.
///
/// # Errors
///
/// Returns `ConfigValidationError` if any variable is not found in the context.
pub fn resolve_string(input: &str, context: &InterpolationContext) -> Result<String> {
    let segments = parse_interpolation(input);
    let mut result = String::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => result.push_str(&text),
            Segment::Variable(name) => {
                let value =
                    context
                        .resolve(&name)
                        .ok_or_else(|| AnatprepError::ConfigValidationError {
                            message: format!("Unresolved variable: ${{{}}}", name),
                        })?;
                result.push_str(&value);
            }
        }
    }

    Ok(result)
}

/// Resolve string with a default for missing variables.
///
/// Unlike `resolve_string`, this never fails.
pub fn resolve_string_with_default(
    input: &str,
    context: &InterpolationContext,
    default: &str,
) -> String {
    parse_interpolation(input)
        .into_iter()
        .map(|segment| match segment {
            Segment::Literal(text) => text,
            Segment::Variable(name) => context
                .resolve(&name)
                .unwrap_or_else(|| default.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_only() {
        let result = parse_interpolation("recon-all -autorecon1");
        assert_eq!(
            result,
            vec![Segment::Literal("recon-all -autorecon1".to_string())]
        );
    }

    #[test]
    fn parse_dotted_variable_with_surrounding_text() {
        let result = parse_interpolation("N4 -i ${in.in_file}!");
        assert_eq!(
            result,
            vec![
                Segment::Literal("N4 -i ".to_string()),
                Segment::Variable("in.in_file".to_string()),
                Segment::Literal("!".to_string()),
            ]
        );
    }

    #[test]
    fn parse_escaped_dollar_brace() {
        let result = parse_interpolation("$${FREESURFER_HOME}");
        assert_eq!(
            result,
            vec![Segment::Literal("${FREESURFER_HOME}".to_string())]
        );
    }

    #[test]
    fn lone_dollar_is_literal() {
        let result = parse_interpolation("cost $5");
        assert_eq!(result, vec![Segment::Literal("cost $5".to_string())]);
    }

    #[test]
    fn extract_and_detect_variables() {
        let vars = extract_variables("${in.t1w} -sd ${subjects_dir} ${in.t1w}");
        assert_eq!(vars.len(), 2);
        assert!(vars.contains("subjects_dir"));
        assert!(has_interpolation("${x}"));
        assert!(!has_interpolation("$${x}"));
    }

    #[test]
    fn step_variables_shadow_run_variables() {
        let mut ctx = InterpolationContext::new().with_run_var("threads", "8");
        ctx.set_step_var("threads", "2");
        assert_eq!(ctx.resolve("threads"), Some("2".to_string()));
    }

    #[test]
    fn resolve_string_reports_unknown_variable() {
        let ctx = InterpolationContext::new();
        let err = resolve_string("${out.missing}", &ctx).unwrap_err();
        assert!(err.to_string().contains("${out.missing}"));
    }

    #[test]
    fn resolve_string_uses_builtins() {
        let ctx = InterpolationContext::new();
        let out = resolve_string("v${anatprep_version}", &ctx).unwrap();
        assert_eq!(out, format!("v{}", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn resolve_with_default_never_fails() {
        let ctx = InterpolationContext::new().with_run_var("subject_id", "sub-01");
        let out = resolve_string_with_default("${subject_id}/${nope}", &ctx, "?");
        assert_eq!(out, "sub-01/?");
    }
}
