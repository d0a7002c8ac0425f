//! Operation seam between the engine and external tool wrappers.
//!
//! The engine hands each dispatched step an [`Invocation`]: resolved input
//! values, concrete output paths, parameters and the granted resources. An
//! [`Operation`] turns that into artifacts on disk. The only built-in
//! implementation is [`ShellOperation`], which renders a configured command
//! template and runs it through the shell.

use crate::artifact::InputValue;
use crate::config::interpolation::{resolve_string, InterpolationContext};
use crate::error::{AnatprepError, Result};
use crate::shell::{execute_streaming, CommandOptions, OutputCallback, OutputLine};
use crate::steps::descriptor::{OperationRef, Resources};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the per-step log file written by [`ShellOperation`].
pub const STEP_LOG: &str = "command.log";

/// Everything an operation needs to perform one step.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Step id.
    pub step_id: String,

    /// Operation reference of the step.
    pub operation: OperationRef,

    /// Input slot values. `None` marks an optional input left unbound.
    pub inputs: BTreeMap<String, Option<InputValue>>,

    /// Output slot paths the operation must produce.
    pub outputs: BTreeMap<String, PathBuf>,

    /// Resources granted by the engine (already clamped to the ceiling).
    pub resources: Resources,

    /// Scratch directory of the step.
    pub step_dir: PathBuf,

    /// Run-level variables (`subject_id`, `subjects_dir`, `work_dir`, ...).
    pub vars: BTreeMap<String, String>,
}

impl Invocation {
    /// Build the interpolation context for command templates.
    pub fn interpolation_context(&self) -> InterpolationContext {
        let mut ctx = InterpolationContext::new();
        for (name, value) in &self.vars {
            ctx.run.insert(name.clone(), value.clone());
        }

        let mut all_inputs = Vec::new();
        for (slot, value) in &self.inputs {
            let rendered = value.as_ref().map(|v| v.render()).unwrap_or_default();
            if !rendered.is_empty() {
                all_inputs.push(rendered.clone());
            }
            ctx.set_step_var(format!("in.{}", slot), rendered);
        }
        // `${in.*}`: every bound input, in slot order
        ctx.set_step_var("in.*", all_inputs.join(" "));
        let mut all_outputs = Vec::with_capacity(self.outputs.len());
        for (slot, path) in &self.outputs {
            let rendered = path.display().to_string();
            all_outputs.push(rendered.clone());
            ctx.set_step_var(format!("out.{}", slot), rendered);
        }
        ctx.set_step_var("out.*", all_outputs.join(" "));
        for (name, value) in &self.operation.params {
            ctx.set_step_var(format!("param.{}", name), value.clone());
        }

        ctx.set_step_var("threads", self.resources.cpu_threads.to_string());
        ctx.set_step_var("memory_mb", self.resources.memory_mb().to_string());
        ctx.set_step_var("step_id", self.step_id.clone());
        ctx.set_step_var("step_dir", self.step_dir.display().to_string());
        ctx
    }

    /// Declared outputs that are not on disk.
    pub fn missing_outputs(&self) -> Vec<String> {
        self.outputs
            .iter()
            .filter(|(_, path)| !path.exists())
            .map(|(slot, _)| slot.clone())
            .collect()
    }
}

/// An external collaborator performing the work of a step.
///
/// Implementations must be callable from worker threads.
pub trait Operation: Send + Sync {
    /// Perform the step. An `Err` marks the step failed.
    fn invoke(&self, invocation: &Invocation) -> Result<()>;

    /// Human readable preview of what `invoke` would do.
    fn describe(&self, _invocation: &Invocation) -> Option<String> {
        None
    }
}

/// Runs a command template through the shell.
///
/// Output is streamed line by line into `<step_dir>/command.log`.
#[derive(Debug, Clone)]
pub struct ShellOperation {
    template: String,
}

impl ShellOperation {
    /// Create an operation from a command template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The unrendered template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the command for an invocation.
    pub fn render(&self, invocation: &Invocation) -> Result<String> {
        let ctx = invocation.interpolation_context();
        resolve_string(&self.template, &ctx).map_err(|e| AnatprepError::StepExecutionError {
            step: invocation.step_id.clone(),
            message: e.to_string(),
        })
    }

    fn environment(invocation: &Invocation) -> HashMap<String, String> {
        let threads = invocation.resources.cpu_threads.to_string();
        let mut env = HashMap::new();
        env.insert("OMP_NUM_THREADS".to_string(), threads.clone());
        env.insert(
            "ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS".to_string(),
            threads,
        );
        if let Some(subjects_dir) = invocation.vars.get("subjects_dir") {
            env.insert("SUBJECTS_DIR".to_string(), subjects_dir.clone());
        }
        env
    }
}

impl Operation for ShellOperation {
    fn invoke(&self, invocation: &Invocation) -> Result<()> {
        let command = self.render(invocation)?;
        if command.trim().is_empty() {
            return Err(AnatprepError::StepExecutionError {
                step: invocation.step_id.clone(),
                message: "command template rendered to an empty command".to_string(),
            });
        }

        fs::create_dir_all(&invocation.step_dir)?;
        let mut log = File::create(invocation.step_dir.join(STEP_LOG))?;
        writeln!(log, "$ {}", command)?;

        tracing::debug!("[{}] {}", invocation.step_id, command);

        let options = CommandOptions {
            cwd: Some(invocation.step_dir.clone()),
            env: Self::environment(invocation),
        };

        let callback: OutputCallback = Box::new(move |line| {
            let _ = match line {
                OutputLine::Stdout(l) => writeln!(log, "{}", l),
                OutputLine::Stderr(l) => writeln!(log, "[stderr] {}", l),
            };
        });

        let result = execute_streaming(&command, &options, callback)?;

        if !result.success {
            let tail = result.tail(5);
            let message = if tail.is_empty() {
                format!("command exited with code {:?}", result.exit_code)
            } else {
                format!(
                    "command exited with code {:?}:\n{}",
                    result.exit_code, tail
                )
            };
            return Err(AnatprepError::StepExecutionError {
                step: invocation.step_id.clone(),
                message,
            });
        }

        Ok(())
    }

    fn describe(&self, invocation: &Invocation) -> Option<String> {
        self.render(invocation).ok()
    }
}

/// Maps operation names to implementations.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`ShellOperation`] for every configured tool template.
    pub fn from_tools(tools: &BTreeMap<String, String>) -> Self {
        let mut registry = Self::new();
        for (name, template) in tools {
            registry.register(name, ShellOperation::new(template.clone()));
        }
        registry
    }

    /// Register (or replace) an operation.
    pub fn register(&mut self, name: impl Into<String>, operation: impl Operation + 'static) {
        self.operations.insert(name.into(), Arc::new(operation));
    }

    /// Look up an operation.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    /// Whether an operation is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Fail with `UnknownOperation` for the first step whose operation is
    /// not registered.
    pub fn check<'a>(
        &self,
        steps: impl IntoIterator<Item = (&'a str, &'a OperationRef)>,
    ) -> Result<()> {
        for (step, operation) in steps {
            if !self.contains(&operation.name) {
                return Err(AnatprepError::UnknownOperation {
                    step: step.to_string(),
                    operation: operation.name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}
