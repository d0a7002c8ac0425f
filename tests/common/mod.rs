//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anatprep::context::{Layout, RunContext};
use anatprep::error::AnatprepError;
use anatprep::graph::ResolvedGraph;
use anatprep::inputs::{AvailableInputs, ImageInput};
use anatprep::steps::{Invocation, Operation, OperationRegistry};

/// In-process stand-in for every external tool.
///
/// Writes each declared output, fails the configured steps, and records
/// invocation order and peak concurrent resource use.
#[derive(Clone, Default)]
pub struct FakeTool {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail: Arc<BTreeSet<String>>,
    pub delay: Duration,
    threads_in_use: Arc<AtomicUsize>,
    memory_in_use: Arc<AtomicU64>,
    pub peak_threads: Arc<AtomicUsize>,
    pub peak_memory: Arc<AtomicU64>,
}

impl FakeTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(steps: &[&str]) -> Self {
        Self {
            fail: Arc::new(steps.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Register this tool under every operation the graph uses.
    pub fn registry(&self, graph: &ResolvedGraph) -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        for step in graph.steps() {
            let name = &step.descriptor.operation.name;
            if !registry.contains(name) {
                registry.register(name.clone(), self.clone());
            }
        }
        registry
    }
}

impl Operation for FakeTool {
    fn invoke(&self, invocation: &Invocation) -> anatprep::Result<()> {
        self.calls.lock().unwrap().push(invocation.step_id.clone());

        let threads = invocation.resources.cpu_threads;
        let memory = invocation.resources.memory_bytes;
        let now_threads = self.threads_in_use.fetch_add(threads, Ordering::SeqCst) + threads;
        let now_memory = self.memory_in_use.fetch_add(memory, Ordering::SeqCst) + memory;
        self.peak_threads.fetch_max(now_threads, Ordering::SeqCst);
        self.peak_memory.fetch_max(now_memory, Ordering::SeqCst);

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let result = if self.fail.contains(&invocation.step_id) {
            Err(AnatprepError::StepExecutionError {
                step: invocation.step_id.clone(),
                message: "tool exited with code 1".to_string(),
            })
        } else {
            write_outputs(invocation)
        };

        self.threads_in_use.fetch_sub(threads, Ordering::SeqCst);
        self.memory_in_use.fetch_sub(memory, Ordering::SeqCst);
        result
    }
}

fn write_outputs(invocation: &Invocation) -> anatprep::Result<()> {
    for path in invocation.outputs.values() {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, invocation.step_id.as_bytes())?;
    }
    Ok(())
}

/// Write a non-empty file, creating parent directories.
pub fn write_file(path: &Path) -> PathBuf {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).unwrap();
    }
    fs::write(path, b"data").unwrap();
    path.to_path_buf()
}

/// A context rooted at `root` with default options.
pub fn context(root: &Path) -> RunContext {
    RunContext::new("01", Layout::under(root))
}

/// One T1w image on disk.
pub fn t1w_only(root: &Path) -> AvailableInputs {
    AvailableInputs {
        t1w: vec![ImageInput::new(write_file(&root.join("raw/sub-01_T1w.nii.gz")))],
        ..Default::default()
    }
}

/// One T1w and one T2w image on disk.
pub fn t1w_t2w(root: &Path) -> AvailableInputs {
    let mut inputs = t1w_only(root);
    inputs.t2w = vec![ImageInput::new(write_file(&root.join("raw/sub-01_T2w.nii.gz")))];
    inputs
}
