//! Persisted execution state of one subject run.
//!
//! The engine is the only writer. Every status transition is saved before
//! the engine does anything else, so a crash or interrupt leaves a file that
//! describes exactly which steps had started and which had finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::artifact::Artifact;
use crate::error::{AnatprepError, Result};
use crate::graph::ResolvedGraph;

/// Lifecycle status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for producers.
    #[default]
    Pending,
    /// All producers satisfied; queued for dispatch.
    Ready,
    /// Dispatched to a worker.
    Running,
    /// Finished and outputs verified.
    Done,
    /// Outputs found fresh; not executed.
    Skipped,
    /// Operation returned an error or outputs were missing.
    Failed,
    /// An ancestor failed.
    Blocked,
}

impl StepStatus {
    /// Status name as written to state files.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Ready => "ready",
            StepStatus::Running => "running",
            StepStatus::Done => "done",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "failed",
            StepStatus::Blocked => "blocked",
        }
    }

    /// Whether dependents may consume this step's outputs.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Skipped)
    }

    /// Whether the step will not change status again in this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Done | StepStatus::Skipped | StepStatus::Failed | StepStatus::Blocked
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Current status.
    pub status: StepStatus,

    /// When the step was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the step reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Output artifacts with the fingerprints observed on completion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Artifact>,

    /// Failure message, skip reason or blocking ancestor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepRecord {
    /// Wall time between dispatch and completion.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds().max(0) as u64)
    }
}

/// Count of steps per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl StatusCounts {
    /// Total number of steps counted.
    pub fn total(&self) -> usize {
        self.pending
            + self.ready
            + self.running
            + self.done
            + self.skipped
            + self.failed
            + self.blocked
    }
}

/// Execution state of one subject run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Schema version for migration.
    pub version: u32,

    /// Participant id.
    pub subject_id: String,

    /// Hash of the resolved graph the statuses refer to.
    pub graph_hash: String,

    /// When the current run started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,

    /// When the state was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    /// Per-step records, keyed by step id.
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,
}

impl ExecutionState {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Create an empty state.
    pub fn new(subject_id: impl Into<String>, graph_hash: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            subject_id: subject_id.into(),
            graph_hash: graph_hash.into(),
            started: None,
            updated: None,
            steps: BTreeMap::new(),
        }
    }

    /// Create a state with every step of the graph pending.
    pub fn for_graph(graph: &ResolvedGraph) -> Self {
        let mut state = Self::new(graph.subject_id.clone(), graph.hash());
        for id in graph.order() {
            state.steps.insert(id.to_string(), StepRecord::default());
        }
        state
    }

    /// Load state from disk, or `None` if no run has been recorded.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let state: Self =
            serde_yaml::from_str(&content).map_err(|e| AnatprepError::ConfigParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(Some(state))
    }

    /// Save state to disk using atomic write.
    ///
    /// The content goes to a sibling temp file that is then renamed over the
    /// state file, so readers never see a partially written state.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        self.updated = Some(Utc::now());
        let content =
            serde_yaml::to_string(self).map_err(|e| AnatprepError::ConfigValidationError {
                message: format!("Failed to serialize state: {}", e),
            })?;

        let temp_path = path.with_extension("yml.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Whether the persisted statuses describe this graph.
    pub fn matches(&self, graph: &ResolvedGraph) -> bool {
        self.subject_id == graph.subject_id && self.graph_hash == graph.hash()
    }

    /// Record of a step.
    pub fn record(&self, step: &str) -> Option<&StepRecord> {
        self.steps.get(step)
    }

    /// Status of a step (`Pending` when unknown).
    pub fn status(&self, step: &str) -> StepStatus {
        self.steps
            .get(step)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    /// Move a step to a new status, stamping start and finish times.
    pub fn transition(&mut self, step: &str, status: StepStatus, message: Option<String>) {
        let record = self.steps.entry(step.to_string()).or_default();
        let now = Utc::now();
        match status {
            StepStatus::Pending | StepStatus::Ready => {
                record.started_at = None;
                record.finished_at = None;
            }
            StepStatus::Running => {
                record.started_at = Some(now);
                record.finished_at = None;
            }
            _ => record.finished_at = Some(now),
        }
        record.status = status;
        record.message = message;
    }

    /// Store the artifacts a step produced (or was found to have produced).
    pub fn set_outputs(&mut self, step: &str, outputs: Vec<Artifact>) {
        self.steps.entry(step.to_string()).or_default().outputs = outputs;
    }

    /// Step ids with a given status, in id order.
    pub fn with_status(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Count steps per status.
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.steps.values() {
            match record.status {
                StepStatus::Pending => counts.pending += 1,
                StepStatus::Ready => counts.ready += 1,
                StepStatus::Running => counts.running += 1,
                StepStatus::Done => counts.done += 1,
                StepStatus::Skipped => counts.skipped += 1,
                StepStatus::Failed => counts.failed += 1,
                StepStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }

    /// Whether every step ended done or skipped.
    pub fn is_complete(&self) -> bool {
        self.steps.values().all(|r| r.status.is_satisfied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub-01").join("state.yml");

        let mut state = ExecutionState::new("01", "abc");
        state.transition("bias_correct", StepStatus::Running, None);
        state.transition("bias_correct", StepStatus::Done, None);
        state.set_outputs(
            "bias_correct",
            vec![Artifact::new("bias_correct", "out_file", "/w/n4.nii.gz")],
        );
        state.save(&path).unwrap();

        let loaded = ExecutionState::load(&path).unwrap().unwrap();
        assert_eq!(loaded.subject_id, "01");
        assert_eq!(loaded.graph_hash, "abc");
        assert_eq!(loaded.status("bias_correct"), StepStatus::Done);
        assert_eq!(loaded.record("bias_correct").unwrap().outputs.len(), 1);
        assert!(loaded.updated.is_some());
    }

    #[test]
    fn load_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        assert!(ExecutionState::load(&temp.path().join("state.yml"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn load_corrupt_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.yml");
        fs::write(&path, "steps: [not, a, map").unwrap();

        let err = ExecutionState::load(&path).unwrap_err();
        assert!(matches!(err, AnatprepError::ConfigParseError { .. }));
    }

    #[test]
    fn save_uses_atomic_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.yml");

        ExecutionState::new("01", "abc").save(&path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("yml.tmp").exists());
    }

    #[test]
    fn status_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&StepStatus::Blocked).unwrap();
        assert_eq!(yaml.trim(), "blocked");
    }

    #[test]
    fn transition_stamps_times() {
        let mut state = ExecutionState::new("01", "abc");
        state.transition("a", StepStatus::Running, None);
        let record = state.record("a").unwrap();
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_none());

        state.transition("a", StepStatus::Failed, Some("exit 1".to_string()));
        let record = state.record("a").unwrap();
        assert!(record.finished_at.is_some());
        assert!(record.duration_ms().is_some());
        assert_eq!(record.message.as_deref(), Some("exit 1"));
    }

    #[test]
    fn counts_and_completion() {
        let mut state = ExecutionState::new("01", "abc");
        state.transition("a", StepStatus::Done, None);
        state.transition("b", StepStatus::Skipped, None);
        assert!(state.is_complete());

        state.transition("c", StepStatus::Blocked, None);
        let counts = state.counts();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.blocked, 1);
        assert_eq!(counts.total(), 3);
        assert!(!state.is_complete());
        assert_eq!(state.with_status(StepStatus::Blocked), vec!["c"]);
    }

    #[test]
    fn unknown_step_is_pending() {
        let state = ExecutionState::new("01", "abc");
        assert_eq!(state.status("nope"), StepStatus::Pending);
        assert!(StepStatus::Skipped.is_satisfied());
        assert!(StepStatus::Blocked.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
    }
}
