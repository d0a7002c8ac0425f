//! Run report: per-step outcomes and the derivatives map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::Artifact;
use crate::error::{AnatprepError, Result};
use crate::graph::ResolvedGraph;
use crate::state::{ExecutionState, StatusCounts, StepStatus};

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step id.
    pub step: String,
    /// Operation name.
    pub operation: String,
    /// Final status.
    pub status: StepStatus,
    /// Dispatch time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message, skip reason or blocking ancestor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Artifacts produced or found fresh.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Artifact>,
}

/// Location of a published derivative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOutput {
    /// Producing step.
    pub step: String,
    /// Output slot on the producing step.
    pub slot: String,
    /// Artifact path.
    pub path: PathBuf,
}

/// Result of running (or previewing) a subject graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Participant id.
    pub subject_id: String,
    /// Hash of the resolved graph.
    pub graph_hash: String,
    /// Run start.
    pub started: DateTime<Utc>,
    /// Run end.
    pub finished: DateTime<Utc>,
    /// Nothing was executed.
    #[serde(default)]
    pub dry_run: bool,
    /// Dispatch stopped early on cancellation.
    #[serde(default)]
    pub interrupted: bool,
    /// Per-step outcomes in resolved order.
    pub steps: Vec<StepOutcome>,
    /// Canonical role → artifact, for roles whose producer finished.
    pub outputs: BTreeMap<String, RoleOutput>,
}

impl RunReport {
    /// Assemble a report from the final execution state.
    pub fn from_state(
        graph: &ResolvedGraph,
        state: &ExecutionState,
        started: DateTime<Utc>,
        interrupted: bool,
        dry_run: bool,
    ) -> Self {
        let steps = graph
            .steps()
            .iter()
            .map(|step| {
                let record = state.record(step.id()).cloned().unwrap_or_default();
                StepOutcome {
                    step: step.id().to_string(),
                    operation: step.descriptor.operation.name.clone(),
                    status: record.status,
                    started_at: record.started_at,
                    finished_at: record.finished_at,
                    message: record.message,
                    outputs: record.outputs,
                }
            })
            .collect();

        let outputs = graph
            .roles()
            .keys()
            .filter_map(|role| {
                let (slot, path) = graph.role_output(role)?;
                if !state.status(&slot.step).is_satisfied() {
                    return None;
                }
                Some((
                    role.clone(),
                    RoleOutput {
                        step: slot.step.clone(),
                        slot: slot.slot.clone(),
                        path: path.to_path_buf(),
                    },
                ))
            })
            .collect();

        Self {
            subject_id: graph.subject_id.clone(),
            graph_hash: graph.hash(),
            started,
            finished: Utc::now(),
            dry_run,
            interrupted,
            steps,
            outputs,
        }
    }

    /// Outcome of a step.
    pub fn step(&self, id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == id)
    }

    /// Ids of steps with a given status, in resolved order.
    pub fn with_status(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.step.as_str())
            .collect()
    }

    /// Count outcomes per status.
    pub fn counts(&self) -> StatusCounts {
        let mut state = ExecutionState::new(self.subject_id.clone(), self.graph_hash.clone());
        for outcome in &self.steps {
            state.steps.entry(outcome.step.clone()).or_default().status = outcome.status;
        }
        state.counts()
    }

    /// Whether every step ended done or skipped.
    pub fn success(&self) -> bool {
        !self.interrupted && self.steps.iter().all(|s| s.status.is_satisfied())
    }

    /// Process exit code: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() || self.dry_run {
            0
        } else {
            1
        }
    }

    /// Wall time of the run.
    pub fn duration_ms(&self) -> u64 {
        (self.finished - self.started).num_milliseconds().max(0) as u64
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            AnatprepError::ConfigValidationError {
                message: format!("Failed to serialize report: {}", e),
            }
        })?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Read a report written by [`RunReport::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| AnatprepError::ConfigParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::RawValue;
    use crate::graph::fragment::Fragment;
    use crate::graph::model::Graph;
    use crate::graph::resolve::resolve;
    use crate::steps::{SlotKind, StepDescriptor};
    use tempfile::TempDir;

    fn graph() -> ResolvedGraph {
        let mut vars = BTreeMap::new();
        vars.insert("work_dir".to_string(), "/w".to_string());
        let step = |id: &str| {
            StepDescriptor::builder(id, "n4")
                .input("in_file", SlotKind::Volume)
                .output("out_file", SlotKind::Volume, "${step_dir}/out.nii.gz")
                .build()
                .unwrap()
        };
        let mut f = Fragment::new();
        f.raw("t1w:0", RawValue::Path("/raw/T1w.nii.gz".into()));
        f.add_step(step("a")).from_raw("a", "in_file", "t1w:0");
        f.add_step(step("b")).from_step("b", "in_file", "a", "out_file");
        f.publish("t1w_ref", "a", "out_file");
        f.publish("t1w_preproc", "b", "out_file");
        let mut g = Graph::new("01", vars);
        g.add_fragment("anat_preproc", f).unwrap();
        resolve(g).unwrap()
    }

    #[test]
    fn outputs_only_for_finished_producers() {
        let g = graph();
        let mut state = ExecutionState::for_graph(&g);
        state.transition("a", StepStatus::Done, None);
        state.transition("b", StepStatus::Failed, Some("boom".to_string()));

        let report = RunReport::from_state(&g, &state, Utc::now(), false, false);
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(
            report.outputs["t1w_ref"].path,
            PathBuf::from("/w/a/out.nii.gz")
        );
        assert!(!report.success());
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.with_status(StepStatus::Failed), vec!["b"]);
        assert_eq!(report.step("b").unwrap().message.as_deref(), Some("boom"));
    }

    #[test]
    fn success_when_all_done_or_skipped() {
        let g = graph();
        let mut state = ExecutionState::for_graph(&g);
        state.transition("a", StepStatus::Skipped, None);
        state.transition("b", StepStatus::Done, None);

        let report = RunReport::from_state(&g, &state, Utc::now(), false, false);
        assert!(report.success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.counts().skipped, 1);
        assert_eq!(report.outputs.len(), 2);
    }

    #[test]
    fn save_and_load_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("report.json");
        let g = graph();
        let state = ExecutionState::for_graph(&g);

        RunReport::from_state(&g, &state, Utc::now(), true, false)
            .save(&path)
            .unwrap();
        let loaded = RunReport::load(&path).unwrap();
        assert!(loaded.interrupted);
        assert_eq!(loaded.steps.len(), 2);

        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"status\": \"pending\""));
    }
}
