//! Run history recording.
//!
//! Each subject keeps a short list of [`RunRecord`]s (most recent first) in
//! `<work>/sub-<id>/history.yml`. [`RunHistoryBuilder`] collects the record
//! while the engine runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{AnatprepError, Result};

/// A record of a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// When the run started.
    pub timestamp: DateTime<Utc>,

    /// Participant id.
    pub subject_id: String,

    /// Hash of the resolved graph.
    pub graph_hash: String,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Overall status.
    pub status: RunStatus,

    /// Steps that were executed.
    #[serde(default)]
    pub steps_run: Vec<String>,

    /// Steps whose outputs were fresh.
    #[serde(default)]
    pub steps_skipped: Vec<String>,

    /// Steps that failed.
    #[serde(default)]
    pub steps_failed: Vec<String>,

    /// Steps blocked by a failed ancestor.
    #[serde(default)]
    pub steps_blocked: Vec<String>,
}

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Interrupted,
}

/// Helper for building run history.
pub struct RunHistoryBuilder {
    subject_id: String,
    graph_hash: String,
    start_time: DateTime<Utc>,
    steps_run: Vec<String>,
    steps_skipped: Vec<String>,
    steps_failed: Vec<String>,
    steps_blocked: Vec<String>,
}

impl RunHistoryBuilder {
    /// Start a new run record.
    pub fn start(subject_id: &str, graph_hash: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            graph_hash: graph_hash.to_string(),
            start_time: Utc::now(),
            steps_run: Vec::new(),
            steps_skipped: Vec::new(),
            steps_failed: Vec::new(),
            steps_blocked: Vec::new(),
        }
    }

    /// Record a step as executed.
    pub fn step_run(&mut self, step: &str) {
        self.steps_run.push(step.to_string());
    }

    /// Record a step as skipped.
    pub fn step_skipped(&mut self, step: &str) {
        self.steps_skipped.push(step.to_string());
    }

    /// Record a step as failed.
    pub fn step_failed(&mut self, step: &str) {
        self.steps_failed.push(step.to_string());
    }

    /// Record a step as blocked.
    pub fn step_blocked(&mut self, step: &str) {
        self.steps_blocked.push(step.to_string());
    }

    /// Finish the record. The status follows from the recorded steps unless
    /// the run was interrupted.
    pub fn finish(self, interrupted: bool) -> RunRecord {
        let status = if interrupted {
            RunStatus::Interrupted
        } else if self.steps_failed.is_empty() && self.steps_blocked.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };

        RunRecord {
            timestamp: self.start_time,
            subject_id: self.subject_id,
            graph_hash: self.graph_hash,
            duration_ms: (Utc::now() - self.start_time).num_milliseconds().max(0) as u64,
            status,
            steps_run: self.steps_run,
            steps_skipped: self.steps_skipped,
            steps_failed: self.steps_failed,
            steps_blocked: self.steps_blocked,
        }
    }
}

/// Persisted run history of one subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunHistory {
    /// Records, most recent first.
    #[serde(default)]
    pub runs: Vec<RunRecord>,
}

impl RunHistory {
    /// Load history, or an empty history if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| AnatprepError::ConfigParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save history with the same temp-then-rename write as the state file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content =
            serde_yaml::to_string(self).map_err(|e| AnatprepError::ConfigValidationError {
                message: format!("Failed to serialize history: {}", e),
            })?;

        let temp_path = path.with_extension("yml.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Add a record at the front, keeping at most `retention` records.
    pub fn record(&mut self, record: RunRecord, retention: usize) {
        self.runs.insert(0, record);
        self.runs.truncate(retention.max(1));
    }

    /// Most recent run.
    pub fn last(&self) -> Option<&RunRecord> {
        self.runs.first()
    }

    /// Up to `limit` most recent runs.
    pub fn recent(&self, limit: usize) -> &[RunRecord] {
        &self.runs[..self.runs.len().min(limit)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builder_success() {
        let mut builder = RunHistoryBuilder::start("01", "abc");
        builder.step_run("bias_correct");
        builder.step_skipped("t1w_conform_0");

        let record = builder.finish(false);

        assert_eq!(record.subject_id, "01");
        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.steps_run, vec!["bias_correct"]);
        assert_eq!(record.steps_skipped, vec!["t1w_conform_0"]);
    }

    #[test]
    fn builder_failed_when_blocked() {
        let mut builder = RunHistoryBuilder::start("01", "abc");
        builder.step_failed("brain_extraction");
        builder.step_blocked("tissue_segmentation");

        let record = builder.finish(false);
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.steps_blocked, vec!["tissue_segmentation"]);
    }

    #[test]
    fn builder_interrupted_wins() {
        let mut builder = RunHistoryBuilder::start("01", "abc");
        builder.step_failed("a");
        assert_eq!(builder.finish(true).status, RunStatus::Interrupted);
    }

    #[test]
    fn retention_keeps_most_recent() {
        let mut history = RunHistory::default();
        for i in 0..5 {
            let mut builder = RunHistoryBuilder::start("01", &format!("h{}", i));
            builder.step_run("a");
            history.record(builder.finish(false), 3);
        }

        assert_eq!(history.runs.len(), 3);
        assert_eq!(history.last().unwrap().graph_hash, "h4");
        assert_eq!(history.recent(2).len(), 2);
        assert_eq!(history.recent(10).len(), 3);
    }

    #[test]
    fn save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.yml");

        let mut history = RunHistory::default();
        history.record(RunHistoryBuilder::start("01", "abc").finish(false), 10);
        history.save(&path).unwrap();

        let loaded = RunHistory::load(&path).unwrap();
        assert_eq!(loaded.runs.len(), 1);
        assert_eq!(loaded.runs[0].status, RunStatus::Success);
        assert!(!path.with_extension("yml.tmp").exists());
    }

    #[test]
    fn load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let history = RunHistory::load(&temp.path().join("history.yml")).unwrap();
        assert!(history.runs.is_empty());
    }
}
