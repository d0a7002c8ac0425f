//! Artifacts and raw values flowing between steps.
//!
//! Steps never share memory. Everything a step consumes is either a raw
//! value supplied by the run (an input image path, the FreeSurfer subject
//! id) or an [`Artifact`] written by an upstream step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Modification fingerprint of an artifact on disk.
///
/// Freshness checks compare modification times only; the size is kept so
/// that empty (truncated) outputs can be told apart from real ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether the path is a directory.
    #[serde(default)]
    pub is_dir: bool,
}

impl Fingerprint {
    /// Read the fingerprint of a path, or `None` if it does not exist.
    pub fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from)?;
        let is_dir = metadata.is_dir();
        Some(Self {
            modified,
            size: if is_dir { 0 } else { metadata.len() },
            is_dir,
        })
    }

    /// Whether this fingerprint is at least as new as `other`.
    pub fn is_fresh_against(&self, other: &Fingerprint) -> bool {
        self.modified >= other.modified
    }
}

/// A value bound directly to an input slot, without a producing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawValue {
    /// A single file or directory.
    Path(PathBuf),
    /// Several files consumed together (e.g. all T1w runs).
    Paths(Vec<PathBuf>),
    /// A literal value (subject id, flag).
    Text(String),
}

impl RawValue {
    /// Paths referenced by this value, for freshness checks.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            RawValue::Path(p) => vec![p.as_path()],
            RawValue::Paths(ps) => ps.iter().map(|p| p.as_path()).collect(),
            RawValue::Text(_) => Vec::new(),
        }
    }

    /// Render for command-line interpolation. Multiple paths are space separated.
    pub fn render(&self) -> String {
        match self {
            RawValue::Path(p) => p.display().to_string(),
            RawValue::Paths(ps) => ps
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            RawValue::Text(t) => t.clone(),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// A named output produced by a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Producing step id.
    pub step: String,
    /// Output slot name on the producing step.
    pub slot: String,
    /// Location on disk.
    pub path: PathBuf,
    /// Fingerprint recorded when the step finished (or was found fresh).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

impl Artifact {
    /// Create an artifact reference without reading the disk.
    pub fn new(step: impl Into<String>, slot: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            step: step.into(),
            slot: slot.into(),
            path: path.into(),
            fingerprint: None,
        }
    }

    /// Refresh the fingerprint from disk.
    pub fn observed(mut self) -> Self {
        self.fingerprint = Fingerprint::of(&self.path);
        self
    }
}

/// A value handed to an operation for one input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValue {
    /// Output of an upstream step.
    Artifact(Artifact),
    /// Raw value supplied by the run.
    Raw(RawValue),
}

impl InputValue {
    /// Render for command-line interpolation.
    pub fn render(&self) -> String {
        match self {
            InputValue::Artifact(a) => a.path.display().to_string(),
            InputValue::Raw(r) => r.render(),
        }
    }

    /// Paths that must exist for this input.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            InputValue::Artifact(a) => vec![a.path.as_path()],
            InputValue::Raw(r) => r.paths(),
        }
    }
}
