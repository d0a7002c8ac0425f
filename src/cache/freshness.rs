//! Output freshness checks for resume.
//!
//! A step may be skipped only when its outputs on disk are complete and
//! not older than anything it reads. Anything short of that re-runs the
//! step; a half-finished previous attempt is never trusted.

use std::fmt;
use std::path::PathBuf;

use crate::artifact::{Artifact, Fingerprint};
use crate::graph::ResolvedStep;
use crate::state::{StepRecord, StepStatus};
use crate::steps::SlotKind;

/// Why a step has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReason {
    /// The step is marked `always_run`.
    AlwaysRun,
    /// Forced from the command line.
    Forced,
    /// The step declares no outputs to check.
    NoOutputs,
    /// The previous attempt was interrupted or failed.
    PreviousAttempt(StepStatus),
    /// A producer of this step will run first (previews only).
    UpstreamRerun(String),
    /// An output does not exist.
    MissingOutput { slot: String, path: PathBuf },
    /// An output exists but is not well formed for its kind.
    MalformedOutput { slot: String, path: PathBuf, kind: SlotKind },
    /// An input path does not exist.
    MissingInput(PathBuf),
    /// An output is older than an input.
    Stale { slot: String, input: PathBuf },
}

impl fmt::Display for RunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunReason::AlwaysRun => write!(f, "always run"),
            RunReason::Forced => write!(f, "forced"),
            RunReason::NoOutputs => write!(f, "no outputs declared"),
            RunReason::PreviousAttempt(status) => write!(f, "previous attempt {}", status),
            RunReason::UpstreamRerun(step) => write!(f, "producer '{}' runs first", step),
            RunReason::MissingOutput { slot, path } => {
                write!(f, "output '{}' missing ({})", slot, path.display())
            }
            RunReason::MalformedOutput { slot, path, kind } => write!(
                f,
                "output '{}' is not a valid {} ({})",
                slot,
                kind,
                path.display()
            ),
            RunReason::MissingInput(path) => write!(f, "input {} missing", path.display()),
            RunReason::Stale { slot, input } => {
                write!(f, "output '{}' older than {}", slot, input.display())
            }
        }
    }
}

/// Outcome of [`should_skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipDecision {
    /// Outputs are fresh; the observed artifacts are returned.
    Skip(Vec<Artifact>),
    /// The step must run.
    Run(RunReason),
}

impl SkipDecision {
    /// Whether the step can be skipped.
    pub fn is_skip(&self) -> bool {
        matches!(self, SkipDecision::Skip(_))
    }

    /// Whether the decision contradicts a persisted `done` record, i.e.
    /// outputs recorded as produced are gone or damaged.
    pub fn is_resume_inconsistency(&self, record: Option<&StepRecord>) -> bool {
        let was_done = record.is_some_and(|r| r.status == StepStatus::Done);
        was_done
            && matches!(
                self,
                SkipDecision::Run(RunReason::MissingOutput { .. })
                    | SkipDecision::Run(RunReason::MalformedOutput { .. })
            )
    }
}

fn well_formed(kind: SlotKind, fingerprint: &Fingerprint) -> bool {
    match kind {
        SlotKind::Directory => fingerprint.is_dir,
        SlotKind::Value => true,
        _ => !fingerprint.is_dir && fingerprint.size > 0,
    }
}

/// Decide whether a step can be skipped.
///
/// `record` is the persisted record from an earlier run of the same graph,
/// if any. `forced` comes from `--force`.
pub fn should_skip(step: &ResolvedStep, record: Option<&StepRecord>, forced: bool) -> SkipDecision {
    if forced {
        return SkipDecision::Run(RunReason::Forced);
    }
    if step.descriptor.always_run {
        return SkipDecision::Run(RunReason::AlwaysRun);
    }
    if let Some(record) = record {
        if matches!(record.status, StepStatus::Running | StepStatus::Failed) {
            return SkipDecision::Run(RunReason::PreviousAttempt(record.status));
        }
    }
    if step.outputs.is_empty() {
        return SkipDecision::Run(RunReason::NoOutputs);
    }

    let mut artifacts = Vec::with_capacity(step.outputs.len());
    for (slot, path) in &step.outputs {
        let kind = step
            .descriptor
            .output(slot)
            .map(|spec| spec.kind)
            .unwrap_or(SlotKind::Value);
        let Some(fingerprint) = Fingerprint::of(path) else {
            return SkipDecision::Run(RunReason::MissingOutput {
                slot: slot.clone(),
                path: path.clone(),
            });
        };
        if !well_formed(kind, &fingerprint) {
            return SkipDecision::Run(RunReason::MalformedOutput {
                slot: slot.clone(),
                path: path.clone(),
                kind,
            });
        }
        artifacts.push((slot, path, fingerprint));
    }

    for input in step.input_paths() {
        let Some(input_print) = Fingerprint::of(input) else {
            return SkipDecision::Run(RunReason::MissingInput(input.to_path_buf()));
        };
        if let Some((slot, _, _)) = artifacts
            .iter()
            .find(|(_, _, output)| !output.is_fresh_against(&input_print))
        {
            return SkipDecision::Run(RunReason::Stale {
                slot: (*slot).clone(),
                input: input.to_path_buf(),
            });
        }
    }

    SkipDecision::Skip(
        artifacts
            .into_iter()
            .map(|(slot, path, fingerprint)| Artifact {
                step: step.id().to_string(),
                slot: slot.clone(),
                path: path.clone(),
                fingerprint: Some(fingerprint),
            })
            .collect(),
    )
}

/// Collect the artifacts of a finished step, reading fingerprints from disk.
pub fn observe_outputs(step: &ResolvedStep) -> Vec<Artifact> {
    step.outputs
        .iter()
        .map(|(slot, path)| Artifact::new(step.id(), slot.clone(), path.clone()).observed())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::RawValue;
    use crate::graph::fragment::Fragment;
    use crate::graph::model::Graph;
    use crate::graph::resolve::resolve;
    use crate::graph::ResolvedGraph;
    use crate::steps::StepDescriptor;
    use std::collections::BTreeMap;
    use std::fs::{self, File};
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn set_mtime(path: &Path, age_secs: u64) {
        let time = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn graph(root: &Path, always_run: bool) -> ResolvedGraph {
        let mut vars = BTreeMap::new();
        vars.insert("work_dir".to_string(), root.join("work").display().to_string());

        let mut builder = StepDescriptor::builder("bias_correct", "n4")
            .input("in_file", SlotKind::Volume)
            .output("out_file", SlotKind::Volume, "${step_dir}/n4.nii.gz")
            .output("report", SlotKind::Directory, "${step_dir}/report");
        if always_run {
            builder = builder.always_run();
        }

        let mut f = Fragment::new();
        f.raw("t1w:0", RawValue::Path(root.join("T1w.nii.gz")));
        f.add_step(builder.build().unwrap())
            .from_raw("bias_correct", "in_file", "t1w:0");
        let mut g = Graph::new("01", vars);
        g.add_fragment("anat_preproc", f).unwrap();
        resolve(g).unwrap()
    }

    fn materialize(root: &Path) {
        fs::write(root.join("T1w.nii.gz"), b"raw").unwrap();
        set_mtime(&root.join("T1w.nii.gz"), 100);
        let step_dir = root.join("work").join("bias_correct");
        fs::create_dir_all(step_dir.join("report")).unwrap();
        fs::write(step_dir.join("n4.nii.gz"), b"n4").unwrap();
    }

    #[test]
    fn fresh_outputs_skip() {
        let temp = TempDir::new().unwrap();
        materialize(temp.path());
        let g = graph(temp.path(), false);

        let decision = should_skip(&g.steps()[0], None, false);
        match decision {
            SkipDecision::Skip(artifacts) => {
                assert_eq!(artifacts.len(), 2);
                assert!(artifacts.iter().all(|a| a.fingerprint.is_some()));
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn missing_output_runs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("T1w.nii.gz"), b"raw").unwrap();
        let g = graph(temp.path(), false);

        let decision = should_skip(&g.steps()[0], None, false);
        assert!(matches!(
            decision,
            SkipDecision::Run(RunReason::MissingOutput { .. })
        ));
    }

    #[test]
    fn empty_file_is_malformed() {
        let temp = TempDir::new().unwrap();
        materialize(temp.path());
        fs::write(temp.path().join("work/bias_correct/n4.nii.gz"), b"").unwrap();
        let g = graph(temp.path(), false);

        let decision = should_skip(&g.steps()[0], None, false);
        assert!(matches!(
            decision,
            SkipDecision::Run(RunReason::MalformedOutput { ref slot, .. }) if slot == "out_file"
        ));
    }

    #[test]
    fn file_in_place_of_directory_is_malformed() {
        let temp = TempDir::new().unwrap();
        materialize(temp.path());
        let report = temp.path().join("work/bias_correct/report");
        fs::remove_dir(&report).unwrap();
        fs::write(&report, b"x").unwrap();
        let g = graph(temp.path(), false);

        assert!(matches!(
            should_skip(&g.steps()[0], None, false),
            SkipDecision::Run(RunReason::MalformedOutput { kind: SlotKind::Directory, .. })
        ));
    }

    #[test]
    fn older_output_is_stale() {
        let temp = TempDir::new().unwrap();
        materialize(temp.path());
        set_mtime(&temp.path().join("work/bias_correct/n4.nii.gz"), 500);
        let g = graph(temp.path(), false);

        assert!(matches!(
            should_skip(&g.steps()[0], None, false),
            SkipDecision::Run(RunReason::Stale { ref slot, .. }) if slot == "out_file"
        ));
    }

    #[test]
    fn forced_and_always_run_never_skip() {
        let temp = TempDir::new().unwrap();
        materialize(temp.path());

        let g = graph(temp.path(), false);
        assert_eq!(
            should_skip(&g.steps()[0], None, true),
            SkipDecision::Run(RunReason::Forced)
        );

        let g = graph(temp.path(), true);
        assert_eq!(
            should_skip(&g.steps()[0], None, false),
            SkipDecision::Run(RunReason::AlwaysRun)
        );
    }

    #[test]
    fn interrupted_or_failed_attempt_reruns() {
        let temp = TempDir::new().unwrap();
        materialize(temp.path());
        let g = graph(temp.path(), false);

        for status in [StepStatus::Running, StepStatus::Failed] {
            let record = StepRecord {
                status,
                ..Default::default()
            };
            assert_eq!(
                should_skip(&g.steps()[0], Some(&record), false),
                SkipDecision::Run(RunReason::PreviousAttempt(status))
            );
        }

        let done = StepRecord {
            status: StepStatus::Done,
            ..Default::default()
        };
        assert!(should_skip(&g.steps()[0], Some(&done), false).is_skip());
    }

    #[test]
    fn resume_inconsistency_needs_done_record() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("T1w.nii.gz"), b"raw").unwrap();
        let g = graph(temp.path(), false);
        let decision = should_skip(&g.steps()[0], None, false);

        let done = StepRecord {
            status: StepStatus::Done,
            ..Default::default()
        };
        assert!(decision.is_resume_inconsistency(Some(&done)));
        assert!(!decision.is_resume_inconsistency(None));
    }
}
