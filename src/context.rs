//! Immutable per-subject run context.
//!
//! A [`RunContext`] is built once at run start from the configuration, the
//! subject's available inputs and command-line overrides. The graph builder
//! and the engine only ever read it.

use crate::config::schema::{AnatprepConfig, CiftiDensity, ReconMethod};
use crate::inputs::AvailableInputs;
use crate::steps::Resources;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z][A-Za-z0-9]*)(?P<spec>(?::[a-z]+-[A-Za-z0-9.]+)*)$").unwrap()
});

/// Spaces that name the subject's own anatomy rather than a template.
const NONSTANDARD_SPACES: &[&str] = &["T1w", "T2w", "anat", "fsnative", "run", "session"];

/// A requested output space such as `MNI152NLin6Asym:res-2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateSpace {
    /// Template (or nonstandard space) name.
    pub name: String,
    /// `key-value` qualifiers (`res-2`, `cohort-1`).
    pub spec: BTreeMap<String, String>,
}

impl TemplateSpace {
    /// Parse a space string, or `None` if it is malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let caps = SPACE_REGEX.captures(value)?;
        let name = caps.name("name")?.as_str().to_string();
        let spec = caps
            .name("spec")
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split(':')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| pair.split_once('-'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some(Self { name, spec })
    }

    /// Whether the space names the subject's own anatomy.
    pub fn is_nonstandard(&self) -> bool {
        NONSTANDARD_SPACES.contains(&self.name.as_str())
    }

    /// Whether the space is a surface template (fsaverage, fsLR).
    pub fn is_surface(&self) -> bool {
        self.name.starts_with("fsaverage") || self.name == "fsLR"
    }
}

impl fmt::Display for TemplateSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (k, v) in &self.spec {
            write!(f, ":{}-{}", k, v)?;
        }
        Ok(())
    }
}

/// Where a run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Derivatives output directory.
    pub output_dir: PathBuf,
    /// Root of the scratch area; each subject gets `sub-<id>` below it.
    pub work_dir: PathBuf,
    /// FreeSurfer subjects directory.
    pub subjects_dir: PathBuf,
}

impl Layout {
    /// Layout resolved from settings against the project root.
    pub fn from_config(config: &AnatprepConfig, root: &Path) -> Self {
        Self {
            output_dir: config.settings.output_dir(root),
            work_dir: config.settings.work_dir(root),
            subjects_dir: config.settings.subjects_dir(root),
        }
    }

    /// Layout with every directory under `root` (mostly for tests).
    pub fn under(root: &Path) -> Self {
        Self {
            output_dir: root.join("derivatives"),
            work_dir: root.join("work"),
            subjects_dir: root.join("derivatives").join("sourcedata").join("freesurfer"),
        }
    }

    /// Scratch directory of one subject.
    pub fn subject_work_dir(&self, subject_id: &str) -> PathBuf {
        self.work_dir.join(subject_label(subject_id))
    }

    /// Persisted execution state of one subject.
    pub fn state_file(&self, subject_id: &str) -> PathBuf {
        self.subject_work_dir(subject_id).join("state.yml")
    }

    /// Run report of one subject.
    pub fn report_file(&self, subject_id: &str) -> PathBuf {
        self.subject_work_dir(subject_id).join("report.json")
    }

    /// Run history of one subject.
    pub fn history_file(&self, subject_id: &str) -> PathBuf {
        self.subject_work_dir(subject_id).join("history.yml")
    }
}

/// `sub-<id>` label for a bare participant id.
pub fn subject_label(subject_id: &str) -> String {
    format!("sub-{}", subject_id.trim_start_matches("sub-"))
}

/// Everything the builder and engine need to know about one subject run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    /// Participant id without the `sub-` prefix.
    pub subject_id: String,
    /// Sessions contributing T1w images.
    pub sessions: Vec<String>,
    /// Requested output spaces, as given.
    pub spaces: Vec<String>,
    /// Refine pial surfaces with T2w when present.
    pub use_t2w: bool,
    /// Refine pial surfaces with FLAIR when present.
    pub use_flair: bool,
    /// Unbiased cross-session template.
    pub longitudinal: bool,
    /// Import existing FreeSurfer derivatives.
    pub reuse_derivatives: bool,
    /// Reconstruct from scratch even when derivatives exist.
    pub force_recompute: bool,
    /// Sub-millimeter reconstruction.
    pub hires: bool,
    /// Surface reconstruction method.
    pub recon: ReconMethod,
    /// CIFTI grayordinate output.
    pub cifti: Option<CiftiDensity>,
    /// Machine budget shared by concurrently running steps.
    pub ceiling: Resources,
    /// Threads granted to multi-threaded tools.
    pub omp_nthreads: usize,
    /// Directory layout.
    pub layout: Layout,
}

impl RunContext {
    /// Context with default options for one subject.
    pub fn new(subject_id: impl Into<String>, layout: Layout) -> Self {
        let defaults = AnatprepConfig::default();
        Self {
            subject_id: subject_id.into().trim_start_matches("sub-").to_string(),
            sessions: Vec::new(),
            spaces: defaults.run.spaces,
            use_t2w: defaults.run.use_t2w,
            use_flair: defaults.run.use_flair,
            longitudinal: defaults.run.longitudinal,
            reuse_derivatives: defaults.run.reuse_derivatives,
            force_recompute: defaults.run.force_recompute,
            hires: defaults.run.hires,
            recon: defaults.run.recon,
            cifti: defaults.run.cifti_output,
            ceiling: Resources::gib(4, 8.0),
            omp_nthreads: 2,
            layout,
        }
    }

    /// Context for `subject_id` from configuration and the subject's inputs.
    pub fn from_config(
        config: &AnatprepConfig,
        root: &Path,
        subject_id: &str,
        inputs: &AvailableInputs,
    ) -> Self {
        let settings = &config.settings;
        let run = &config.run;
        Self {
            subject_id: subject_id.trim_start_matches("sub-").to_string(),
            sessions: inputs.sessions(),
            spaces: run.spaces.clone(),
            use_t2w: run.use_t2w,
            use_flair: run.use_flair,
            longitudinal: run.longitudinal,
            reuse_derivatives: run.reuse_derivatives,
            force_recompute: run.force_recompute,
            hires: run.hires,
            recon: run.recon,
            cifti: run.cifti_output,
            ceiling: Resources::gib(settings.nprocs(), settings.mem_gb()),
            omp_nthreads: settings.omp_nthreads().min(settings.nprocs()),
            layout: Layout::from_config(config, root),
        }
    }

    /// `sub-<id>`, also used as the FreeSurfer subject name.
    pub fn subject_label(&self) -> String {
        subject_label(&self.subject_id)
    }

    /// Scratch directory of this subject.
    pub fn work_dir(&self) -> PathBuf {
        self.layout.subject_work_dir(&self.subject_id)
    }

    /// Parsed output spaces, or the first malformed entry.
    pub fn template_spaces(&self) -> std::result::Result<Vec<TemplateSpace>, String> {
        self.spaces
            .iter()
            .map(|s| TemplateSpace::parse(s).ok_or_else(|| s.clone()))
            .collect()
    }

    /// Distinct volume templates to normalize to, in request order.
    pub fn volume_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for space in self.spaces.iter().filter_map(|s| TemplateSpace::parse(s)) {
            if space.is_nonstandard() || space.is_surface() {
                continue;
            }
            if !names.contains(&space.name) {
                names.push(space.name);
            }
        }
        names
    }

    /// Variables available to every command and location template.
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("subject_id".to_string(), self.subject_label());
        vars.insert(
            "subjects_dir".to_string(),
            self.layout.subjects_dir.display().to_string(),
        );
        vars.insert(
            "work_dir".to_string(),
            self.work_dir().display().to_string(),
        );
        vars.insert(
            "output_dir".to_string(),
            self.layout.output_dir.display().to_string(),
        );
        vars
    }
}
