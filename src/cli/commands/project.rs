//! Configuration and inputs shared by the commands of one invocation.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{load_config, validate, AnatprepConfig};
use crate::context::{Layout, RunContext};
use crate::error::Result;
use crate::graph::{plan, ResolvedGraph};
use crate::inputs::{AvailableInputs, InputManifest};
use crate::steps::OperationRegistry;

/// A loaded and validated project.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: AnatprepConfig,
}

impl Project {
    /// Load configuration for `root`, or from an explicit file.
    ///
    /// # Errors
    ///
    /// Configuration errors when the file is malformed or invalid.
    pub fn load(root: &Path, config_override: Option<&Path>) -> Result<Self> {
        let config = load_config(root, config_override)?;
        validate(&config)?;
        Ok(Self::new(root, config))
    }

    /// Wrap an already validated configuration.
    pub fn new(root: &Path, config: AnatprepConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &AnatprepConfig {
        &self.config
    }

    /// Mutable configuration, for command-line overrides.
    pub fn config_mut(&mut self) -> &mut AnatprepConfig {
        &mut self.config
    }

    /// Directory layout of the project.
    pub fn layout(&self) -> Layout {
        Layout::from_config(&self.config, &self.root)
    }

    /// Load the input manifest. Relative paths are taken from the project root.
    pub fn manifest(&self, path: &Path) -> Result<InputManifest> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        debug!("Loading input manifest {}", path.display());
        InputManifest::load(&path)
    }

    /// Run context of one participant.
    pub fn context(&self, subject_id: &str, inputs: &AvailableInputs) -> RunContext {
        RunContext::from_config(&self.config, &self.root, subject_id, inputs)
    }

    /// Build and resolve the graph of one participant.
    pub fn plan(
        &self,
        subject_id: &str,
        inputs: &AvailableInputs,
    ) -> Result<(RunContext, ResolvedGraph)> {
        let ctx = self.context(subject_id, inputs);
        let graph = plan(&ctx, inputs)?;
        Ok((ctx, graph))
    }

    /// Shell operations for every configured command template.
    pub fn operations(&self) -> OperationRegistry {
        OperationRegistry::from_tools(&self.config.operation_templates())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconMethod;
    use crate::inputs::ImageInput;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let project = Project::load(temp.path(), None).unwrap();
        assert_eq!(project.config().run.recon, ReconMethod::FreeSurfer);
        assert_eq!(project.layout().work_dir, temp.path().join("work"));
    }

    #[test]
    fn manifest_path_is_relative_to_root() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("inputs.yml"),
            "\"01\":\n  t1w: [raw/T1w.nii.gz]\n",
        )
        .unwrap();

        let project = Project::load(temp.path(), None).unwrap();
        let manifest = project.manifest(Path::new("inputs.yml")).unwrap();
        assert_eq!(manifest.participants(), vec!["01"]);
    }

    #[test]
    fn plans_a_participant() {
        let temp = TempDir::new().unwrap();
        let mut project = Project::load(temp.path(), None).unwrap();
        project.config_mut().run.recon = ReconMethod::None;

        let inputs = AvailableInputs {
            t1w: vec![ImageInput::new(temp.path().join("T1w.nii.gz"))],
            ..Default::default()
        };
        let (ctx, graph) = project.plan("sub-01", &inputs).unwrap();

        assert_eq!(ctx.subject_id, "01");
        assert!(graph.step("bias_correct").is_some());
        assert!(project.operations().contains("n4"));
    }
}
