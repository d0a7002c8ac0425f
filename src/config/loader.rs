//! Configuration file discovery and loading.
//!
//! This module handles finding and loading configuration files from
//! the project directory in the correct priority order.

use crate::config::merger::layer_configs;
use crate::config::schema::AnatprepConfig;
use crate::error::{AnatprepError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project configuration directory.
pub const CONFIG_DIR: &str = ".anatprep";

/// Paths to configuration files in priority order (later overrides earlier).
///
/// Merge order:
/// 1. Project config (`.anatprep/config.yml`)
/// 2. Local overrides (`.anatprep/config.local.yml`)
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project config: .anatprep/config.yml
    pub project: Option<PathBuf>,

    /// Local overrides: .anatprep/config.local.yml
    pub project_local: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover config files for the given project root.
    pub fn discover(project_root: &Path) -> Self {
        Self {
            project: existing(project_root.join(CONFIG_DIR).join("config.yml")),
            project_local: existing(project_root.join(CONFIG_DIR).join("config.local.yml")),
        }
    }

    /// Returns all existing config paths in merge order.
    pub fn all_existing(&self) -> Vec<&PathBuf> {
        self.project.iter().chain(self.project_local.iter()).collect()
    }

    /// Check if any project config exists.
    pub fn has_project_config(&self) -> bool {
        self.project.is_some()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

/// Find the project root by walking up from `start`.
///
/// Looks for a `.anatprep` directory.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(CONFIG_DIR).is_dir() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load a single config file and parse it into [`AnatprepConfig`].
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist.
/// Returns `ConfigParseError` if the YAML is invalid.
pub fn load_config_file(path: &Path) -> Result<AnatprepConfig> {
    let value = load_config_value(path)?;
    if value.is_null() {
        return Ok(AnatprepConfig::default());
    }
    serde_yaml::from_value(value).map_err(|e| AnatprepError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parse YAML content into [`AnatprepConfig`].
pub fn parse_config(content: &str, source_path: &Path) -> Result<AnatprepConfig> {
    if content.trim().is_empty() {
        return Ok(AnatprepConfig::default());
    }
    serde_yaml::from_str(content).map_err(|e| AnatprepError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a config file as raw YAML Value (for merging).
pub fn load_config_value(path: &Path) -> Result<serde_yaml::Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AnatprepError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            AnatprepError::Io(e)
        }
    })?;

    serde_yaml::from_str(&content).map_err(|e| AnatprepError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load and merge the project config with its local overrides.
///
/// # Errors
///
/// Returns `ConfigNotFound` if no project config exists.
/// Returns `ConfigParseError` if any config file is invalid.
pub fn load_merged_config(project_root: &Path) -> Result<AnatprepConfig> {
    let paths = ConfigPaths::discover(project_root);

    if !paths.has_project_config() {
        return Err(AnatprepError::ConfigNotFound {
            path: project_root.join(CONFIG_DIR).join("config.yml"),
        });
    }

    let layers = paths
        .all_existing()
        .into_iter()
        .map(|path| load_config_value(path))
        .collect::<Result<Vec<_>>>()?;
    let merged = layer_configs(layers);

    serde_yaml::from_value(merged).map_err(|e| AnatprepError::ConfigParseError {
        path: project_root.join(CONFIG_DIR).join("config.yml"),
        message: format!("Failed to parse merged config: {}", e),
    })
}

/// Load config with optional path override.
///
/// An explicit file is loaded as-is. Without one, the project config is
/// merged with its local overrides; a project without any config runs on
/// defaults.
pub fn load_config(project_root: &Path, config_override: Option<&Path>) -> Result<AnatprepConfig> {
    if let Some(override_path) = config_override {
        return load_config_file(override_path);
    }

    match load_merged_config(project_root) {
        Err(AnatprepError::ConfigNotFound { path }) => {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(AnatprepConfig::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ReconMethod;
    use tempfile::TempDir;

    fn write_config(root: &Path, name: &str, content: &str) {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn discover_finds_project_and_local() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "config.yml", "");
        write_config(temp.path(), "config.local.yml", "");

        let paths = ConfigPaths::discover(temp.path());
        assert!(paths.has_project_config());
        assert!(paths.project_local.is_some());
        assert_eq!(paths.all_existing().len(), 2);
    }

    #[test]
    fn discover_returns_none_for_missing_configs() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::discover(temp.path());
        assert!(!paths.has_project_config());
        assert!(paths.all_existing().is_empty());
    }

    #[test]
    fn find_project_root_walks_up() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("sub-01").join("anat");
        fs::create_dir_all(&subdir).unwrap();
        fs::create_dir_all(temp.path().join(CONFIG_DIR)).unwrap();

        assert_eq!(find_project_root(&subdir), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn load_config_file_returns_not_found_error() {
        let result = load_config_file(Path::new("/nonexistent/config.yml"));
        assert!(matches!(result, Err(AnatprepError::ConfigNotFound { .. })));
    }

    #[test]
    fn parse_config_returns_parse_error_for_invalid_yaml() {
        let result = parse_config("run: [", Path::new("test.yml"));
        assert!(matches!(result, Err(AnatprepError::ConfigParseError { .. })));
    }

    #[test]
    fn unknown_recon_method_is_parse_error() {
        let result = parse_config("run:\n  recon: infant", Path::new("c.yml"));
        assert!(matches!(result, Err(AnatprepError::ConfigParseError { .. })));
    }

    #[test]
    fn load_config_file_handles_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "").unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.run.recon, ReconMethod::FreeSurfer);
    }

    #[test]
    fn load_merged_config_applies_local_overrides() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            "config.yml",
            r#"
settings:
  nprocs: 8
run:
  spaces: [MNI152NLin2009cAsym]
tools:
  n4: "N4 -i ${in.in_file} -o ${out.out_file}"
"#,
        );
        write_config(
            temp.path(),
            "config.local.yml",
            r#"
settings:
  nprocs: 2
run:
  recon: none
"#,
        );

        let config = load_merged_config(temp.path()).unwrap();

        assert_eq!(config.settings.nprocs, Some(2));
        assert_eq!(config.run.recon, ReconMethod::None);
        assert_eq!(config.run.spaces, vec!["MNI152NLin2009cAsym"]);
        assert!(config.tools.contains_key("n4"));
    }

    #[test]
    fn load_merged_config_fails_without_project_config() {
        let temp = TempDir::new().unwrap();
        let result = load_merged_config(temp.path());
        assert!(matches!(result, Err(AnatprepError::ConfigNotFound { .. })));
    }

    #[test]
    fn load_config_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), None).unwrap();
        assert!(config.tools.is_empty());
        assert!(config.run.use_t2w);
    }

    #[test]
    fn load_config_with_override_skips_merge() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "config.yml", "run:\n  recon: fastsurfer");
        let override_path = temp.path().join("custom.yml");
        fs::write(&override_path, "run:\n  hires: true").unwrap();

        let config = load_config(temp.path(), Some(&override_path)).unwrap();
        assert!(config.run.hires);
        assert_eq!(config.run.recon, ReconMethod::FreeSurfer);
    }

    #[test]
    fn load_config_with_missing_override_fails() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.yml");
        let result = load_config(temp.path(), Some(&missing));
        assert!(matches!(result, Err(AnatprepError::ConfigNotFound { .. })));
    }
}
