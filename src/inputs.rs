//! Input manifest produced by dataset discovery.
//!
//! The manifest maps participants to their raw images and any pre-existing
//! derivatives:
//!
//! ```yaml
//! "01":
//!   t1w:
//!     - path: sub-01/ses-1/anat/sub-01_ses-1_T1w.nii.gz
//!       session: "1"
//!     - sub-01/ses-2/anat/sub-01_ses-2_T1w.nii.gz
//!   t2w: [sub-01/ses-1/anat/sub-01_ses-1_T2w.nii.gz]
//!   derivatives:
//!     freesurfer: derivatives/sourcedata/freesurfer/sub-01
//! ```
//!
//! JSON manifests with the same shape are accepted. Relative paths are
//! resolved against the manifest's directory.

use crate::error::{AnatprepError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One raw image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ImageEntry")]
pub struct ImageInput {
    /// Image path.
    pub path: PathBuf,
    /// Session label, if the dataset has sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl ImageInput {
    /// Image without a session.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session: None,
        }
    }

    /// Tag the image with a session label.
    pub fn in_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageEntry {
    Bare(PathBuf),
    Full {
        path: PathBuf,
        #[serde(default)]
        session: Option<String>,
    },
}

impl From<ImageEntry> for ImageInput {
    fn from(entry: ImageEntry) -> Self {
        match entry {
            ImageEntry::Bare(path) => ImageInput::new(path),
            ImageEntry::Full { path, session } => ImageInput { path, session },
        }
    }
}

/// Pre-existing derivatives for one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Derivatives {
    /// FreeSurfer subject directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freesurfer: Option<PathBuf>,

    /// Whether the FreeSurfer directory was found on disk when the manifest
    /// was loaded.
    #[serde(skip)]
    pub freesurfer_present: bool,
}

/// Raw inputs and derivatives available for one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailableInputs {
    /// T1-weighted images.
    pub t1w: Vec<ImageInput>,
    /// T2-weighted images.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub t2w: Vec<ImageInput>,
    /// FLAIR images.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flair: Vec<ImageInput>,
    /// Existing derivatives.
    pub derivatives: Derivatives,
}

impl AvailableInputs {
    /// Distinct sessions of the T1w images, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .t1w
            .iter()
            .filter_map(|img| img.session.clone())
            .collect();
        sessions.sort();
        sessions.dedup();
        sessions
    }

    /// T1w image paths in manifest order.
    pub fn t1w_paths(&self) -> Vec<PathBuf> {
        self.t1w.iter().map(|img| img.path.clone()).collect()
    }

    /// First T2w image, if any.
    pub fn t2w_image(&self) -> Option<&Path> {
        self.t2w.first().map(|img| img.path.as_path())
    }

    /// First FLAIR image, if any.
    pub fn flair_image(&self) -> Option<&Path> {
        self.flair.first().map(|img| img.path.as_path())
    }

    /// Existing FreeSurfer derivatives directory, if listed.
    pub fn freesurfer_derivatives(&self) -> Option<&Path> {
        self.derivatives.freesurfer.as_deref()
    }

    fn resolve_paths(&mut self, base: &Path) {
        for img in self
            .t1w
            .iter_mut()
            .chain(self.t2w.iter_mut())
            .chain(self.flair.iter_mut())
        {
            img.path = base.join(&img.path);
        }
        if let Some(dir) = self.derivatives.freesurfer.take() {
            let dir = base.join(dir);
            self.derivatives.freesurfer_present = dir.is_dir();
            self.derivatives.freesurfer = Some(dir);
        }
    }
}

/// All participants listed by dataset discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputManifest {
    subjects: BTreeMap<String, AvailableInputs>,
}

impl InputManifest {
    /// Load a YAML or JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` if the file is missing and `ConfigParseError`
    /// if it is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AnatprepError::ConfigNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                AnatprepError::Io(e)
            }
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, path, base)
    }

    /// Parse manifest content, resolving relative paths against `base`.
    pub fn parse(content: &str, source: &Path, base: &Path) -> Result<Self> {
        let raw: BTreeMap<String, AvailableInputs> =
            serde_yaml::from_str(content).map_err(|e| AnatprepError::ConfigParseError {
                path: source.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut subjects = BTreeMap::new();
        for (label, mut inputs) in raw {
            inputs.resolve_paths(base);
            subjects.insert(label.trim_start_matches("sub-").to_string(), inputs);
        }
        Ok(Self { subjects })
    }

    /// Participant ids (without `sub-`), sorted.
    pub fn participants(&self) -> Vec<&str> {
        self.subjects.keys().map(|s| s.as_str()).collect()
    }

    /// Inputs of one participant.
    pub fn subject(&self, subject_id: &str) -> Result<&AvailableInputs> {
        let id = subject_id.trim_start_matches("sub-");
        self.subjects
            .get(id)
            .ok_or_else(|| AnatprepError::Configuration {
                subject: id.to_string(),
                message: "participant is not listed in the input manifest".to_string(),
            })
    }

    /// Participants to process: all of them, or the requested subset in
    /// request order.
    pub fn select(&self, requested: &[String]) -> Result<Vec<(String, &AvailableInputs)>> {
        if requested.is_empty() {
            return Ok(self
                .subjects
                .iter()
                .map(|(id, inputs)| (id.clone(), inputs))
                .collect());
        }

        requested
            .iter()
            .map(|id| {
                let inputs = self.subject(id)?;
                Ok((id.trim_start_matches("sub-").to_string(), inputs))
            })
            .collect()
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// Whether the manifest lists no participants.
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_bare_and_full_image_entries() {
        let yaml = r#"
sub-01:
  t1w:
    - path: a/T1w.nii.gz
      session: "1"
    - b/T1w.nii.gz
"#;
        let manifest = InputManifest::parse(yaml, Path::new("m.yml"), Path::new("/bids")).unwrap();

        let inputs = manifest.subject("01").unwrap();
        assert_eq!(inputs.t1w.len(), 2);
        assert_eq!(inputs.t1w[0].path, PathBuf::from("/bids/a/T1w.nii.gz"));
        assert_eq!(inputs.t1w[0].session.as_deref(), Some("1"));
        assert_eq!(inputs.t1w[1].session, None);
        assert_eq!(inputs.sessions(), vec!["1"]);
    }

    #[test]
    fn accepts_json() {
        let json = r#"{"02": {"t1w": ["/abs/T1w.nii.gz"], "t2w": ["/abs/T2w.nii.gz"]}}"#;
        let manifest = InputManifest::parse(json, Path::new("m.json"), Path::new("/x")).unwrap();

        let inputs = manifest.subject("sub-02").unwrap();
        assert_eq!(inputs.t1w_paths(), vec![PathBuf::from("/abs/T1w.nii.gz")]);
        assert_eq!(inputs.t2w_image(), Some(Path::new("/abs/T2w.nii.gz")));
        assert!(inputs.flair_image().is_none());
    }

    #[test]
    fn load_probes_derivatives_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("fs/sub-01")).unwrap();
        let manifest_path = temp.path().join("inputs.yml");
        fs::write(
            &manifest_path,
            r#"
"01":
  t1w: [T1w.nii.gz]
  derivatives:
    freesurfer: fs/sub-01
"02":
  t1w: [T1w.nii.gz]
  derivatives:
    freesurfer: fs/sub-02
"#,
        )
        .unwrap();

        let manifest = InputManifest::load(&manifest_path).unwrap();

        let one = manifest.subject("01").unwrap();
        assert!(one.derivatives.freesurfer_present);
        assert_eq!(
            one.freesurfer_derivatives(),
            Some(temp.path().join("fs/sub-01").as_path())
        );
        assert!(!manifest.subject("02").unwrap().derivatives.freesurfer_present);
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let result = InputManifest::load(Path::new("/nonexistent/inputs.yml"));
        assert!(matches!(result, Err(AnatprepError::ConfigNotFound { .. })));
    }

    #[test]
    fn malformed_manifest_is_parse_error() {
        let result = InputManifest::parse("01: [", Path::new("m.yml"), Path::new("/"));
        assert!(matches!(result, Err(AnatprepError::ConfigParseError { .. })));
    }

    #[test]
    fn unknown_participant_is_configuration_error() {
        let manifest = InputManifest::parse("'01': {t1w: [a.nii]}", Path::new("m"), Path::new("/"))
            .unwrap();
        let err = manifest.subject("07").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("'07'"));
    }

    #[test]
    fn select_all_or_subset() {
        let manifest = InputManifest::parse(
            "'02': {t1w: [a.nii]}\n'01': {t1w: [b.nii]}",
            Path::new("m"),
            Path::new("/"),
        )
        .unwrap();

        let all = manifest.select(&[]).unwrap();
        assert_eq!(
            all.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            vec!["01", "02"]
        );

        let subset = manifest.select(&["sub-02".to_string()]).unwrap();
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].0, "02");

        assert!(manifest.select(&["03".to_string()]).is_err());
    }
}
