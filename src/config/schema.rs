//! Configuration schema definitions for anatprep.
//!
//! This module contains the struct definitions that map to the
//! `.anatprep/config.yml` file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Root configuration structure for `.anatprep/config.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnatprepConfig {
    /// Directories and machine resources
    pub settings: Settings,

    /// Pipeline options
    pub run: RunSettings,

    /// Operation name -> command template overrides
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, String>,
}

impl AnatprepConfig {
    /// Built-in command templates overlaid with the configured ones.
    pub fn operation_templates(&self) -> BTreeMap<String, String> {
        let mut templates = default_tools();
        for (name, template) in &self.tools {
            templates.insert(name.clone(), template.clone());
        }
        templates
    }
}

/// Directory layout and resource settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Derivatives output directory (relative to the project root)
    pub output_dir: PathBuf,

    /// Scratch directory for step outputs, state and reports
    pub work_dir: PathBuf,

    /// FreeSurfer subjects directory (default: `<output_dir>/sourcedata/freesurfer`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjects_dir: Option<PathBuf>,

    /// CPU threads available to the run (default: all cores)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nprocs: Option<usize>,

    /// Memory available to the run, in GB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_gb: Option<f64>,

    /// Threads granted to each multi-threaded tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omp_nthreads: Option<usize>,

    /// Number of run records kept per subject
    #[serde(
        default = "default_history_retention",
        skip_serializing_if = "is_default_history_retention"
    )]
    pub history_retention: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("derivatives"),
            work_dir: PathBuf::from("work"),
            subjects_dir: None,
            nprocs: None,
            mem_gb: None,
            omp_nthreads: None,
            history_retention: default_history_retention(),
        }
    }
}

impl Settings {
    /// Output directory resolved against the project root.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.output_dir)
    }

    /// Work directory resolved against the project root.
    pub fn work_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.work_dir)
    }

    /// Subjects directory resolved against the project root.
    pub fn subjects_dir(&self, root: &Path) -> PathBuf {
        match &self.subjects_dir {
            Some(dir) => root.join(dir),
            None => self
                .output_dir(root)
                .join("sourcedata")
                .join("freesurfer"),
        }
    }

    /// Effective CPU thread budget.
    pub fn nprocs(&self) -> usize {
        self.nprocs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Effective memory budget in GB.
    pub fn mem_gb(&self) -> f64 {
        self.mem_gb.unwrap_or(default_mem_gb())
    }

    /// Effective per-tool thread count.
    pub fn omp_nthreads(&self) -> usize {
        self.omp_nthreads
            .unwrap_or_else(|| self.nprocs().saturating_sub(1).clamp(1, 8))
    }
}

fn default_mem_gb() -> f64 {
    8.0
}

fn default_history_retention() -> usize {
    20
}

fn is_default_history_retention(v: &usize) -> bool {
    *v == default_history_retention()
}

/// Pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Output template spaces (e.g. `MNI152NLin2009cAsym`, `MNI152NLin6Asym:res-2`)
    pub spaces: Vec<String>,

    /// Surface reconstruction method
    pub recon: ReconMethod,

    /// Refine pial surfaces with a T2w image when one is available
    pub use_t2w: bool,

    /// Refine pial surfaces with a FLAIR image when one is available
    pub use_flair: bool,

    /// Build an unbiased template across sessions
    pub longitudinal: bool,

    /// Import existing FreeSurfer derivatives listed in the manifest
    pub reuse_derivatives: bool,

    /// Reconstruct surfaces from scratch even when derivatives exist
    pub force_recompute: bool,

    /// Sub-millimeter reconstruction
    pub hires: bool,

    /// Emit CIFTI grayordinate morphometrics at this density
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cifti_output: Option<CiftiDensity>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            spaces: vec!["MNI152NLin2009cAsym".to_string()],
            recon: ReconMethod::FreeSurfer,
            use_t2w: true,
            use_flair: false,
            longitudinal: false,
            reuse_derivatives: true,
            force_recompute: false,
            hires: false,
            cifti_output: None,
        }
    }
}

/// Surface reconstruction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconMethod {
    /// FreeSurfer `recon-all`, split into resumable phases
    #[default]
    FreeSurfer,
    /// FastSurfer segmentation and surface pipeline
    FastSurfer,
    /// No surface reconstruction
    None,
}

impl ReconMethod {
    /// Whether surfaces are reconstructed at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ReconMethod::None)
    }
}

impl fmt::Display for ReconMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconMethod::FreeSurfer => "freesurfer",
            ReconMethod::FastSurfer => "fastsurfer",
            ReconMethod::None => "none",
        };
        f.write_str(s)
    }
}

/// CIFTI grayordinate density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CiftiDensity {
    /// 91,282 grayordinates (32k fsLR meshes)
    #[serde(rename = "91k")]
    K91,
    /// 170,494 grayordinates (59k fsLR meshes)
    #[serde(rename = "170k")]
    K170,
}

impl CiftiDensity {
    /// Label used in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            CiftiDensity::K91 => "91k",
            CiftiDensity::K170 => "170k",
        }
    }

    /// Vertex density of the matching fsLR meshes.
    pub fn mesh_density(&self) -> &'static str {
        match self {
            CiftiDensity::K91 => "32k",
            CiftiDensity::K170 => "59k",
        }
    }
}

impl fmt::Display for CiftiDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command templates for every operation the built-in rules reference.
pub fn default_tools() -> BTreeMap<String, String> {
    let entries = [
        (
            "conform",
            "mri_convert --conform_min ${in.in_file} ${out.out_file}",
        ),
        (
            "robust_template",
            "mri_robust_template --mov ${in.*} --template ${out.out_file} --satit --iscale ${param.flags}",
        ),
        (
            "n4",
            "N4BiasFieldCorrection -d 3 -i ${in.in_file} -o ${out.out_file} -s 4",
        ),
        (
            "brain_extraction",
            "antsBrainExtraction.sh -d 3 -a ${in.in_file} -e ${param.template} -m ${param.template} -o ${step_dir}/ && mv ${step_dir}/BrainExtractionMask.nii.gz ${out.out_mask} && mv ${step_dir}/BrainExtractionBrain.nii.gz ${out.out_brain}",
        ),
        (
            "fast",
            "fast -N -g -t 1 -o ${step_dir}/segment ${in.in_file} && mv ${step_dir}/segment_seg.nii.gz ${out.out_dseg} && fslmerge -t ${out.out_tpms} ${step_dir}/segment_pve_*.nii.gz",
        ),
        (
            "ants_registration",
            "antsRegistrationSyN.sh -d 3 -n ${threads} -f ${param.template} -m ${in.moving_image} -x ${in.moving_mask} -o ${step_dir}/ && mv ${step_dir}/Warped.nii.gz ${out.warped} && mv ${step_dir}/0GenericAffine.mat ${out.anat2std_xfm} && cp ${out.anat2std_xfm} ${out.std2anat_xfm}",
        ),
        (
            "recon_all",
            "recon-all -sd ${subjects_dir} -s ${subject_id} -openmp ${threads} ${param.directive} ${param.flags}",
        ),
        (
            "recon_all_init",
            "recon-all -sd ${subjects_dir} -s ${subject_id} -i ${in.t1w_files} -autorecon1 -noskullstrip -noT2pial -noFLAIRpial -openmp ${threads} ${param.flags}",
        ),
        (
            "recon_all_refine",
            "recon-all -sd ${subjects_dir} -s ${subject_id} -openmp ${threads} -${param.contrast} ${in.image} -${param.contrast}pial ${param.flags}",
        ),
        (
            "fs_inject_brainmask",
            "mri_mask ${in.t1} ${in.brain} ${out.brainmask_auto} && cp ${out.brainmask_auto} ${out.brainmask}",
        ),
        (
            "fastsurfer_seg",
            "run_fastsurfer.sh --sd ${subjects_dir} --sid ${subject_id} --t1 ${in.t1w_file} --seg_only --threads ${threads}",
        ),
        (
            "fastsurfer_surf",
            "run_fastsurfer.sh --sd ${subjects_dir} --sid ${subject_id} --surf_only --threads ${threads} --hemi ${param.hemi}",
        ),
        (
            "fs_import",
            "mkdir -p ${subjects_dir}/${subject_id} && if [ \"$(cd ${in.source_dir} && pwd -P)\" != \"$(cd ${subjects_dir}/${subject_id} && pwd -P)\" ]; then cp -R ${in.source_dir}/. ${subjects_dir}/${subject_id}/; fi",
        ),
        (
            "fs_register",
            "mri_robust_register --mov ${in.moving} --dst ${in.reference} --lta ${out.out_xfm} --satit --iscale",
        ),
        (
            "lta_invert",
            "lta_convert --inlta ${in.in_xfm} --outlta ${out.out_xfm} --invert",
        ),
        (
            "fs_resample_seg",
            "mri_vol2vol --mov ${in.seg} --targ ${in.reference} --lta ${in.transform} --o ${out.out_file} --nearest",
        ),
        (
            "refine_brainmask",
            "mri_binarize --i ${in.in_aseg} --min 0.5 --dilate 1 --mask ${in.in_mask} --o ${out.out_mask}",
        ),
        (
            "fs_to_gifti",
            "mris_convert --to-scanner ${in.white} ${out.white} && mris_convert --to-scanner ${in.pial} ${out.pial} && mris_convert --to-scanner ${in.inflated} ${out.inflated} && wb_command -surface-average ${out.midthickness} -surf ${out.white} -surf ${out.pial}",
        ),
        (
            "fs_morph_to_gifti",
            "mris_convert -c ${in.thickness} ${in.white} ${out.thickness} && mris_convert -c ${in.curv} ${in.white} ${out.curv} && mris_convert -c ${in.sulc} ${in.white} ${out.sulc}",
        ),
        (
            "anat_ribbon",
            "wb_command -create-signed-distance-volume ${in.lh_white} ${in.reference} ${step_dir}/lh_white.nii.gz && wb_command -create-signed-distance-volume ${in.lh_pial} ${in.reference} ${step_dir}/lh_pial.nii.gz && wb_command -create-signed-distance-volume ${in.rh_white} ${in.reference} ${step_dir}/rh_white.nii.gz && wb_command -create-signed-distance-volume ${in.rh_pial} ${in.reference} ${step_dir}/rh_pial.nii.gz && fslmaths ${step_dir}/lh_pial.nii.gz -mul ${step_dir}/lh_white.nii.gz -uthr 0 -abs -bin ${out.ribbon}",
        ),
        (
            "resample_fslr",
            "wb_command -metric-resample ${in.thickness} ${in.sphere_reg} ${param.target_sphere} ADAP_BARY_AREA ${out.thickness} -area-surfs ${in.midthickness} ${param.target_midthickness} && wb_command -metric-resample ${in.curv} ${in.sphere_reg} ${param.target_sphere} ADAP_BARY_AREA ${out.curv} -area-surfs ${in.midthickness} ${param.target_midthickness} && wb_command -metric-resample ${in.sulc} ${in.sphere_reg} ${param.target_sphere} ADAP_BARY_AREA ${out.sulc} -area-surfs ${in.midthickness} ${param.target_midthickness}",
        ),
        (
            "morph_grayords",
            "wb_command -cifti-create-dense-scalar ${out.thickness} -left-metric ${in.lh_thickness} -right-metric ${in.rh_thickness} && wb_command -cifti-create-dense-scalar ${out.curv} -left-metric ${in.lh_curv} -right-metric ${in.rh_curv} && wb_command -cifti-create-dense-scalar ${out.sulc} -left-metric ${in.lh_sulc} -right-metric ${in.rh_sulc}",
        ),
    ];

    entries
        .into_iter()
        .map(|(name, template)| (name.to_string(), template.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: AnatprepConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.run.recon, ReconMethod::FreeSurfer);
        assert!(config.run.use_t2w);
        assert!(!config.run.use_flair);
        assert_eq!(config.run.spaces, vec!["MNI152NLin2009cAsym"]);
        assert_eq!(config.settings.history_retention, 20);
        assert!(config.tools.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let yaml = r#"
settings:
  output_dir: out
  work_dir: /scratch/work
  nprocs: 16
  mem_gb: 32
  omp_nthreads: 8
run:
  spaces: [MNI152NLin6Asym:res-2, T1w]
  recon: fastsurfer
  longitudinal: true
  cifti_output: 91k
tools:
  n4: "N4 ${in.in_file} ${out.out_file}"
"#;
        let config: AnatprepConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.settings.nprocs(), 16);
        assert_eq!(config.settings.omp_nthreads(), 8);
        assert_eq!(config.settings.mem_gb(), 32.0);
        assert_eq!(config.run.recon, ReconMethod::FastSurfer);
        assert!(config.run.longitudinal);
        assert_eq!(config.run.cifti_output, Some(CiftiDensity::K91));
        assert_eq!(
            config.operation_templates()["n4"],
            "N4 ${in.in_file} ${out.out_file}"
        );
    }

    #[test]
    fn recon_none_parses() {
        let config: AnatprepConfig = serde_yaml::from_str("run:\n  recon: none").unwrap();
        assert!(!config.run.recon.is_enabled());
    }

    #[test]
    fn omp_nthreads_derived_from_nprocs() {
        let settings = Settings {
            nprocs: Some(4),
            ..Default::default()
        };
        assert_eq!(settings.omp_nthreads(), 3);

        let settings = Settings {
            nprocs: Some(1),
            ..Default::default()
        };
        assert_eq!(settings.omp_nthreads(), 1);

        let settings = Settings {
            nprocs: Some(64),
            ..Default::default()
        };
        assert_eq!(settings.omp_nthreads(), 8);
    }

    #[test]
    fn subjects_dir_defaults_under_output() {
        let settings = Settings::default();
        let root = Path::new("/study");
        assert_eq!(
            settings.subjects_dir(root),
            PathBuf::from("/study/derivatives/sourcedata/freesurfer")
        );
        assert_eq!(settings.work_dir(root), PathBuf::from("/study/work"));
    }

    #[test]
    fn absolute_dirs_ignore_root() {
        let settings = Settings {
            work_dir: PathBuf::from("/scratch"),
            ..Default::default()
        };
        assert_eq!(settings.work_dir(Path::new("/study")), PathBuf::from("/scratch"));
    }

    #[test]
    fn cifti_density_labels() {
        assert_eq!(CiftiDensity::K170.to_string(), "170k");
        assert_eq!(CiftiDensity::K91.mesh_density(), "32k");
    }
}
