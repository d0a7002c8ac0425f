//! Canonical role names.
//!
//! Roles are the derivatives contract: downstream steps and the run report
//! refer to `t1w_preproc`, never to whichever step happened to produce it.
//! Per-hemisphere and per-template roles carry a `:<qualifier>` suffix.

/// Conformed reference (or unbiased template) of all T1w images.
pub const T1W_REF: &str = "t1w_ref";
/// Bias-corrected T1w.
pub const T1W_PREPROC: &str = "t1w_preproc";
/// Skull-stripped T1w.
pub const T1W_BRAIN: &str = "t1w_brain";
/// Brain mask from brain extraction.
pub const BRAIN_MASK: &str = "brain_mask";
/// Final brain mask (refined by surface reconstruction when it ran).
pub const T1W_MASK: &str = "t1w_mask";
/// Tissue segmentation.
pub const T1W_DSEG: &str = "t1w_dseg";
/// Tissue probability maps.
pub const T1W_TPMS: &str = "t1w_tpms";
/// Subcortical segmentation in T1w space.
pub const T1W_ASEG: &str = "t1w_aseg";
/// Cortical parcellation in T1w space.
pub const T1W_APARC: &str = "t1w_aparc";

/// T1w to template transform.
pub const ANAT2STD_XFM: &str = "anat2std_xfm";
/// Template to T1w transform.
pub const STD2ANAT_XFM: &str = "std2anat_xfm";

/// FreeSurfer native-space reference volume.
pub const FS_NATIVE_REF: &str = "fs_native_ref";
/// FreeSurfer subcortical segmentation.
pub const FS_ASEG: &str = "fs_aseg";
/// FreeSurfer aparc+aseg.
pub const FS_APARC_ASEG: &str = "fs_aparc_aseg";
/// FreeSurfer white-matter parcellation.
pub const FS_WMPARC: &str = "fs_wmparc";
/// FreeSurfer cortical ribbon.
pub const FS_RIBBON: &str = "fs_ribbon";
/// FreeSurfer white surface.
pub const FS_WHITE: &str = "fs_white";
/// FreeSurfer pial surface.
pub const FS_PIAL: &str = "fs_pial";
/// FreeSurfer cortical thickness.
pub const FS_THICKNESS: &str = "fs_thickness";
/// FreeSurfer curvature.
pub const FS_CURV: &str = "fs_curv";
/// FreeSurfer sulcal depth.
pub const FS_SULC: &str = "fs_sulc";
/// FreeSurfer spherical registration.
pub const FS_SPHERE_REG: &str = "fs_sphere_reg";
/// FreeSurfer inflated surface.
pub const FS_INFLATED: &str = "fs_inflated";

/// FreeSurfer native to T1w transform.
pub const FSNATIVE2T1W_XFM: &str = "fsnative2t1w_xfm";
/// T1w to FreeSurfer native transform.
pub const T1W2FSNATIVE_XFM: &str = "t1w2fsnative_xfm";

/// GIFTI white surface in T1w space.
pub const SURFACE_WHITE: &str = "surface_white";
/// GIFTI pial surface in T1w space.
pub const SURFACE_PIAL: &str = "surface_pial";
/// GIFTI midthickness surface in T1w space.
pub const SURFACE_MIDTHICKNESS: &str = "surface_midthickness";
/// GIFTI inflated surface.
pub const SURFACE_INFLATED: &str = "surface_inflated";
/// GIFTI thickness map.
pub const THICKNESS: &str = "thickness";
/// GIFTI curvature map.
pub const CURV: &str = "curv";
/// GIFTI sulcal depth map.
pub const SULC: &str = "sulc";
/// Cortical ribbon mask in T1w space.
pub const ANAT_RIBBON: &str = "anat_ribbon";

/// Thickness grayordinates.
pub const CIFTI_THICKNESS: &str = "cifti_thickness";
/// Curvature grayordinates.
pub const CIFTI_CURV: &str = "cifti_curv";
/// Sulcal depth grayordinates.
pub const CIFTI_SULC: &str = "cifti_sulc";

/// Hemisphere labels in processing order.
pub const HEMISPHERES: [&str; 2] = ["lh", "rh"];

/// Qualify a role, e.g. `hemi_role("fs_white", "lh")` is `fs_white:lh`.
pub fn qualified(base: &str, qualifier: &str) -> String {
    format!("{}:{}", base, qualifier)
}

/// Per-hemisphere role name.
pub fn hemi_role(base: &str, hemi: &str) -> String {
    qualified(base, hemi)
}

/// Per-template role name.
pub fn space_role(base: &str, template: &str) -> String {
    qualified(base, template)
}

/// Unqualified part of a role name.
pub fn base_of(role: &str) -> &str {
    role.split_once(':').map(|(base, _)| base).unwrap_or(role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_roles() {
        assert_eq!(hemi_role(FS_WHITE, "lh"), "fs_white:lh");
        assert_eq!(
            space_role(ANAT2STD_XFM, "MNI152NLin2009cAsym"),
            "anat2std_xfm:MNI152NLin2009cAsym"
        );
        assert_eq!(base_of("surface_pial:rh"), "surface_pial");
        assert_eq!(base_of(T1W_MASK), "t1w_mask");
    }
}
