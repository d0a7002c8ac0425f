//! Surface reconstruction alternatives.
//!
//! The four rules here share the `surface_recon` exclusive group:
//!
//! 1. `recon_force_scratch` rebuilds surfaces even when derivatives exist,
//!    marking every phase `always_run`.
//! 2. `recon_reuse` imports an existing FreeSurfer subject.
//! 3. `recon_fastsurfer` runs the FastSurfer pipeline.
//! 4. `recon_freesurfer` runs recon-all as resumable phases.
//!
//! Every alternative publishes the same `fs_*` roles, so post-recon steps
//! never know which one ran.

use super::{AssemblyRule, RulePriority, SURFACE_RECON_GROUP};
use crate::artifact::RawValue;
use crate::config::ReconMethod;
use crate::context::RunContext;
use crate::error::Result;
use crate::graph::fragment::Fragment;
use crate::graph::roles::{self, hemi_role, HEMISPHERES};
use crate::graph::rules::anatomical::T1W_ALL;
use crate::inputs::AvailableInputs;
use crate::steps::{Resources, SlotKind, StepBuilder, StepDescriptor};

/// Raw key of the T2w image.
pub const T2W: &str = "t2w";
/// Raw key of the FLAIR image.
pub const FLAIR: &str = "flair";
/// Raw key of the FreeSurfer derivatives directory.
pub const FS_DERIVATIVES: &str = "fs_derivatives";

const FS_MEMORY_GIB: f64 = 5.0;

/// Per-hemisphere surface outputs shared by every reconstruction method:
/// (slot, kind, location under `surf/`, role).
const HEMI_SURFACES: [(&str, SlotKind, &str, &str); 7] = [
    ("white", SlotKind::Surface, "white", roles::FS_WHITE),
    ("pial", SlotKind::Surface, "pial", roles::FS_PIAL),
    ("thickness", SlotKind::Morphometry, "thickness", roles::FS_THICKNESS),
    ("curv", SlotKind::Morphometry, "curv", roles::FS_CURV),
    ("sulc", SlotKind::Morphometry, "sulc", roles::FS_SULC),
    ("sphere_reg", SlotKind::Surface, "sphere.reg", roles::FS_SPHERE_REG),
    ("inflated", SlotKind::Surface, "inflated", roles::FS_INFLATED),
];

fn subject_path(relative: &str) -> String {
    format!("${{subjects_dir}}/${{subject_id}}/{}", relative)
}

fn recon_step(id: &str, operation: &str, ctx: &RunContext, force: bool) -> StepBuilder {
    let builder = StepDescriptor::builder(id, operation)
        .param("flags", if ctx.hires { "-hires" } else { "" })
        .resources(Resources::gib(ctx.omp_nthreads, FS_MEMORY_GIB));
    if force {
        builder.always_run()
    } else {
        builder
    }
}

fn with_hemi_surfaces(mut builder: StepBuilder, hemi: &str) -> StepBuilder {
    for (slot, kind, file, _) in HEMI_SURFACES {
        builder = builder.output(slot, kind, subject_path(&format!("surf/{}.{}", hemi, file)));
    }
    builder
}

/// Which image, if any, refines the pial surfaces.
fn pial_refinement(ctx: &RunContext, inputs: &AvailableInputs) -> Option<(&'static str, RawValue)> {
    if ctx.use_t2w {
        if let Some(t2w) = inputs.t2w_image() {
            return Some(("T2", RawValue::Path(t2w.to_path_buf())));
        }
    }
    if ctx.use_flair {
        if let Some(flair) = inputs.flair_image() {
            return Some(("FLAIR", RawValue::Path(flair.to_path_buf())));
        }
    }
    None
}

/// recon-all split into phases whose outputs make each one resumable.
fn freesurfer_fragment(
    ctx: &RunContext,
    inputs: &AvailableInputs,
    force: bool,
) -> Result<Fragment> {
    let mut fragment = Fragment::new();
    fragment.raw(T1W_ALL, RawValue::Paths(inputs.t1w_paths()));

    let autorecon1 = recon_step("fs_autorecon1", "recon_all_init", ctx, force)
        .title("recon-all: autorecon1 (no skull strip)")
        .input("t1w_files", SlotKind::Volume)
        .output("rawavg", SlotKind::Volume, subject_path("mri/rawavg.mgz"))
        .output("orig", SlotKind::Volume, subject_path("mri/orig.mgz"))
        .output("t1", SlotKind::Volume, subject_path("mri/T1.mgz"))
        .build()?;

    let inject = recon_step("skull_strip_inject", "fs_inject_brainmask", ctx, force)
        .title("Inject external brain mask")
        .input("t1", SlotKind::Volume)
        .input("brain", SlotKind::Volume)
        .output("brainmask_auto", SlotKind::Volume, subject_path("mri/brainmask.auto.mgz"))
        .output("brainmask", SlotKind::Volume, subject_path("mri/brainmask.mgz"))
        .resources(Resources::gib(1, 1.0))
        .build()?;

    let gcareg = recon_step("fs_gcareg", "recon_all", ctx, force)
        .title("recon-all: gcareg")
        .param("directive", "-gcareg")
        .input("brainmask", SlotKind::Volume)
        .output(
            "talairach",
            SlotKind::Transform,
            subject_path("mri/transforms/talairach.lta"),
        )
        .build()?;

    let autorecon2_vol = recon_step("fs_autorecon2_vol", "recon_all", ctx, force)
        .title("recon-all: autorecon2-volonly")
        .param("directive", "-autorecon2-volonly")
        .input("talairach", SlotKind::Transform)
        .input("brainmask", SlotKind::Volume)
        .output("aseg_presurf", SlotKind::Segmentation, subject_path("mri/aseg.presurf.mgz"))
        .output("wm", SlotKind::Volume, subject_path("mri/wm.mgz"))
        .output("filled", SlotKind::Volume, subject_path("mri/filled.mgz"))
        .build()?;

    fragment
        .add_step(autorecon1)
        .from_raw("fs_autorecon1", "t1w_files", T1W_ALL)
        .add_step(inject)
        .from_step("skull_strip_inject", "t1", "fs_autorecon1", "t1")
        .from_role("skull_strip_inject", "brain", roles::T1W_BRAIN)
        .add_step(gcareg)
        .from_step("fs_gcareg", "brainmask", "skull_strip_inject", "brainmask")
        .add_step(autorecon2_vol)
        .from_step("fs_autorecon2_vol", "talairach", "fs_gcareg", "talairach")
        .from_step("fs_autorecon2_vol", "brainmask", "skull_strip_inject", "brainmask");

    for hemi in HEMISPHERES {
        let id = format!("fs_autorecon_surfs_{}", hemi);
        let builder = recon_step(&id, "recon_all", ctx, force)
            .title(format!("recon-all: {} surfaces", hemi))
            .param(
                "directive",
                format!(
                    "-autorecon-hemi {} -noparcstats -noparcstats2 -noparcstats3 -nohyporelabel -nobalabels",
                    hemi
                ),
            )
            .input("filled", SlotKind::Volume)
            .input("wm", SlotKind::Volume);
        fragment
            .add_step(with_hemi_surfaces(builder, hemi).build()?)
            .from_step(&id, "filled", "fs_autorecon2_vol", "filled")
            .from_step(&id, "wm", "fs_autorecon2_vol", "wm");
    }

    // Producer of the final pial surface of each hemisphere.
    let mut pial_source: Vec<(String, String)> = HEMISPHERES
        .iter()
        .map(|h| (format!("fs_autorecon_surfs_{}", h), "pial".to_string()))
        .collect();

    if let Some((contrast, image)) = pial_refinement(ctx, inputs) {
        let (id, key) = match contrast {
            "T2" => ("t2w_pial_refine", T2W),
            _ => ("flair_pial_refine", FLAIR),
        };
        let mut builder = recon_step(id, "recon_all_refine", ctx, force)
            .title(format!("Refine pial surfaces with {}", contrast))
            .param("contrast", contrast)
            .input("image", SlotKind::Volume);
        for hemi in HEMISPHERES {
            builder = builder
                .input(format!("{}_pial", hemi), SlotKind::Surface)
                .output(
                    format!("{}_pial", hemi),
                    SlotKind::Surface,
                    subject_path(&format!("surf/{}.pial.{}", hemi, contrast)),
                );
        }
        fragment
            .raw(key, image)
            .add_step(builder.build()?)
            .from_raw(id, "image", key);
        for (hemi, source) in HEMISPHERES.iter().zip(pial_source.iter_mut()) {
            let slot = format!("{}_pial", hemi);
            fragment.from_step(id, &slot, &source.0, &source.1);
            *source = (id.to_string(), slot);
        }
    }

    let mut cortribbon = recon_step("fs_cortribbon", "recon_all", ctx, force)
        .title("recon-all: cortical ribbon")
        .param("directive", "-cortribbon")
        .resources(Resources::gib(2, FS_MEMORY_GIB))
        .input("aseg_presurf", SlotKind::Segmentation)
        .output("ribbon", SlotKind::Segmentation, subject_path("mri/ribbon.mgz"));
    for hemi in HEMISPHERES {
        cortribbon = cortribbon
            .input(format!("{}_white", hemi), SlotKind::Surface)
            .input(format!("{}_pial", hemi), SlotKind::Surface);
    }
    fragment
        .add_step(cortribbon.build()?)
        .from_step("fs_cortribbon", "aseg_presurf", "fs_autorecon2_vol", "aseg_presurf");
    for (hemi, (pial_step, pial_slot)) in HEMISPHERES.iter().zip(pial_source.iter()) {
        fragment
            .from_step(
                "fs_cortribbon",
                &format!("{}_white", hemi),
                &format!("fs_autorecon_surfs_{}", hemi),
                "white",
            )
            .from_step("fs_cortribbon", &format!("{}_pial", hemi), pial_step, pial_slot);
    }

    for (hemi, (pial_step, pial_slot)) in HEMISPHERES.iter().zip(pial_source.iter()) {
        let id = format!("fs_parcstats_{}", hemi);
        let surfs = format!("fs_autorecon_surfs_{}", hemi);
        let step = recon_step(&id, "recon_all", ctx, force)
            .title(format!("recon-all: {} parcellation and stats", hemi))
            .param(
                "directive",
                format!(
                    "-cortparc -cortparc2 -cortparc3 -pctsurfcon -parcstats -parcstats2 -parcstats3 -hemi {}",
                    hemi
                ),
            )
            .input("ribbon", SlotKind::Segmentation)
            .input("white", SlotKind::Surface)
            .input("pial", SlotKind::Surface)
            .input("sphere_reg", SlotKind::Surface)
            .output(
                "annot",
                SlotKind::Segmentation,
                subject_path(&format!("label/{}.aparc.annot", hemi)),
            )
            .output(
                "stats",
                SlotKind::Stats,
                subject_path(&format!("stats/{}.aparc.stats", hemi)),
            )
            .build()?;
        fragment
            .add_step(step)
            .from_step(&id, "ribbon", "fs_cortribbon", "ribbon")
            .from_step(&id, "white", &surfs, "white")
            .from_step(&id, "pial", pial_step, pial_slot)
            .from_step(&id, "sphere_reg", &surfs, "sphere_reg");
    }

    let autorecon3 = recon_step("fs_autorecon3", "recon_all", ctx, force)
        .title("recon-all: autorecon3 volumes")
        .param("directive", "-autorecon3 -nocortribbon -noparcstats -noparcstats2 -noparcstats3")
        .input("lh_annot", SlotKind::Segmentation)
        .input("rh_annot", SlotKind::Segmentation)
        .input("ribbon", SlotKind::Segmentation)
        .output("aparc_aseg", SlotKind::Segmentation, subject_path("mri/aparc+aseg.mgz"))
        .output("aseg", SlotKind::Segmentation, subject_path("mri/aseg.mgz"))
        .output("wmparc", SlotKind::Segmentation, subject_path("mri/wmparc.mgz"))
        .build()?;
    fragment
        .add_step(autorecon3)
        .from_step("fs_autorecon3", "lh_annot", "fs_parcstats_lh", "annot")
        .from_step("fs_autorecon3", "rh_annot", "fs_parcstats_rh", "annot")
        .from_step("fs_autorecon3", "ribbon", "fs_cortribbon", "ribbon")
        .publish(roles::FS_NATIVE_REF, "fs_autorecon1", "t1")
        .publish(roles::FS_ASEG, "fs_autorecon3", "aseg")
        .publish(roles::FS_APARC_ASEG, "fs_autorecon3", "aparc_aseg")
        .publish(roles::FS_WMPARC, "fs_autorecon3", "wmparc")
        .publish(roles::FS_RIBBON, "fs_cortribbon", "ribbon");

    for (hemi, (pial_step, pial_slot)) in HEMISPHERES.iter().zip(pial_source.iter()) {
        let surfs = format!("fs_autorecon_surfs_{}", hemi);
        for (slot, _, _, role) in HEMI_SURFACES {
            if slot == "pial" {
                fragment.publish(hemi_role(role, hemi), pial_step, pial_slot);
            } else {
                fragment.publish(hemi_role(role, hemi), &surfs, slot);
            }
        }
    }

    Ok(fragment)
}

fn fastsurfer_fragment(ctx: &RunContext, force: bool) -> Result<Fragment> {
    let mut fragment = Fragment::new();

    let seg = recon_step("fastsurfer_seg", "fastsurfer_seg", ctx, force)
        .title("FastSurfer segmentation")
        .resources(Resources::gib(ctx.omp_nthreads, 8.0))
        .input("t1w_file", SlotKind::Volume)
        .output("orig", SlotKind::Volume, subject_path("mri/orig.mgz"))
        .output("aseg", SlotKind::Segmentation, subject_path("mri/aseg.mgz"))
        .output(
            "aparc_aseg",
            SlotKind::Segmentation,
            subject_path("mri/aparc.DKTatlas+aseg.deep.mgz"),
        )
        .build()?;
    fragment
        .add_step(seg)
        .from_role("fastsurfer_seg", "t1w_file", roles::T1W_REF)
        .publish(roles::FS_NATIVE_REF, "fastsurfer_seg", "orig")
        .publish(roles::FS_ASEG, "fastsurfer_seg", "aseg")
        .publish(roles::FS_APARC_ASEG, "fastsurfer_seg", "aparc_aseg");

    for hemi in HEMISPHERES {
        let id = format!("fastsurfer_surf_{}", hemi);
        let builder = recon_step(&id, "fastsurfer_surf", ctx, force)
            .title(format!("FastSurfer {} surfaces", hemi))
            .param("hemi", hemi)
            .input("orig", SlotKind::Volume)
            .input("aseg", SlotKind::Segmentation);
        fragment
            .add_step(with_hemi_surfaces(builder, hemi).build()?)
            .from_step(&id, "orig", "fastsurfer_seg", "orig")
            .from_step(&id, "aseg", "fastsurfer_seg", "aseg");
        for (slot, _, _, role) in HEMI_SURFACES {
            fragment.publish(hemi_role(role, hemi), &id, slot);
        }
    }

    Ok(fragment)
}

/// Reconstruct from scratch even when derivatives could be reused.
pub struct ReconForceScratchRule;

impl AssemblyRule for ReconForceScratchRule {
    fn name(&self) -> &str {
        "recon_force_scratch"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(300)
    }

    fn exclusive_group(&self) -> Option<&str> {
        Some(SURFACE_RECON_GROUP)
    }

    fn description(&self) -> &str {
        "Force recompute: rebuild surfaces from scratch, never skipping a phase"
    }

    fn applies(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        ctx.force_recompute && ctx.recon.is_enabled()
    }

    fn fragment(&self, ctx: &RunContext, inputs: &AvailableInputs) -> Result<Fragment> {
        match ctx.recon {
            ReconMethod::FastSurfer => fastsurfer_fragment(ctx, true),
            _ => freesurfer_fragment(ctx, inputs, true),
        }
    }
}

/// Import an existing FreeSurfer subject instead of reconstructing.
pub struct ReconReuseRule;

impl AssemblyRule for ReconReuseRule {
    fn name(&self) -> &str {
        "recon_reuse"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(310)
    }

    fn exclusive_group(&self) -> Option<&str> {
        Some(SURFACE_RECON_GROUP)
    }

    fn description(&self) -> &str {
        "Reuse FreeSurfer derivatives listed in the input manifest"
    }

    fn applies(&self, ctx: &RunContext, inputs: &AvailableInputs) -> bool {
        ctx.recon.is_enabled()
            && ctx.reuse_derivatives
            && inputs.freesurfer_derivatives().is_some()
    }

    fn fragment(&self, _ctx: &RunContext, inputs: &AvailableInputs) -> Result<Fragment> {
        let mut fragment = Fragment::new();
        if let Some(dir) = inputs.freesurfer_derivatives() {
            fragment.raw(FS_DERIVATIVES, RawValue::Path(dir.to_path_buf()));
        }

        let mut builder = StepDescriptor::builder("fs_reuse", "fs_import")
            .title("Import existing FreeSurfer subject")
            .input("source_dir", SlotKind::Directory)
            .output("t1", SlotKind::Volume, subject_path("mri/T1.mgz"))
            .output("aseg", SlotKind::Segmentation, subject_path("mri/aseg.mgz"))
            .output("aparc_aseg", SlotKind::Segmentation, subject_path("mri/aparc+aseg.mgz"))
            .output("wmparc", SlotKind::Segmentation, subject_path("mri/wmparc.mgz"))
            .output("ribbon", SlotKind::Segmentation, subject_path("mri/ribbon.mgz"));
        for hemi in HEMISPHERES {
            for (slot, kind, file, _) in HEMI_SURFACES {
                builder = builder.output(
                    format!("{}_{}", hemi, slot),
                    kind,
                    subject_path(&format!("surf/{}.{}", hemi, file)),
                );
            }
        }

        fragment
            .add_step(builder.build()?)
            .from_raw("fs_reuse", "source_dir", FS_DERIVATIVES)
            .publish(roles::FS_NATIVE_REF, "fs_reuse", "t1")
            .publish(roles::FS_ASEG, "fs_reuse", "aseg")
            .publish(roles::FS_APARC_ASEG, "fs_reuse", "aparc_aseg")
            .publish(roles::FS_WMPARC, "fs_reuse", "wmparc")
            .publish(roles::FS_RIBBON, "fs_reuse", "ribbon");
        for hemi in HEMISPHERES {
            for (slot, _, _, role) in HEMI_SURFACES {
                fragment.publish(hemi_role(role, hemi), "fs_reuse", &format!("{}_{}", hemi, slot));
            }
        }

        Ok(fragment)
    }
}

/// FastSurfer segmentation and surface pipeline.
pub struct FastSurferRule;

impl AssemblyRule for FastSurferRule {
    fn name(&self) -> &str {
        "recon_fastsurfer"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(320)
    }

    fn exclusive_group(&self) -> Option<&str> {
        Some(SURFACE_RECON_GROUP)
    }

    fn description(&self) -> &str {
        "Reconstruct surfaces with FastSurfer"
    }

    fn applies(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        ctx.recon == ReconMethod::FastSurfer
    }

    fn fragment(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> Result<Fragment> {
        fastsurfer_fragment(ctx, false)
    }
}

/// FreeSurfer recon-all, one step per phase.
pub struct FreeSurferRule;

impl AssemblyRule for FreeSurferRule {
    fn name(&self) -> &str {
        "recon_freesurfer"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(330)
    }

    fn exclusive_group(&self) -> Option<&str> {
        Some(SURFACE_RECON_GROUP)
    }

    fn description(&self) -> &str {
        "Reconstruct surfaces with FreeSurfer recon-all phases"
    }

    fn applies(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        ctx.recon == ReconMethod::FreeSurfer
    }

    fn fragment(&self, ctx: &RunContext, inputs: &AvailableInputs) -> Result<Fragment> {
        freesurfer_fragment(ctx, inputs, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Layout;
    use crate::inputs::ImageInput;
    use std::path::{Path, PathBuf};

    fn ctx() -> RunContext {
        RunContext::new("01", Layout::under(Path::new("/study")))
    }

    fn inputs() -> AvailableInputs {
        AvailableInputs {
            t1w: vec![ImageInput::new("/raw/T1w.nii.gz")],
            ..Default::default()
        }
    }

    #[test]
    fn freesurfer_phases_in_declaration_order() {
        let fragment = FreeSurferRule.fragment(&ctx(), &inputs()).unwrap();
        assert_eq!(
            fragment.step_ids().collect::<Vec<_>>(),
            vec![
                "fs_autorecon1",
                "skull_strip_inject",
                "fs_gcareg",
                "fs_autorecon2_vol",
                "fs_autorecon_surfs_lh",
                "fs_autorecon_surfs_rh",
                "fs_cortribbon",
                "fs_parcstats_lh",
                "fs_parcstats_rh",
                "fs_autorecon3",
            ]
        );
    }

    #[test]
    fn t2w_refinement_replaces_pial_publication() {
        let mut inputs = inputs();
        inputs.t2w = vec![ImageInput::new("/raw/T2w.nii.gz")];

        let fragment = FreeSurferRule.fragment(&ctx(), &inputs).unwrap();
        assert!(fragment.step_ids().any(|id| id == "t2w_pial_refine"));

        let (steps, wires, raw, publications) = fragment.into_parts();
        assert_eq!(raw[T2W], RawValue::Path(PathBuf::from("/raw/T2w.nii.gz")));
        let refine = steps.iter().find(|s| s.id == "t2w_pial_refine").unwrap();
        assert_eq!(refine.operation.params["contrast"], "T2");

        let pial_lh = publications
            .iter()
            .find(|(role, _)| role == "fs_pial:lh")
            .unwrap();
        assert_eq!(pial_lh.1.step, "t2w_pial_refine");
        assert_eq!(pial_lh.1.slot, "lh_pial");

        let ribbon_pial = wires
            .iter()
            .find(|w| w.consumer.step == "fs_cortribbon" && w.consumer.slot == "rh_pial")
            .unwrap();
        assert_eq!(ribbon_pial.source.to_string(), "t2w_pial_refine.rh_pial");
    }

    #[test]
    fn t2w_ignored_when_disabled_and_flair_used_instead() {
        let mut ctx = ctx();
        ctx.use_t2w = false;
        ctx.use_flair = true;
        let mut inputs = inputs();
        inputs.t2w = vec![ImageInput::new("/raw/T2w.nii.gz")];
        inputs.flair = vec![ImageInput::new("/raw/FLAIR.nii.gz")];

        let fragment = FreeSurferRule.fragment(&ctx, &inputs).unwrap();
        let ids: Vec<&str> = fragment.step_ids().collect();
        assert!(ids.contains(&"flair_pial_refine"));
        assert!(!ids.contains(&"t2w_pial_refine"));
    }

    #[test]
    fn hires_sets_flags_on_every_phase() {
        let mut ctx = ctx();
        ctx.hires = true;
        let (steps, _, _, _) = FreeSurferRule
            .fragment(&ctx, &inputs())
            .unwrap()
            .into_parts();
        assert!(steps.iter().all(|s| s.operation.params["flags"] == "-hires"));
    }

    #[test]
    fn force_scratch_marks_phases_always_run() {
        let mut ctx = ctx();
        ctx.force_recompute = true;
        assert!(ReconForceScratchRule.applies(&ctx, &inputs()));

        let (steps, _, _, _) = ReconForceScratchRule
            .fragment(&ctx, &inputs())
            .unwrap()
            .into_parts();
        assert!(steps.iter().all(|s| s.always_run));

        ctx.recon = ReconMethod::None;
        assert!(!ReconForceScratchRule.applies(&ctx, &inputs()));
    }

    #[test]
    fn reuse_requires_listed_derivatives() {
        let ctx = ctx();
        let mut inputs = inputs();
        assert!(!ReconReuseRule.applies(&ctx, &inputs));

        inputs.derivatives.freesurfer = Some(PathBuf::from("/derivs/sub-01"));
        assert!(ReconReuseRule.applies(&ctx, &inputs));

        let fragment = ReconReuseRule.fragment(&ctx, &inputs).unwrap();
        assert_eq!(fragment.step_ids().collect::<Vec<_>>(), vec!["fs_reuse"]);
        let roles: Vec<&str> = fragment.published_roles().collect();
        assert!(roles.contains(&"fs_sphere_reg:rh"));
        assert!(roles.contains(&roles::FS_NATIVE_REF));
    }

    #[test]
    fn fastsurfer_publishes_surface_roles() {
        let mut ctx = ctx();
        ctx.recon = ReconMethod::FastSurfer;
        assert!(FastSurferRule.applies(&ctx, &inputs()));
        assert!(!FreeSurferRule.applies(&ctx, &inputs()));

        let fragment = FastSurferRule.fragment(&ctx, &inputs()).unwrap();
        assert_eq!(
            fragment.step_ids().collect::<Vec<_>>(),
            vec!["fastsurfer_seg", "fastsurfer_surf_lh", "fastsurfer_surf_rh"]
        );
        let roles: Vec<&str> = fragment.published_roles().collect();
        assert!(roles.contains(&"fs_white:lh"));
        assert!(!roles.contains(&roles::FS_WMPARC));
    }
}
