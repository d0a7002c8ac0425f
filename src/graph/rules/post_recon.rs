//! Steps that bring surface reconstruction results back into T1w space.

use super::{AssemblyRule, RulePriority};
use crate::context::RunContext;
use crate::error::Result;
use crate::graph::fragment::Fragment;
use crate::graph::roles::{self, hemi_role, HEMISPHERES};
use crate::inputs::AvailableInputs;
use crate::steps::{Resources, SlotKind, StepDescriptor};

/// Transforms, native-space segmentations, refined mask, GIFTI surfaces,
/// morphometrics and the cortical ribbon.
pub struct PostReconRule;

impl PostReconRule {
    fn transforms(fragment: &mut Fragment) -> Result<()> {
        let register = StepDescriptor::builder("fsnative2t1w_xfm", "fs_register")
            .title("Register FreeSurfer native space to T1w")
            .input("moving", SlotKind::Volume)
            .input("reference", SlotKind::Volume)
            .output(
                "out_xfm",
                SlotKind::Transform,
                "${step_dir}/from-fsnative_to-T1w_mode-image_xfm.lta",
            )
            .resources(Resources::gib(1, 2.0))
            .build()?;

        let invert = StepDescriptor::builder("t1w2fsnative_xfm", "lta_invert")
            .title("Invert fsnative transform")
            .input("in_xfm", SlotKind::Transform)
            .output(
                "out_xfm",
                SlotKind::Transform,
                "${step_dir}/from-T1w_to-fsnative_mode-image_xfm.lta",
            )
            .build()?;

        fragment
            .add_step(register)
            .from_role("fsnative2t1w_xfm", "moving", roles::FS_NATIVE_REF)
            .from_role("fsnative2t1w_xfm", "reference", roles::T1W_PREPROC)
            .add_step(invert)
            .from_step("t1w2fsnative_xfm", "in_xfm", "fsnative2t1w_xfm", "out_xfm")
            .publish(roles::FSNATIVE2T1W_XFM, "fsnative2t1w_xfm", "out_xfm")
            .publish(roles::T1W2FSNATIVE_XFM, "t1w2fsnative_xfm", "out_xfm");
        Ok(())
    }

    fn segmentations(fragment: &mut Fragment) -> Result<()> {
        for (id, source_role, file, role) in [
            ("aseg_to_native", roles::FS_ASEG, "desc-aseg_dseg.nii.gz", roles::T1W_ASEG),
            (
                "aparc_to_native",
                roles::FS_APARC_ASEG,
                "desc-aparcaseg_dseg.nii.gz",
                roles::T1W_APARC,
            ),
        ] {
            let step = StepDescriptor::builder(id, "fs_resample_seg")
                .title(format!("Resample {} to T1w", source_role))
                .input("seg", SlotKind::Segmentation)
                .input("transform", SlotKind::Transform)
                .input("reference", SlotKind::Volume)
                .output("out_file", SlotKind::Segmentation, format!("${{step_dir}}/{}", file))
                .build()?;
            fragment
                .add_step(step)
                .from_role(id, "seg", source_role)
                .from_step(id, "transform", "fsnative2t1w_xfm", "out_xfm")
                .from_role(id, "reference", roles::T1W_PREPROC)
                .publish(role, id, "out_file");
        }

        let refine = StepDescriptor::builder("refine_brainmask", "refine_brainmask")
            .title("Refine brain mask with aseg")
            .input("in_mask", SlotKind::Mask)
            .input("in_aseg", SlotKind::Segmentation)
            .input("in_anat", SlotKind::Volume)
            .output("out_mask", SlotKind::Mask, "${step_dir}/desc-brain_mask.nii.gz")
            .build()?;
        fragment
            .add_step(refine)
            .from_role("refine_brainmask", "in_mask", roles::BRAIN_MASK)
            .from_step("refine_brainmask", "in_aseg", "aseg_to_native", "out_file")
            .from_role("refine_brainmask", "in_anat", roles::T1W_PREPROC)
            .publish(roles::T1W_MASK, "refine_brainmask", "out_mask");
        Ok(())
    }

    fn surfaces(fragment: &mut Fragment) -> Result<()> {
        for hemi in HEMISPHERES {
            let gifti = format!("gifti_surfaces_{}", hemi);
            let mut builder = StepDescriptor::builder(&gifti, "fs_to_gifti")
                .title(format!("Convert {} surfaces to GIFTI", hemi))
                .param("hemi", hemi)
                .input("transform", SlotKind::Transform);
            for surface in ["white", "pial", "inflated"] {
                builder = builder.input(surface, SlotKind::Surface);
            }
            for surface in ["white", "pial", "midthickness", "inflated"] {
                builder = builder.output(
                    surface,
                    SlotKind::Surface,
                    format!("${{step_dir}}/hemi-{}_{}.surf.gii", hemi, surface),
                );
            }
            fragment
                .add_step(builder.build()?)
                .from_step(&gifti, "transform", "fsnative2t1w_xfm", "out_xfm")
                .from_role(&gifti, "white", &hemi_role(roles::FS_WHITE, hemi))
                .from_role(&gifti, "pial", &hemi_role(roles::FS_PIAL, hemi))
                .from_role(&gifti, "inflated", &hemi_role(roles::FS_INFLATED, hemi))
                .publish(hemi_role(roles::SURFACE_WHITE, hemi), &gifti, "white")
                .publish(hemi_role(roles::SURFACE_PIAL, hemi), &gifti, "pial")
                .publish(
                    hemi_role(roles::SURFACE_MIDTHICKNESS, hemi),
                    &gifti,
                    "midthickness",
                )
                .publish(hemi_role(roles::SURFACE_INFLATED, hemi), &gifti, "inflated");

            let morph = format!("morphometrics_{}", hemi);
            let mut builder = StepDescriptor::builder(&morph, "fs_morph_to_gifti")
                .title(format!("Convert {} morphometrics to GIFTI", hemi))
                .param("hemi", hemi)
                .input("white", SlotKind::Surface);
            for (metric, source, published) in [
                ("thickness", roles::FS_THICKNESS, roles::THICKNESS),
                ("curv", roles::FS_CURV, roles::CURV),
                ("sulc", roles::FS_SULC, roles::SULC),
            ] {
                builder = builder.input(metric, SlotKind::Morphometry).output(
                    metric,
                    SlotKind::Morphometry,
                    format!("${{step_dir}}/hemi-{}_{}.shape.gii", hemi, metric),
                );
                fragment
                    .from_role(&morph, metric, &hemi_role(source, hemi))
                    .publish(hemi_role(published, hemi), &morph, metric);
            }
            fragment
                .add_step(builder.build()?)
                .from_role(&morph, "white", &hemi_role(roles::FS_WHITE, hemi));
        }

        let mut ribbon = StepDescriptor::builder("anat_ribbon", "anat_ribbon")
            .title("Cortical ribbon mask")
            .input("reference", SlotKind::Volume)
            .output("ribbon", SlotKind::Mask, "${step_dir}/desc-ribbon_mask.nii.gz")
            .resources(Resources::gib(1, 2.0));
        for hemi in HEMISPHERES {
            for surface in ["white", "pial"] {
                ribbon = ribbon.input(format!("{}_{}", hemi, surface), SlotKind::Surface);
            }
        }
        fragment
            .add_step(ribbon.build()?)
            .from_role("anat_ribbon", "reference", roles::T1W_PREPROC)
            .publish(roles::ANAT_RIBBON, "anat_ribbon", "ribbon");
        for hemi in HEMISPHERES {
            for surface in ["white", "pial"] {
                fragment.from_step(
                    "anat_ribbon",
                    &format!("{}_{}", hemi, surface),
                    &format!("gifti_surfaces_{}", hemi),
                    surface,
                );
            }
        }
        Ok(())
    }
}

impl AssemblyRule for PostReconRule {
    fn name(&self) -> &str {
        "post_recon"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(400)
    }

    fn description(&self) -> &str {
        "Bring surfaces, segmentations and masks from FreeSurfer space into T1w space"
    }

    fn applies(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        ctx.recon.is_enabled()
    }

    fn fragment(&self, _ctx: &RunContext, _inputs: &AvailableInputs) -> Result<Fragment> {
        let mut fragment = Fragment::new();
        Self::transforms(&mut fragment)?;
        Self::segmentations(&mut fragment)?;
        Self::surfaces(&mut fragment)?;
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconMethod;
    use crate::context::Layout;
    use std::path::Path;

    #[test]
    fn applies_only_with_reconstruction() {
        let mut ctx = RunContext::new("01", Layout::under(Path::new("/s")));
        let inputs = AvailableInputs::default();
        assert!(PostReconRule.applies(&ctx, &inputs));
        ctx.recon = ReconMethod::None;
        assert!(!PostReconRule.applies(&ctx, &inputs));
    }

    #[test]
    fn publishes_derivative_roles() {
        let ctx = RunContext::new("01", Layout::under(Path::new("/s")));
        let fragment = PostReconRule
            .fragment(&ctx, &AvailableInputs::default())
            .unwrap();

        let roles: Vec<&str> = fragment.published_roles().collect();
        for role in [
            "t1w_mask",
            "t1w_aseg",
            "t1w_aparc",
            "fsnative2t1w_xfm",
            "surface_pial:lh",
            "surface_midthickness:rh",
            "thickness:lh",
            "sulc:rh",
            "anat_ribbon",
        ] {
            assert!(roles.contains(&role), "missing {}", role);
        }
    }

    #[test]
    fn morphometrics_read_published_fs_roles() {
        let ctx = RunContext::new("01", Layout::under(Path::new("/s")));
        let (_, wires, _, _) = PostReconRule
            .fragment(&ctx, &AvailableInputs::default())
            .unwrap()
            .into_parts();

        let curv = wires
            .iter()
            .find(|w| w.consumer.step == "morphometrics_rh" && w.consumer.slot == "curv")
            .unwrap();
        assert_eq!(curv.source.to_string(), "role:fs_curv:rh");
    }
}
