//! Conformation, bias correction, brain extraction and tissue segmentation.

use super::{AssemblyRule, RulePriority};
use crate::artifact::RawValue;
use crate::config::ReconMethod;
use crate::context::RunContext;
use crate::error::Result;
use crate::graph::fragment::Fragment;
use crate::graph::roles;
use crate::inputs::AvailableInputs;
use crate::steps::{Resources, SlotKind, StepDescriptor};

/// Raw key of the i-th T1w image.
pub fn t1w_key(index: usize) -> String {
    format!("t1w:{}", index)
}

/// Raw key listing every T1w image.
pub const T1W_ALL: &str = "t1w_all";

const BRAIN_TEMPLATE: &str = "OASIS30ANTs";

/// Conform each T1w image and merge several into an unbiased template.
pub struct AnatConformRule;

impl AssemblyRule for AnatConformRule {
    fn name(&self) -> &str {
        "anat_conform"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(100)
    }

    fn description(&self) -> &str {
        "Conform every T1w image; build an unbiased template from several"
    }

    fn applies(&self, _ctx: &RunContext, inputs: &AvailableInputs) -> bool {
        !inputs.t1w.is_empty()
    }

    fn fragment(&self, ctx: &RunContext, inputs: &AvailableInputs) -> Result<Fragment> {
        let mut fragment = Fragment::new();
        let paths = inputs.t1w_paths();
        fragment.raw(T1W_ALL, RawValue::Paths(paths.clone()));

        for (i, path) in paths.iter().enumerate() {
            let id = format!("t1w_conform_{}", i);
            let key = t1w_key(i);
            let step = StepDescriptor::builder(&id, "conform")
                .title(format!("Conform T1w image {}", i + 1))
                .input("in_file", SlotKind::Volume)
                .output("out_file", SlotKind::Volume, "${step_dir}/t1w_conformed.nii.gz")
                .build()?;
            fragment
                .raw(key.clone(), RawValue::Path(path.clone()))
                .add_step(step)
                .from_raw(&id, "in_file", &key);
        }

        if paths.len() > 1 || ctx.longitudinal {
            let flags = if ctx.longitudinal { "" } else { "--fixtp --noit" };
            let mut builder = StepDescriptor::builder("anat_template", "robust_template")
                .title("Unbiased T1w template")
                .param("flags", flags)
                .output("out_file", SlotKind::Volume, "${step_dir}/t1w_template.nii.gz")
                .resources(Resources::gib(ctx.omp_nthreads, 2.0));
            for i in 0..paths.len() {
                builder = builder.input(format!("in_file_{:02}", i), SlotKind::Volume);
            }
            fragment.add_step(builder.build()?);
            for i in 0..paths.len() {
                fragment.from_step(
                    "anat_template",
                    &format!("in_file_{:02}", i),
                    &format!("t1w_conform_{}", i),
                    "out_file",
                );
            }
            fragment.publish(roles::T1W_REF, "anat_template", "out_file");
        } else {
            fragment.publish(roles::T1W_REF, "t1w_conform_0", "out_file");
        }

        Ok(fragment)
    }
}

/// Bias correction, brain extraction and tissue segmentation.
pub struct AnatPreprocRule;

impl AssemblyRule for AnatPreprocRule {
    fn name(&self) -> &str {
        "anat_preproc"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(110)
    }

    fn description(&self) -> &str {
        "N4 bias correction, brain extraction and FAST tissue segmentation"
    }

    fn applies(&self, _ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        true
    }

    fn fragment(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> Result<Fragment> {
        let mut fragment = Fragment::new();

        let bias_correct = StepDescriptor::builder("bias_correct", "n4")
            .title("N4 bias field correction")
            .input("in_file", SlotKind::Volume)
            .optional_input("weight_mask", SlotKind::Mask, None)
            .output("out_file", SlotKind::Volume, "${step_dir}/t1w_corrected.nii.gz")
            .resources(Resources::gib(ctx.omp_nthreads, 2.0))
            .build()?;

        let brain_extraction = StepDescriptor::builder("brain_extraction", "brain_extraction")
            .title("Brain extraction")
            .input("in_file", SlotKind::Volume)
            .param("template", BRAIN_TEMPLATE)
            .output("out_mask", SlotKind::Mask, "${step_dir}/brain_mask.nii.gz")
            .output("out_brain", SlotKind::Volume, "${step_dir}/t1w_brain.nii.gz")
            .resources(Resources::gib(ctx.omp_nthreads, 4.0))
            .build()?;

        let segmentation = StepDescriptor::builder("tissue_segmentation", "fast")
            .title("Tissue segmentation")
            .input("in_file", SlotKind::Volume)
            .output("out_dseg", SlotKind::Segmentation, "${step_dir}/t1w_dseg.nii.gz")
            .output("out_tpms", SlotKind::Volume, "${step_dir}/t1w_tpms.nii.gz")
            .resources(Resources::gib(1, 3.0))
            .build()?;

        fragment
            .add_step(bias_correct)
            .from_role("bias_correct", "in_file", roles::T1W_REF)
            .add_step(brain_extraction)
            .from_step("brain_extraction", "in_file", "bias_correct", "out_file")
            .add_step(segmentation)
            .from_step("tissue_segmentation", "in_file", "brain_extraction", "out_brain")
            .publish(roles::T1W_PREPROC, "bias_correct", "out_file")
            .publish(roles::T1W_BRAIN, "brain_extraction", "out_brain")
            .publish(roles::BRAIN_MASK, "brain_extraction", "out_mask")
            .publish(roles::T1W_DSEG, "tissue_segmentation", "out_dseg")
            .publish(roles::T1W_TPMS, "tissue_segmentation", "out_tpms");

        Ok(fragment)
    }
}

/// Without surface reconstruction the brain-extraction mask is final.
pub struct MaskFromBrainExtractionRule;

impl AssemblyRule for MaskFromBrainExtractionRule {
    fn name(&self) -> &str {
        "mask_from_brain_extraction"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(500)
    }

    fn description(&self) -> &str {
        "Publish the brain-extraction mask as t1w_mask when no surfaces are reconstructed"
    }

    fn applies(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        ctx.recon == ReconMethod::None
    }

    fn fragment(&self, _ctx: &RunContext, _inputs: &AvailableInputs) -> Result<Fragment> {
        let mut fragment = Fragment::new();
        fragment.publish(roles::T1W_MASK, "brain_extraction", "out_mask");
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Layout;
    use crate::inputs::ImageInput;
    use std::path::Path;

    fn ctx() -> RunContext {
        RunContext::new("01", Layout::under(Path::new("/study")))
    }

    fn inputs(n: usize) -> AvailableInputs {
        AvailableInputs {
            t1w: (0..n)
                .map(|i| ImageInput::new(format!("/raw/run-{}_T1w.nii.gz", i)))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn single_t1w_publishes_conformed_image() {
        let fragment = AnatConformRule.fragment(&ctx(), &inputs(1)).unwrap();
        assert_eq!(fragment.step_ids().collect::<Vec<_>>(), vec!["t1w_conform_0"]);

        let (_, _, raw, publications) = fragment.into_parts();
        assert!(raw.contains_key("t1w:0"));
        assert!(raw.contains_key(T1W_ALL));
        assert_eq!(publications[0].1.step, "t1w_conform_0");
    }

    #[test]
    fn several_t1w_merge_into_template() {
        let fragment = AnatConformRule.fragment(&ctx(), &inputs(3)).unwrap();
        assert_eq!(
            fragment.step_ids().collect::<Vec<_>>(),
            vec!["t1w_conform_0", "t1w_conform_1", "t1w_conform_2", "anat_template"]
        );

        let (steps, wires, _, publications) = fragment.into_parts();
        let template = steps.iter().find(|s| s.id == "anat_template").unwrap();
        assert!(template.input("in_file_02").is_some());
        assert_eq!(template.operation.params["flags"], "--fixtp --noit");
        assert_eq!(
            wires.iter().filter(|w| w.consumer.step == "anat_template").count(),
            3
        );
        assert_eq!(publications[0].1.step, "anat_template");
    }

    #[test]
    fn longitudinal_template_is_unbiased() {
        let mut ctx = ctx();
        ctx.longitudinal = true;
        let (steps, _, _, _) = AnatConformRule
            .fragment(&ctx, &inputs(2))
            .unwrap()
            .into_parts();
        let template = steps.iter().find(|s| s.id == "anat_template").unwrap();
        assert_eq!(template.operation.params["flags"], "");
    }

    #[test]
    fn preproc_publishes_core_roles() {
        let fragment = AnatPreprocRule.fragment(&ctx(), &inputs(1)).unwrap();
        let roles: Vec<&str> = fragment.published_roles().collect();
        for role in [
            roles::T1W_PREPROC,
            roles::T1W_BRAIN,
            roles::BRAIN_MASK,
            roles::T1W_DSEG,
            roles::T1W_TPMS,
        ] {
            assert!(roles.contains(&role), "missing {}", role);
        }
    }

    #[test]
    fn mask_rule_only_without_recon() {
        let mut ctx = ctx();
        assert!(!MaskFromBrainExtractionRule.applies(&ctx, &inputs(1)));
        ctx.recon = ReconMethod::None;
        assert!(MaskFromBrainExtractionRule.applies(&ctx, &inputs(1)));

        let fragment = MaskFromBrainExtractionRule.fragment(&ctx, &inputs(1)).unwrap();
        assert_eq!(fragment.published_roles().collect::<Vec<_>>(), vec![roles::T1W_MASK]);
        assert_eq!(fragment.step_ids().count(), 0);
    }
}
