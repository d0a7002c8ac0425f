//! Spatial normalization to each requested template.

use super::{AssemblyRule, RulePriority};
use crate::context::RunContext;
use crate::error::Result;
use crate::graph::fragment::Fragment;
use crate::graph::roles;
use crate::inputs::AvailableInputs;
use crate::steps::{Resources, SlotKind, StepDescriptor};

/// One registration branch per volume template.
///
/// The branches only depend on the bias-corrected image and the
/// brain-extraction mask, so they run alongside surface reconstruction.
pub struct NormalizationRule;

impl NormalizationRule {
    /// Step id of the registration to `template`.
    pub fn step_id(template: &str) -> String {
        format!("norm_{}", template)
    }
}

impl AssemblyRule for NormalizationRule {
    fn name(&self) -> &str {
        "normalization"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(200)
    }

    fn description(&self) -> &str {
        "Register the T1w reference to every requested template space"
    }

    fn applies(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        !ctx.volume_templates().is_empty()
    }

    fn fragment(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> Result<Fragment> {
        let mut fragment = Fragment::new();

        for template in ctx.volume_templates() {
            let id = Self::step_id(&template);
            let step = StepDescriptor::builder(&id, "ants_registration")
                .title(format!("Normalize to {}", template))
                .input("moving_image", SlotKind::Volume)
                .input("moving_mask", SlotKind::Mask)
                .param("template", template.as_str())
                .output(
                    "warped",
                    SlotKind::Volume,
                    format!("${{step_dir}}/space-{}_T1w.nii.gz", template),
                )
                .output(
                    "anat2std_xfm",
                    SlotKind::Transform,
                    format!("${{step_dir}}/from-T1w_to-{}_xfm.h5", template),
                )
                .output(
                    "std2anat_xfm",
                    SlotKind::Transform,
                    format!("${{step_dir}}/from-{}_to-T1w_xfm.h5", template),
                )
                .resources(Resources::gib(ctx.omp_nthreads, 6.0))
                .build()?;

            fragment
                .add_step(step)
                .from_role(&id, "moving_image", roles::T1W_PREPROC)
                .from_role(&id, "moving_mask", roles::BRAIN_MASK)
                .publish(
                    roles::space_role(roles::T1W_PREPROC, &template),
                    &id,
                    "warped",
                )
                .publish(
                    roles::space_role(roles::ANAT2STD_XFM, &template),
                    &id,
                    "anat2std_xfm",
                )
                .publish(
                    roles::space_role(roles::STD2ANAT_XFM, &template),
                    &id,
                    "std2anat_xfm",
                );
        }

        Ok(fragment)
    }
}
