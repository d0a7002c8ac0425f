//! CIFTI grayordinate morphometrics.

use super::{AssemblyRule, RulePriority};
use crate::config::CiftiDensity;
use crate::context::RunContext;
use crate::error::Result;
use crate::graph::fragment::Fragment;
use crate::graph::roles::{self, hemi_role, HEMISPHERES};
use crate::inputs::AvailableInputs;
use crate::steps::{Resources, SlotKind, StepDescriptor};

const METRICS: [(&str, &str, &str); 3] = [
    ("thickness", roles::THICKNESS, roles::CIFTI_THICKNESS),
    ("curv", roles::CURV, roles::CIFTI_CURV),
    ("sulc", roles::SULC, roles::CIFTI_SULC),
];

/// Resample morphometrics to fsLR and combine both hemispheres.
pub struct CiftiGrayordinatesRule;

fn resample_step(hemi: &str, density: CiftiDensity) -> Result<StepDescriptor> {
    let mesh = density.mesh_density();
    let label = if hemi == "lh" { "L" } else { "R" };
    let mut builder = StepDescriptor::builder(format!("fslr_resample_{}", hemi), "resample_fslr")
        .title(format!("Resample {} morphometrics to fsLR {}", hemi, mesh))
        .param("density", mesh)
        .param(
            "target_sphere",
            format!("fsLR_hemi-{}_den-{}_sphere.surf.gii", label, mesh),
        )
        .param(
            "target_midthickness",
            format!("fsLR_hemi-{}_den-{}_desc-vaavg_midthickness.shape.gii", label, mesh),
        )
        .input("sphere_reg", SlotKind::Surface)
        .input("midthickness", SlotKind::Surface)
        .resources(Resources::gib(1, 2.0));
    for (metric, _, _) in METRICS {
        builder = builder.input(metric, SlotKind::Morphometry).output(
            metric,
            SlotKind::Morphometry,
            format!(
                "${{step_dir}}/hemi-{}_space-fsLR_den-{}_{}.shape.gii",
                label, mesh, metric
            ),
        );
    }
    builder.build()
}

impl AssemblyRule for CiftiGrayordinatesRule {
    fn name(&self) -> &str {
        "cifti_grayordinates"
    }

    fn priority(&self) -> RulePriority {
        RulePriority(410)
    }

    fn description(&self) -> &str {
        "Resample morphometrics to fsLR and write CIFTI grayordinates"
    }

    fn applies(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> bool {
        ctx.cifti.is_some() && ctx.recon.is_enabled()
    }

    fn fragment(&self, ctx: &RunContext, _inputs: &AvailableInputs) -> Result<Fragment> {
        let mut fragment = Fragment::new();
        let Some(density) = ctx.cifti else {
            return Ok(fragment);
        };

        for hemi in HEMISPHERES {
            let id = format!("fslr_resample_{}", hemi);
            fragment
                .add_step(resample_step(hemi, density)?)
                .from_role(&id, "sphere_reg", &hemi_role(roles::FS_SPHERE_REG, hemi))
                .from_role(
                    &id,
                    "midthickness",
                    &hemi_role(roles::SURFACE_MIDTHICKNESS, hemi),
                );
            for (metric, source, _) in METRICS {
                fragment.from_role(&id, metric, &hemi_role(source, hemi));
            }
        }

        let mut builder = StepDescriptor::builder("morph_grayords", "morph_grayords")
            .title(format!("CIFTI morphometrics ({})", density))
            .param("density", density.as_str())
            .resources(Resources::gib(1, 2.0));
        for (metric, _, _) in METRICS {
            builder = builder.output(
                metric,
                SlotKind::Cifti,
                format!("${{step_dir}}/space-fsLR_den-{}_{}.dscalar.nii", density, metric),
            );
            for hemi in HEMISPHERES {
                builder = builder.input(format!("{}_{}", hemi, metric), SlotKind::Morphometry);
            }
        }
        fragment.add_step(builder.build()?);

        for (metric, _, published) in METRICS {
            for hemi in HEMISPHERES {
                fragment.from_step(
                    "morph_grayords",
                    &format!("{}_{}", hemi, metric),
                    &format!("fslr_resample_{}", hemi),
                    metric,
                );
            }
            fragment.publish(published, "morph_grayords", metric);
        }

        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconMethod;
    use crate::context::Layout;
    use std::path::Path;

    fn ctx(density: Option<CiftiDensity>) -> RunContext {
        let mut ctx = RunContext::new("01", Layout::under(Path::new("/s")));
        ctx.cifti = density;
        ctx
    }

    #[test]
    fn applies_with_density_and_recon() {
        let inputs = AvailableInputs::default();
        assert!(!CiftiGrayordinatesRule.applies(&ctx(None), &inputs));
        assert!(CiftiGrayordinatesRule.applies(&ctx(Some(CiftiDensity::K91)), &inputs));

        let mut no_recon = ctx(Some(CiftiDensity::K91));
        no_recon.recon = ReconMethod::None;
        assert!(!CiftiGrayordinatesRule.applies(&no_recon, &inputs));
    }

    #[test]
    fn density_selects_fslr_mesh() {
        let fragment = CiftiGrayordinatesRule
            .fragment(&ctx(Some(CiftiDensity::K170)), &AvailableInputs::default())
            .unwrap();
        assert_eq!(
            fragment.step_ids().collect::<Vec<_>>(),
            vec!["fslr_resample_lh", "fslr_resample_rh", "morph_grayords"]
        );
        assert_eq!(
            fragment.published_roles().collect::<Vec<_>>(),
            vec!["cifti_thickness", "cifti_curv", "cifti_sulc"]
        );

        let (steps, _, _, _) = fragment.into_parts();
        assert_eq!(steps[0].operation.params["density"], "59k");
        assert_eq!(steps[2].operation.params["density"], "170k");
        assert_eq!(steps[2].inputs.len(), 6);
    }
}
