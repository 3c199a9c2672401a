//! CompileStep (Transform)
//!
//! Copia el árbol fuente a la raíz fija, ejecuta `cargo fuzz build` en el
//! subdirectorio del fuzz target y comprueba que el harness quedó en la ruta
//! del locator.

use forge_core::{StepKind, StepRunResultTyped, TypedStep};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{fail, StageContext};
use crate::artifacts::{CompiledHarness, ProvisionedEnvironment};
use crate::engine::{BuildContext, ImageRef, StageBuild};
use crate::error::PipelineError;
use crate::plan::StageName;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompileParams {
    pub source_root: String,
    pub fuzz_target_dir: String,
    pub platform_triple: String,
    pub profile: String,
    pub harness_name: String,
    pub artifact_path: String,
}

#[derive(Debug, Clone)]
pub struct CompileStep {
    ctx: Arc<StageContext>,
}

impl CompileStep {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

impl TypedStep for CompileStep {
    type Params = CompileParams;
    type Input = ProvisionedEnvironment;
    type Output = CompiledHarness;

    fn id(&self) -> &'static str {
        "compile"
    }

    fn kind(&self) -> StepKind {
        StepKind::Transform
    }

    fn params_default(&self) -> Self::Params {
        let cfg = &self.ctx.config;
        CompileParams { source_root: cfg.source_root().to_string(),
                        fuzz_target_dir: cfg.fuzz_target_dir().to_string(),
                        platform_triple: cfg.platform_triple().to_string(),
                        profile: cfg.profile().to_string(),
                        harness_name: cfg.harness_name().to_string(),
                        artifact_path: self.ctx.locator().artifact_path() }
    }

    fn run_typed(&self, input: Option<Self::Input>, p: Self::Params) -> StepRunResultTyped<Self::Output> {
        let ctx = &self.ctx;
        let Some(env) = input else {
            return fail(PipelineError::Compilation("no provisioned build environment".into()));
        };
        let stage = match ctx.plan.stage(StageName::Builder) {
            Ok(s) => s,
            Err(e) => return fail(PipelineError::Compilation(e.to_string())),
        };
        let source_dir = ctx.config.source_dir();
        if !source_dir.is_dir() {
            return fail(PipelineError::Compilation(format!("source tree {} is not a directory",
                                                           source_dir.display())));
        }

        let tag = ctx.tags.builder.as_str();
        info!("compiling '{}' for {} ({}) in {tag}", p.harness_name, p.platform_triple, p.profile);
        let upstream = BTreeMap::from([(StageName::Provision, ImageRef::new(env.image))]);
        let build = StageBuild { stage,
                                 tag,
                                 context: BuildContext::Dir(source_dir.to_path_buf()),
                                 upstream: &upstream };
        let image = match ctx.engine.build_stage(&build) {
            Ok(image) => image,
            Err(e) => return fail(PipelineError::from_build(e, PipelineError::Compilation)),
        };

        // el build tool puede terminar bien sin dejar el binario esperado
        let info = match ctx.engine.probe(&image, &p.artifact_path) {
            Ok(Some(info)) if info.size > 0 => info,
            Ok(Some(_)) => {
                return fail(PipelineError::ArtifactMissing(format!("{} in {image} is empty", p.artifact_path)))
            }
            Ok(None) => {
                return fail(PipelineError::ArtifactMissing(format!("{} not found in {image}", p.artifact_path)))
            }
            Err(e) => return fail(PipelineError::Engine(e)),
        };
        info!("harness built at {} ({} bytes, mode {:o})", p.artifact_path, info.size, info.mode);

        StepRunResultTyped::Success { outputs: vec![CompiledHarness { builder_image: image.to_string(),
                                                                      artifact_path: p.artifact_path,
                                                                      harness_name: p.harness_name,
                                                                      size_bytes: info.size,
                                                                      mode: info.mode,
                                                                      schema_version: 1 }] }
    }
}
