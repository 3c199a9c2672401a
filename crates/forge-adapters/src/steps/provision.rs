//! ProvisionStep (Source)
//!
//! Materializa la etapa `provision` desde la imagen base: paquetes nativos,
//! instalador del toolchain, canal nightly por defecto y cargo-fuzz.

use forge_core::{StepKind, StepRunResultTyped, TypedStep};
use forge_domain::InstallerSource;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{fail, StageContext};
use crate::artifacts::ProvisionedEnvironment;
use crate::engine::{BuildContext, StageBuild};
use crate::error::PipelineError;
use crate::plan::StageName;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProvisionParams {
    pub base_image: String,
    pub native_packages: Vec<String>,
    pub installer_trust: String,
    pub toolchain: String,
    pub fuzz_tool: String,
}

#[derive(Debug, Clone)]
pub struct ProvisionStep {
    ctx: Arc<StageContext>,
}

impl ProvisionStep {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

fn fuzz_tool_label(ctx: &StageContext) -> String {
    let tool = ctx.config.fuzz_tool();
    match &tool.version {
        Some(v) => format!("{}@{v}", tool.krate),
        None => tool.krate.clone(),
    }
}

impl TypedStep for ProvisionStep {
    type Params = ProvisionParams;
    // Source: el input se ignora
    type Input = ProvisionedEnvironment;
    type Output = ProvisionedEnvironment;

    fn id(&self) -> &'static str {
        "provision"
    }

    fn kind(&self) -> StepKind {
        StepKind::Source
    }

    fn params_default(&self) -> Self::Params {
        let cfg = &self.ctx.config;
        ProvisionParams { base_image: cfg.base_image().to_string(),
                          native_packages: cfg.native_packages().to_vec(),
                          installer_trust: cfg.installer().trust_label(),
                          toolchain: cfg.toolchain().to_string(),
                          fuzz_tool: fuzz_tool_label(&self.ctx) }
    }

    fn run_typed(&self, _input: Option<Self::Input>, p: Self::Params) -> StepRunResultTyped<Self::Output> {
        let ctx = &self.ctx;
        let stage = match ctx.plan.stage(StageName::Provision) {
            Ok(s) => s,
            Err(e) => return fail(PipelineError::Provisioning(e.to_string())),
        };
        if let InstallerSource::RemoteScript { url, .. } = ctx.config.installer() {
            warn!("toolchain installer {url} is fetched and executed without a pinned checksum");
        }
        if !ctx.config.toolchain().is_pinned() {
            info!("toolchain channel '{}' is not pinned to a date", p.toolchain);
        }

        let tag = ctx.tags.provision.as_str();
        info!("provisioning build environment {tag} from {}", p.base_image);
        let upstream = BTreeMap::new();
        let build = StageBuild { stage,
                                 tag,
                                 context: BuildContext::Empty,
                                 upstream: &upstream };
        match ctx.engine.build_stage(&build) {
            Ok(image) => {
                info!("build environment {image} ready");
                StepRunResultTyped::Success { outputs: vec![ProvisionedEnvironment { image: image.to_string(),
                                                                                     base_image: p.base_image,
                                                                                     toolchain: p.toolchain,
                                                                                     installer_trust:
                                                                                         p.installer_trust,
                                                                                     fuzz_tool: p.fuzz_tool,
                                                                                     schema_version: 1 }] }
            }
            Err(e) => fail(PipelineError::from_build(e, PipelineError::Provisioning)),
        }
    }
}
