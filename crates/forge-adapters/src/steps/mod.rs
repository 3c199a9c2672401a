//! Steps del pipeline: provision → compile → package.
//!
//! Los tres comparten un `StageContext` (configuración, plan, tags y motor).
//! Los params de cada step se derivan de la configuración y entran al
//! fingerprint; los tags por ejecución no.
use forge_core::model::ArtifactSpec;
use forge_core::StepRunResultTyped;
use forge_domain::{HarnessLocator, PipelineConfig};
use std::sync::Arc;

use crate::engine::ContainerEngine;
use crate::error::PipelineError;
use crate::plan::BuildPlan;

pub mod compile;
pub mod package;
pub mod provision;

pub use compile::{CompileParams, CompileStep};
pub use package::{PackageParams, PackageStep};
pub use provision::{ProvisionParams, ProvisionStep};

/// Tags con los que se materializa cada etapa en una ejecución.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StageTags {
    pub provision: String,
    pub builder: String,
    pub runtime: String,
}

#[derive(Debug)]
pub struct StageContext {
    pub config: PipelineConfig,
    pub plan: BuildPlan,
    pub tags: StageTags,
    pub engine: Arc<dyn ContainerEngine>,
}

impl StageContext {
    pub fn new(config: PipelineConfig, tags: StageTags, engine: Arc<dyn ContainerEngine>) -> Self {
        let plan = BuildPlan::plan_for(&config);
        StageContext { config,
                       plan,
                       tags,
                       engine }
    }

    pub fn locator(&self) -> &HarnessLocator {
        &self.plan.locator
    }
}

pub(crate) fn fail<T: ArtifactSpec>(err: PipelineError) -> StepRunResultTyped<T> {
    log::error!("{err}");
    StepRunResultTyped::Failure { error: err.into_core() }
}
