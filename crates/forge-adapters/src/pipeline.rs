//! `HarnessPipeline`: arma el flujo provision → compile → package sobre el
//! `FlowEngine` del core y lo ejecuta una vez.
use forge_core::model::ArtifactSpec;
use forge_core::{CoreEngineError, FlowEngine, FlowEvent};
use forge_domain::{HarnessLocator, PipelineConfig};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::artifacts::{CompiledHarness, ProvisionedEnvironment, RuntimeImage};
use crate::engine::{ContainerEngine, ImageRef};
use crate::error::PipelineError;
use crate::plan::BuildPlan;
use crate::steps::{CompileStep, PackageStep, ProvisionStep, StageContext, StageTags};

/// Resultado de una ejecución exitosa.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub flow_id: Uuid,
    pub flow_fingerprint: String,
    pub provisioned: ProvisionedEnvironment,
    pub compiled: CompiledHarness,
    pub runtime: RuntimeImage,
}

/// Ejecución completa: log de eventos más el resultado.
#[derive(Debug)]
pub struct PipelineRun {
    pub flow_id: Uuid,
    pub events: Vec<FlowEvent>,
    pub outcome: Result<PipelineOutcome, PipelineError>,
}

#[derive(Debug)]
pub struct HarnessPipeline {
    ctx: Arc<StageContext>,
    run_id: Uuid,
}

impl HarnessPipeline {
    pub fn new(config: PipelineConfig, engine: Arc<dyn ContainerEngine>) -> Self {
        Self::with_run_id(config, engine, Uuid::new_v4())
    }

    /// Igual que `new` con un id de ejecución fijo (tags y flow id
    /// deterministas).
    pub fn with_run_id(config: PipelineConfig, engine: Arc<dyn ContainerEngine>, run_id: Uuid) -> Self {
        let tags = stage_tags(&config, run_id);
        HarnessPipeline { ctx: Arc::new(StageContext::new(config, tags, engine)),
                          run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn tags(&self) -> &StageTags {
        &self.ctx.tags
    }

    pub fn plan(&self) -> &BuildPlan {
        &self.ctx.plan
    }

    pub fn locator(&self) -> &HarnessLocator {
        self.ctx.locator()
    }

    pub fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        self.run_recorded().outcome
    }

    /// Ejecuta el flujo y devuelve también los eventos registrados.
    pub fn run_recorded(&self) -> PipelineRun {
        let flow_id = self.run_id;
        if let Err(e) = self.ctx.plan.check_abi_parity() {
            return PipelineRun { flow_id,
                                 events: Vec::new(),
                                 outcome: Err(PipelineError::Core(CoreEngineError::InvalidInput(e.to_string()))) };
        }

        let mut engine = FlowEngine::new().first_step(ProvisionStep::new(self.ctx.clone()))
                                          .add_step(CompileStep::new(self.ctx.clone()))
                                          .add_step(PackageStep::new(self.ctx.clone()))
                                          .build();
        engine.set_default_flow_id(flow_id);
        info!("pipeline {flow_id}: building harness '{}'", self.ctx.config.harness_name());
        let result = engine.run();
        let events = engine.events_for(flow_id);
        self.discard_build_env();

        let outcome = match result {
            Ok(flow_id) => collect_outcome(&engine, flow_id),
            Err(e) => Err(PipelineError::from_core(e)),
        };
        match &outcome {
            Ok(o) => info!("pipeline {flow_id}: runtime image {} ready", o.runtime.image),
            Err(e) => warn!("pipeline {flow_id}: {e}"),
        }
        PipelineRun { flow_id,
                      events,
                      outcome }
    }

    fn discard_build_env(&self) {
        if self.ctx.config.keep_build_env() {
            info!("keeping build environment images {} and {}",
                  self.ctx.tags.provision,
                  self.ctx.tags.builder);
            return;
        }
        for tag in [&self.ctx.tags.builder, &self.ctx.tags.provision] {
            // una etapa que no llegó a construirse no tiene imagen que borrar
            if let Err(e) = self.ctx.engine.remove_image(&ImageRef::new(tag.clone())) {
                debug!("build environment image {tag} not removed: {e}");
            }
        }
    }
}

fn stage_tags(config: &PipelineConfig, run_id: Uuid) -> StageTags {
    let id = run_id.simple().to_string();
    let short = &id[..12];
    let prefix = format!("{}/{}", config.image_repository(), config.harness_name());
    StageTags { provision: format!("{prefix}-provision:{short}"),
                builder: format!("{prefix}-builder:{short}"),
                runtime: config.output_tag()
                               .map(|t| t.to_string())
                               .unwrap_or_else(|| format!("{prefix}:{short}")) }
}

fn single_output<T: ArtifactSpec, E, R>(engine: &FlowEngine<E, R>,
                                        flow_id: Uuid,
                                        step_id: &str)
                                        -> Result<T, PipelineError>
    where E: forge_core::EventStore,
          R: forge_core::FlowRepository
{
    let outputs = engine.outputs_of(flow_id, step_id);
    let artifact = outputs.first()
                          .ok_or_else(|| {
                              PipelineError::Core(CoreEngineError::Internal(format!("step '{step_id}' produced no output")))
                          })?;
    T::from_artifact(artifact).map_err(|e| PipelineError::Core(CoreEngineError::Internal(e.to_string())))
}

fn collect_outcome<E, R>(engine: &FlowEngine<E, R>, flow_id: Uuid) -> Result<PipelineOutcome, PipelineError>
    where E: forge_core::EventStore,
          R: forge_core::FlowRepository
{
    let flow_fingerprint =
        engine.flow_fingerprint()
              .ok_or_else(|| PipelineError::Core(CoreEngineError::Internal("flow finished without fingerprint".into())))?;
    Ok(PipelineOutcome { flow_id,
                         flow_fingerprint,
                         provisioned: single_output(engine, flow_id, "provision")?,
                         compiled: single_output(engine, flow_id, "compile")?,
                         runtime: single_output(engine, flow_id, "package")? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_domain::ImageTag;

    #[test]
    fn tags_are_derived_from_run_id() {
        let run = Uuid::parse_str("0123456789abcdef0123456789abcdef").unwrap();
        let tags = stage_tags(&PipelineConfig::default(), run);
        assert_eq!(tags.provision, "fuzzforge/interaction-provision:0123456789ab");
        assert_eq!(tags.builder, "fuzzforge/interaction-builder:0123456789ab");
        assert_eq!(tags.runtime, "fuzzforge/interaction:0123456789ab");

        let cfg = PipelineConfig::builder().output_tag(Some(ImageTag::parse("ci/interaction:nightly").unwrap()))
                                           .build()
                                           .unwrap();
        assert_eq!(stage_tags(&cfg, run).runtime, "ci/interaction:nightly");
    }
}
