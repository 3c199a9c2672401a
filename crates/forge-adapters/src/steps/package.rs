//! PackageStep (Sink)
//!
//! Construye la imagen runtime desde la misma imagen base y copia sólo el
//! harness a la raíz. Después verifica que el archivo es ejecutable y, si
//! `verify_minimal` está activo, que la imagen es exactamente base + harness.

use forge_core::{StepKind, StepRunResultTyped, TypedStep};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{fail, StageContext};
use crate::artifacts::{CompiledHarness, RuntimeImage};
use crate::engine::{BuildContext, FileInfo, ImageRef, StageBuild};
use crate::error::PipelineError;
use crate::plan::StageName;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PackageParams {
    pub base_image: String,
    pub source_path: String,
    pub runtime_path: String,
    pub verify_minimal: bool,
}

#[derive(Debug, Clone)]
pub struct PackageStep {
    ctx: Arc<StageContext>,
}

impl PackageStep {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    /// Comprobaciones sobre la imagen runtime ya construida.
    fn verify(&self, image: &ImageRef, p: &PackageParams) -> Result<(FileInfo, Vec<String>), PipelineError> {
        let engine = &self.ctx.engine;
        let info = engine.probe(image, &p.runtime_path)?
                         .ok_or_else(|| PipelineError::ArtifactMissing(format!("{} not found in {image}", p.runtime_path)))?;
        if !info.is_executable() {
            return Err(PipelineError::Packaging(format!("{} in {image} lost its executable bit (mode {:o})",
                                                        p.runtime_path, info.mode)));
        }

        let runtime_files = engine.list_files(image)?;
        let base_files = engine.list_files(&ImageRef::new(p.base_image.clone()))?;
        let added: Vec<String> = runtime_files.difference(&base_files).cloned().collect();
        if p.verify_minimal {
            let expected = BTreeSet::from([p.runtime_path.clone()]);
            let missing: Vec<&String> = base_files.difference(&runtime_files).collect();
            if added.iter().cloned().collect::<BTreeSet<_>>() != expected || !missing.is_empty() {
                return Err(PipelineError::Packaging(format!("runtime image {image} is not base + {}: added {added:?}, \
                                                             removed {missing:?}",
                                                            p.runtime_path)));
            }
            debug!("runtime image {image} verified minimal");
        }
        Ok((info, added))
    }
}

impl TypedStep for PackageStep {
    type Params = PackageParams;
    type Input = CompiledHarness;
    type Output = RuntimeImage;

    fn id(&self) -> &'static str {
        "package"
    }

    fn kind(&self) -> StepKind {
        StepKind::Sink
    }

    fn params_default(&self) -> Self::Params {
        let locator = self.ctx.locator();
        PackageParams { base_image: self.ctx.config.base_image().to_string(),
                        source_path: locator.artifact_path(),
                        runtime_path: locator.runtime_path(),
                        verify_minimal: self.ctx.config.verify_minimal() }
    }

    fn run_typed(&self, input: Option<Self::Input>, p: Self::Params) -> StepRunResultTyped<Self::Output> {
        let ctx = &self.ctx;
        let Some(compiled) = input else {
            return fail(PipelineError::ArtifactMissing("no compiled harness".into()));
        };
        // la ruta de origen sale del mismo locator que usó la compilación
        if compiled.artifact_path != p.source_path {
            return fail(PipelineError::ArtifactMissing(format!("compiled harness at {} but packaging expects {}",
                                                               compiled.artifact_path, p.source_path)));
        }
        let builder = ImageRef::new(compiled.builder_image.clone());
        match ctx.engine.probe(&builder, &p.source_path) {
            Ok(Some(info)) if info.size > 0 => {}
            Ok(_) => {
                return fail(PipelineError::ArtifactMissing(format!("missing source path {} in {builder}",
                                                                   p.source_path)))
            }
            Err(e) => return fail(PipelineError::Engine(e)),
        }

        let stage = match ctx.plan.stage(StageName::Runtime) {
            Ok(s) => s,
            Err(e) => return fail(PipelineError::Packaging(e.to_string())),
        };
        let tag = ctx.tags.runtime.as_str();
        info!("packaging {} into {tag} from {}", p.runtime_path, p.base_image);
        let upstream = BTreeMap::from([(StageName::Builder, builder)]);
        let build = StageBuild { stage,
                                 tag,
                                 context: BuildContext::Empty,
                                 upstream: &upstream };
        let image = match ctx.engine.build_stage(&build) {
            Ok(image) => image,
            Err(e) => return fail(PipelineError::from_build(e, PipelineError::Packaging)),
        };

        match self.verify(&image, &p) {
            Ok((info, added_files)) => {
                info!("runtime image {image} ready with {}", p.runtime_path);
                StepRunResultTyped::Success { outputs: vec![RuntimeImage { image: image.to_string(),
                                                                           base_image: p.base_image,
                                                                           harness_path: p.runtime_path,
                                                                           size_bytes: info.size,
                                                                           mode: info.mode,
                                                                           added_files,
                                                                           schema_version: 1 }] }
            }
            Err(err) => {
                // no se deja una imagen runtime que no pasó la verificación
                if let Err(e) = ctx.engine.remove_image(&image) {
                    warn!("could not remove rejected runtime image {image}: {e}");
                }
                fail(err)
            }
        }
    }
}
