//! forge-adapters: capa de adaptación dominio ↔ core.
//!
//! Este crate provee:
//! - El plan de build por etapas y su render a Dockerfile (`plan`).
//! - Los motores de contenedores (`engine`): docker CLI y en memoria.
//! - Los artifacts tipados que circulan entre steps (`artifacts`).
//! - Los tres steps del pipeline y `HarnessPipeline`, que los encadena sobre
//!   el `FlowEngine` del core.
//!
//! Nota: el core sólo conoce `Artifact { kind, hash, payload, metadata }`.
//! Aquí se le da semántica de imágenes de contenedor.

pub mod artifacts;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod steps;

pub use engine::{ContainerEngine, DockerCli, ImageRef, InMemoryImageEngine};
pub use error::{EngineError, PipelineError};
pub use pipeline::{HarnessPipeline, PipelineOutcome, PipelineRun};
pub use plan::{render_dockerfile, BuildPlan, StageName};
