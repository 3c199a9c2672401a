//! forge-core: motor lineal determinista.
//!
//! Ejecuta una secuencia fija de steps, encadenando un único artifact entre
//! pasos, registrando eventos append-only y deteniéndose en el primer fallo.
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod repo;
pub mod step;

pub use engine::{EngineBuilder, EngineBuilderInit, FlowEngine, Progress, SameAs};
pub use errors::CoreEngineError;
pub use event::{EventStore, FlowEvent, FlowEventKind, InMemoryEventStore};
pub use model::{Artifact, ArtifactKind, ArtifactSpec, ExecutionContext};
pub use repo::{FlowDefinition, FlowRepository, InMemoryFlowRepository, StepStatus};
pub use step::{StepDefinition, StepKind, StepRunResult, StepRunResultTyped, TypedStep};
