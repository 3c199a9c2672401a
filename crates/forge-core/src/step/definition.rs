use serde_json::{json, Value};

use super::run_result::StepRunResult;
use crate::model::ExecutionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Source,
    Transform,
    Sink,
}

/// Trait que define un Step. El engine sólo conoce esta interfaz.
pub trait StepDefinition {
    /// Identificador estable y único dentro del Flow.
    fn id(&self) -> &str;

    /// Parámetros base deterministas. Entran al fingerprint del step.
    fn base_params(&self) -> Value;

    /// Ejecución del step a partir de input + params.
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult;

    /// Tipo general del step.
    fn kind(&self) -> StepKind;

    /// Hash de la definición del step (id, kind, params base).
    fn definition_hash(&self) -> String {
        crate::hashing::hash_value(&json!({
            "id": self.id(),
            "kind": format!("{:?}", self.kind()),
            "base_params": self.base_params(),
        }))
    }
}
