use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreEngineError;

/// Lo que ocurrió. Orden válido por flujo: `FlowInitialized`, luego pares
/// `StepStarted`/`StepFinished`, y al final `FlowCompleted` o un único
/// `StepFailed` que cierra el flujo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEventKind {
    FlowInitialized {
        definition_hash: String,
        step_count: usize,
    },
    StepStarted {
        step_index: usize,
        step_id: String,
    },
    /// `outputs` son los hashes canónicos de los artifacts emitidos.
    StepFinished {
        step_index: usize,
        step_id: String,
        outputs: Vec<String>,
        fingerprint: String,
    },
    StepFailed {
        step_index: usize,
        step_id: String,
        error: CoreEngineError,
        fingerprint: String,
    },
    FlowCompleted {
        flow_fingerprint: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEvent {
    /// Posición dentro del flujo, asignada por el store.
    pub seq: u64,
    pub flow_id: Uuid,
    pub kind: FlowEventKind,
    /// No entra en ningún fingerprint.
    pub recorded_at: DateTime<Utc>,
}
