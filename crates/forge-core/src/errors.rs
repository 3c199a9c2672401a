//! Errores específicos del core.
//!
//! `CoreEngineError` se serializa dentro de los eventos `StepFailed`, por eso
//! es `Clone + Serialize` y no envuelve errores de otras librerías.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreEngineError {
    #[error("flow already completed")]
    FlowCompleted,
    #[error("flow has failed previously (stop-on-failure invariant)")]
    FlowHasFailed,
    #[error("first step must be source kind")]
    FirstStepMustBeSource,
    #[error("missing required inputs")]
    MissingInputs,
    #[error("invalid input artifact: {0}")]
    InvalidInput(String),
    /// Fallo terminal reportado por un step. `category` es la clasificación
    /// que el adaptador asigna (p. ej. "compilation").
    #[error("{category} failure: {message}")]
    StepFailed { category: String, message: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl CoreEngineError {
    /// Atajo para construir `StepFailed`.
    pub fn step_failed(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepFailed { category: category.into(),
                           message: message.into() }
    }
}
