//! Unidad de datos que viaja entre steps.
//!
//! El engine no interpreta `payload`; sólo le calcula el hash canónico al
//! guardarlo. `metadata` queda fuera del hash.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    GenericJson,
    /// Registro de una imagen de contenedor producida por un step.
    ImageRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Vacío hasta que el engine lo almacena.
    pub hash: String,
    pub payload: Value,
    pub metadata: Option<Value>,
}

impl Artifact {
    pub(crate) fn unhashed(kind: ArtifactKind, payload: Value) -> Self {
        Artifact { kind,
                   hash: String::new(),
                   payload,
                   metadata: None }
    }
}
