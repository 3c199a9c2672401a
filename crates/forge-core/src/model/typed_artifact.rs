//! Infraestructura de tipado fuerte para `Artifact` manteniendo el núcleo
//! agnóstico. Permite describir artefactos con un tipo de datos concreto (T)
//! y versión de esquema, apoyándose en generics y serde.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{Artifact, ArtifactKind};

/// Errores posibles al codificar/decodificar un artifact tipado.
#[derive(Debug, Error)]
pub enum ArtifactDecodeError {
    #[error("artifact kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch { expected: ArtifactKind, found: ArtifactKind },
    #[error("schema version mismatch: expected {expected}, found {found:?}")]
    VersionMismatch { expected: u32, found: Option<u32> },
    #[error("artifact payload does not decode: {0}")]
    Deserialize(String),
    #[error("artifact does not serialize: {0}")]
    Serialize(String),
}

/// Campo del payload que lleva la versión de esquema.
const VERSION_FIELD: &str = "schema_version";

/// Especificación abstracta de un artifact tipado.
pub trait ArtifactSpec: Sized + Serialize + DeserializeOwned + Clone {
    /// Kind asociado (permite distinguir en runtime).
    const KIND: ArtifactKind;
    /// Versión de esquema (incrementar en cambios incompatibles).
    const SCHEMA_VERSION: u32 = 1;

    /// Serializa a `Artifact` sin hash (lo añadirá el engine).
    fn into_artifact(self) -> Result<Artifact, ArtifactDecodeError> {
        let mut value = serde_json::to_value(&self).map_err(|e| ArtifactDecodeError::Serialize(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.entry(VERSION_FIELD.to_string())
               .or_insert(Value::from(Self::SCHEMA_VERSION));
        }
        Ok(Artifact::unhashed(Self::KIND, value))
    }

    /// Decodifica desde artifact neutro verificando kind y versión.
    fn from_artifact(a: &Artifact) -> Result<Self, ArtifactDecodeError> {
        if a.kind != Self::KIND {
            return Err(ArtifactDecodeError::KindMismatch { expected: Self::KIND,
                                                           found: a.kind });
        }
        let found_version = a.payload
                             .get(VERSION_FIELD)
                             .and_then(Value::as_u64)
                             .and_then(|v| u32::try_from(v).ok());
        if found_version != Some(Self::SCHEMA_VERSION) {
            return Err(ArtifactDecodeError::VersionMismatch { expected: Self::SCHEMA_VERSION,
                                                              found: found_version });
        }
        serde_json::from_value(a.payload.clone()).map_err(|e| ArtifactDecodeError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Image {
        tag: String,
        schema_version: u32,
    }

    impl ArtifactSpec for Image {
        const KIND: ArtifactKind = ArtifactKind::ImageRecord;
        const SCHEMA_VERSION: u32 = 2;
    }

    #[test]
    fn kind_and_schema_version_are_checked() {
        let img = Image { tag: "fuzzforge-runtime:1".into(),
                          schema_version: 2 };
        let artifact = img.clone().into_artifact().unwrap();
        assert_eq!(Image::from_artifact(&artifact).unwrap(), img);

        let stale = Artifact::unhashed(ArtifactKind::ImageRecord, json!({"tag": "x", "schema_version": 1}));
        assert!(matches!(Image::from_artifact(&stale),
                         Err(ArtifactDecodeError::VersionMismatch { expected: 2, found: Some(1) })));

        let generic = Artifact::unhashed(ArtifactKind::GenericJson, json!({"tag": "x", "schema_version": 2}));
        assert!(matches!(Image::from_artifact(&generic), Err(ArtifactDecodeError::KindMismatch { .. })));
    }
}
