//! Motores de contenedores.
//!
//! `ContainerEngine` es la única interfaz que los steps usan para
//! materializar imágenes. `DockerCli` la implementa sobre el CLI de docker;
//! `InMemoryImageEngine` modela cada imagen como un mapa de archivos.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug};
use std::path::PathBuf;

use crate::error::EngineError;
use crate::plan::{StageName, StagePlan};

mod docker;
mod memory;

pub use docker::DockerCli;
pub use memory::{cargo_fuzz_simulator, FileEntry, ImageFs, InMemoryImageEngine, Invocation};

/// Referencia a una imagen materializada (tag o id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        ImageRef(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contexto de build que ve `COPY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildContext {
    Empty,
    Dir(PathBuf),
}

/// Petición de construir una etapa con un tag dado.
#[derive(Debug)]
pub struct StageBuild<'a> {
    pub stage: &'a StagePlan,
    pub tag: &'a str,
    pub context: BuildContext,
    pub upstream: &'a BTreeMap<StageName, ImageRef>,
}

impl StageBuild<'_> {
    pub(crate) fn upstream_tags(&self) -> BTreeMap<StageName, String> {
        self.upstream
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: u64,
    pub mode: u32,
}

impl FileInfo {
    pub fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }
}

pub trait ContainerEngine: Debug + Send + Sync {
    /// Construye la etapa y devuelve la imagen resultante. Un fallo no deja
    /// ninguna imagen con ese tag.
    fn build_stage(&self, build: &StageBuild<'_>) -> Result<ImageRef, EngineError>;

    /// Tamaño y permisos de un archivo regular de la imagen; `None` si no existe.
    fn probe(&self, image: &ImageRef, path: &str) -> Result<Option<FileInfo>, EngineError>;

    /// Todos los archivos regulares de la imagen.
    fn list_files(&self, image: &ImageRef) -> Result<BTreeSet<String>, EngineError>;

    fn remove_image(&self, image: &ImageRef) -> Result<(), EngineError>;
}
