//! Errores de la capa de adaptación.
//!
//! `EngineError` describe fallos del motor de contenedores; `PipelineError`
//! es la taxonomía que ve quien invoca el pipeline.
use forge_core::CoreEngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command exited with status {status}: {stderr}")]
    CommandFailed { status: i32, stderr: String },
    #[error("unknown image '{0}'")]
    UnknownImage(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch { url: String, expected: String, actual: String },
    #[error("unparseable engine output: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provisioning failed: {0}")]
    Provisioning(String),
    #[error("compilation failed: {0}")]
    Compilation(String),
    #[error("artifact missing: {0}")]
    ArtifactMissing(String),
    #[error("packaging failed: {0}")]
    Packaging(String),
    #[error("container engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("flow engine error: {0}")]
    Core(CoreEngineError),
}

pub const CATEGORY_PROVISIONING: &str = "provisioning";
pub const CATEGORY_COMPILATION: &str = "compilation";
pub const CATEGORY_ARTIFACT_MISSING: &str = "artifact-missing";
pub const CATEGORY_PACKAGING: &str = "packaging";
pub const CATEGORY_ENGINE: &str = "engine";

impl PipelineError {
    /// Categoría registrada en el evento `StepFailed`.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Provisioning(_) => CATEGORY_PROVISIONING,
            PipelineError::Compilation(_) => CATEGORY_COMPILATION,
            PipelineError::ArtifactMissing(_) => CATEGORY_ARTIFACT_MISSING,
            PipelineError::Packaging(_) => CATEGORY_PACKAGING,
            PipelineError::Engine(_) => CATEGORY_ENGINE,
            // un fallo del motor leído de vuelta desde los eventos
            PipelineError::Core(CoreEngineError::StepFailed { category, .. }) if category == CATEGORY_ENGINE => {
                CATEGORY_ENGINE
            }
            PipelineError::Core(_) => "core",
        }
    }

    /// Clasifica un fallo de `build_stage`: lo que falló dentro del build
    /// cuenta para la etapa, lo demás es del motor.
    pub fn from_build(err: EngineError, stage: fn(String) -> PipelineError) -> Self {
        match err {
            EngineError::CommandFailed { .. } | EngineError::ChecksumMismatch { .. } => stage(err.to_string()),
            other => PipelineError::Engine(other),
        }
    }

    /// Código de salida del proceso para este error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Provisioning(_) => 10,
            PipelineError::Compilation(_) => 11,
            PipelineError::ArtifactMissing(_) => 12,
            PipelineError::Packaging(_) => 13,
            PipelineError::Engine(_) | PipelineError::Core(_) => 1,
        }
    }

    /// Convierte a la forma serializable que guarda el motor de flujos.
    pub fn into_core(self) -> CoreEngineError {
        match self {
            PipelineError::Core(e) => e,
            other => CoreEngineError::step_failed(other.category(), other.message()),
        }
    }

    /// Reconstruye el error a partir de lo registrado por el motor.
    pub fn from_core(err: CoreEngineError) -> Self {
        match err {
            CoreEngineError::StepFailed { category, message } => match category.as_str() {
                CATEGORY_PROVISIONING => PipelineError::Provisioning(message),
                CATEGORY_COMPILATION => PipelineError::Compilation(message),
                CATEGORY_ARTIFACT_MISSING => PipelineError::ArtifactMissing(message),
                CATEGORY_PACKAGING => PipelineError::Packaging(message),
                _ => PipelineError::Core(CoreEngineError::StepFailed { category, message }),
            },
            other => PipelineError::Core(other),
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::Provisioning(m)
            | PipelineError::Compilation(m)
            | PipelineError::ArtifactMissing(m)
            | PipelineError::Packaging(m) => m.clone(),
            PipelineError::Engine(e) => e.to_string(),
            PipelineError::Core(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_survives_the_core_round_trip() {
        let err = PipelineError::Compilation("cargo fuzz build exited with 101".into());
        let core = err.into_core();
        assert_eq!(core,
                   CoreEngineError::step_failed("compilation", "cargo fuzz build exited with 101"));
        let back = PipelineError::from_core(core);
        assert!(matches!(back, PipelineError::Compilation(ref m) if m.contains("101")));
        assert_eq!(back.exit_code(), 11);
    }

    #[test]
    fn engine_failures_keep_their_category() {
        let err = PipelineError::Engine(EngineError::UnknownImage("ubuntu:20.04".into()));
        let back = PipelineError::from_core(err.into_core());
        assert_eq!(back.exit_code(), 1);
        assert_eq!(back.category(), "engine");
        assert!(matches!(back, PipelineError::Core(CoreEngineError::StepFailed { ref category, .. }) if category == "engine"));
    }

    #[test]
    fn build_failures_split_between_stage_and_engine() {
        let failed = EngineError::CommandFailed { status: 100,
                                                  stderr: "E: Unable to locate package clang".into() };
        let err = PipelineError::from_build(failed, PipelineError::Provisioning);
        assert_eq!(err.exit_code(), 10);

        let mismatch = EngineError::ChecksumMismatch { url: "https://sh.rustup.rs".into(),
                                                       expected: "00".repeat(32),
                                                       actual: "11".repeat(32) };
        assert_eq!(PipelineError::from_build(mismatch, PipelineError::Provisioning).exit_code(), 10);

        let spawn = EngineError::Spawn { program: "/nonexistent/docker".into(),
                                         source: std::io::Error::from(std::io::ErrorKind::NotFound) };
        let err = PipelineError::from_build(spawn, PipelineError::Compilation);
        assert!(matches!(err, PipelineError::Engine(EngineError::Spawn { .. })));
        assert_eq!(PipelineError::from_core(err.into_core()).exit_code(), 1);

        let unknown = EngineError::UnknownImage("ubuntu:20.04".into());
        assert_eq!(PipelineError::from_build(unknown, PipelineError::Packaging).category(), "engine");
    }
}
