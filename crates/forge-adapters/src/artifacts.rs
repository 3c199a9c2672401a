//! Artifacts tipados intercambiados entre los steps del pipeline.
//!
//! Todos son registros de imagen (`ArtifactKind::ImageRecord`): describen una
//! imagen materializada, nunca su contenido. El engine calcula el hash sobre
//! el payload canónico.
use forge_core::model::ArtifactKind;
use forge_core::typed_artifact;

typed_artifact!(
    /// Entorno de build listo: toolchain nativo, toolchain nightly y
    /// herramienta de fuzzing instalados.
    ProvisionedEnvironment {
        image: String,
        base_image: String,
        toolchain: String,
        installer_trust: String,
        fuzz_tool: String,
    } kind: ArtifactKind::ImageRecord
);

typed_artifact!(
    /// Harness compilado dentro de la imagen de build.
    CompiledHarness {
        builder_image: String,
        artifact_path: String,
        harness_name: String,
        size_bytes: u64,
        mode: u32,
    } kind: ArtifactKind::ImageRecord
);

typed_artifact!(
    /// Imagen runtime final: base + el harness en la raíz.
    RuntimeImage {
        image: String,
        base_image: String,
        harness_path: String,
        size_bytes: u64,
        mode: u32,
        added_files: Vec<String>,
    } kind: ArtifactKind::ImageRecord
);
