//! fuzzforge
//!
//! Compila un harness de `cargo fuzz` del árbol de libsignal dentro de un
//! entorno de build efímero y lo empaqueta en una imagen runtime mínima:
//! la imagen base más un único ejecutable en la raíz.
//!
//! - `config`: archivo TOML, `.env` y variables `FORGE_*`.
//! - `cli`: subcomandos `render`, `plan`, `locate` y `build`.
//!
//! El trabajo real vive en los crates del workspace (`forge-domain`,
//! `forge-core`, `forge-adapters`), re-exportados aquí.

pub mod cli;
pub mod config;

pub use config::{load, ConfigError, FileConfig};
pub use forge_adapters::{BuildPlan, ContainerEngine, DockerCli, HarnessPipeline, InMemoryImageEngine, PipelineError,
                         PipelineOutcome};
pub use forge_domain::{HarnessLocator, PipelineConfig};
