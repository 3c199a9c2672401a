//! Plan de build: etapas de instrucciones independientes del motor.
//!
//! El plan es la representación intermedia entre `PipelineConfig` y el motor
//! de contenedores. Se puede renderizar como Dockerfile (ver `render`) o
//! ejecutar directamente con un `ContainerEngine`.
//!
//! Etapas:
//! - `provision`: imagen base + toolchain nativo + rustup + nightly + cargo-fuzz.
//! - `builder`: `provision` + árbol fuente + `cargo fuzz build`.
//! - `runtime`: imagen base + una única copia del harness desde `builder`.
use forge_domain::{BaseImage, HarnessLocator, InstallerSource, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod render;

pub use render::{render_dockerfile, render_stage, shell_quote, RenderError};

/// Ruta donde se deja el instalador del toolchain dentro del entorno.
pub const INSTALLER_PATH: &str = "/tmp/rustup-init.sh";
/// Directorio de binarios que instala rustup para root.
pub const CARGO_BIN: &str = "/root/.cargo/bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Provision,
    Builder,
    Runtime,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::Provision => "provision",
            StageName::Builder => "builder",
            StageName::Runtime => "runtime",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Punto de partida de una etapa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FromSource {
    Base(BaseImage),
    Stage(StageName),
}

/// Programa y argumentos, sin pasar por un shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Command { program: program.into(),
                  args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Una capa `RUN`: comandos encadenados con `&&`. Las variables de `env`
/// aplican sólo a estos comandos; `cwd` cambia de directorio antes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunSpec {
    pub env: Vec<(String, String)>,
    pub cwd: Option<String>,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Env { key: String, value: String },
    Run(RunSpec),
    /// Descarga verificada por sha256; el motor rechaza un digest distinto.
    Fetch { url: String, sha256: String, dest: String, mode: u32 },
    /// Copia desde el contexto de build del host.
    Copy { src: String, dest: String },
    Workdir { path: String },
    /// Copia un único path desde otra etapa.
    CopyFrom { stage: StageName, src: String, dest: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    pub name: StageName,
    pub from: FromSource,
    pub instructions: Vec<Instruction>,
}

impl StagePlan {
    /// Etapas de las que depende ésta (FROM o COPY --from).
    pub fn dependencies(&self) -> Vec<StageName> {
        let mut deps = Vec::new();
        if let FromSource::Stage(s) = &self.from {
            deps.push(*s);
        }
        for ins in &self.instructions {
            if let Instruction::CopyFrom { stage, .. } = ins {
                if !deps.contains(stage) {
                    deps.push(*stage);
                }
            }
        }
        deps
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("stage '{stage}' starts from '{found}' but the pipeline base image is '{expected}'")]
    BaseMismatch { stage: StageName, expected: String, found: String },
    #[error("stage '{stage}' references stage '{dependency}' which is not defined before it")]
    UnresolvedStage { stage: StageName, dependency: StageName },
    #[error("stage '{0}' is missing from the plan")]
    MissingStage(StageName),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub base_image: BaseImage,
    pub locator: HarnessLocator,
    pub stages: Vec<StagePlan>,
}

impl BuildPlan {
    /// Construye el plan completo de tres etapas para una configuración.
    pub fn plan_for(config: &PipelineConfig) -> BuildPlan {
        let locator = config.locator();
        let stages = vec![provision_stage(config), builder_stage(config, &locator), runtime_stage(config, &locator)];
        BuildPlan { base_image: config.base_image().clone(),
                    locator,
                    stages }
    }

    pub fn stage(&self, name: StageName) -> Result<&StagePlan, PlanError> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .ok_or(PlanError::MissingStage(name))
    }

    /// Toda etapa que parte de una imagen base debe usar la misma imagen, y
    /// toda referencia a otra etapa debe apuntar a una etapa anterior.
    pub fn check_abi_parity(&self) -> Result<(), PlanError> {
        let expected = self.base_image.to_string();
        let mut seen: Vec<StageName> = Vec::new();
        for stage in &self.stages {
            if let FromSource::Base(img) = &stage.from {
                if *img != self.base_image {
                    return Err(PlanError::BaseMismatch { stage: stage.name,
                                                         expected,
                                                         found: img.to_string() });
                }
            }
            if let Some(dep) = stage.dependencies().into_iter().find(|d| !seen.contains(d)) {
                return Err(PlanError::UnresolvedStage { stage: stage.name,
                                                        dependency: dep });
            }
            seen.push(stage.name);
        }
        Ok(())
    }
}

fn provision_stage(config: &PipelineConfig) -> StagePlan {
    let mut instructions = Vec::new();

    instructions.push(Instruction::Run(RunSpec { env: vec![("DEBIAN_FRONTEND".into(), "noninteractive".into())],
                                                 cwd: None,
                                                 commands: vec![Command::new("apt-get").arg("update"),
                                                                Command::new("apt-get").args(["install", "-y"])
                                                                                       .args(config.native_packages()
                                                                                                   .iter()
                                                                                                   .cloned())] }));

    let run_installer = Command::new("sh").args([INSTALLER_PATH, "-y"]);
    match config.installer() {
        InstallerSource::RemoteScript { url, min_tls } => {
            let fetch = Command::new("curl").args(["--proto", "=https", min_tls.curl_flag(), "-sSf", url.as_str(), "-o", INSTALLER_PATH]);
            instructions.push(Instruction::Run(RunSpec { commands: vec![fetch, run_installer],
                                                         ..RunSpec::default() }));
        }
        InstallerSource::Checksummed { url, sha256 } => {
            instructions.push(Instruction::Fetch { url: url.clone(),
                                                   sha256: sha256.clone(),
                                                   dest: INSTALLER_PATH.into(),
                                                   mode: 0o755 });
            instructions.push(Instruction::Run(RunSpec { commands: vec![run_installer],
                                                         ..RunSpec::default() }));
        }
    }

    instructions.push(Instruction::Env { key: "PATH".into(),
                                         value: format!("{CARGO_BIN}:${{PATH}}") });
    instructions.push(Instruction::Run(RunSpec { commands: vec![Command::new("rustup").args(["default".to_string(),
                                                                                               config.toolchain()
                                                                                                     .to_string()])],
                                                 ..RunSpec::default() }));

    let tool = config.fuzz_tool();
    let mut install = Command::new("cargo").args(["install", tool.krate.as_str()]);
    if let Some(v) = &tool.version {
        install = install.args(["--version", v.as_str(), "--locked"]);
    }
    instructions.push(Instruction::Run(RunSpec { commands: vec![install],
                                                 ..RunSpec::default() }));

    StagePlan { name: StageName::Provision,
                from: FromSource::Base(config.base_image().clone()),
                instructions }
}

fn builder_stage(config: &PipelineConfig, locator: &HarnessLocator) -> StagePlan {
    let root = config.source_root().to_string();
    let build = Command::new("cargo").arg(format!("+{}", config.toolchain()))
                                     .args(["fuzz", "build", config.profile().fuzz_flag(), "--target"])
                                     .arg(config.platform_triple().as_str())
                                     .arg(config.harness_name().as_str());
    StagePlan { name: StageName::Builder,
                from: FromSource::Stage(StageName::Provision),
                instructions: vec![Instruction::Copy { src: ".".into(),
                                                       dest: root.clone() },
                                   Instruction::Workdir { path: root },
                                   Instruction::Run(RunSpec { env: Vec::new(),
                                                              cwd: Some(locator.fuzz_dir()),
                                                              commands: vec![build] })] }
}

fn runtime_stage(config: &PipelineConfig, locator: &HarnessLocator) -> StagePlan {
    StagePlan { name: StageName::Runtime,
                from: FromSource::Base(config.base_image().clone()),
                instructions: vec![Instruction::CopyFrom { stage: StageName::Builder,
                                                           src: locator.artifact_path(),
                                                           dest: locator.runtime_path() }] }
}
