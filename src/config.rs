//! Configuración de `fuzzforge`.
//!
//! Precedencia: flags de CLI > variables `FORGE_*` > archivo TOML > defaults.
//! El `.env` del directorio actual se carga una sola vez (`DOTENV`) antes de
//! leer el entorno del proceso.
use forge_domain::{BaseImage, BuildProfile, DomainError, FuzzTargetDir, FuzzTool, HarnessName, ImageTag,
                   InstallerSource, PipelineConfig, PlatformTriple, SourceRoot, TlsVersion, ToolchainChannel};
use log::debug;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fs};
use thiserror::Error;

/// Ruta del `.env` cargado, si había uno.
pub static DOTENV: Lazy<Option<PathBuf>> = Lazy::new(|| dotenvy::dotenv().ok());

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value in {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("invalid configuration: {0}")]
    Domain(#[from] DomainError),
}

/// Sección `[installer]`. Con `sha256` el instalador queda fijado por digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerSection {
    pub url: Option<String>,
    pub sha256: Option<String>,
    pub min_tls: Option<String>,
}

/// Sección `[fuzz_tool]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuzzToolSection {
    #[serde(rename = "crate")]
    pub krate: Option<String>,
    pub version: Option<String>,
}

/// Forma cruda del archivo de configuración; todos los campos son opcionales
/// y se validan al convertir a `PipelineConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub base_image: Option<String>,
    pub source_root: Option<String>,
    pub fuzz_target_dir: Option<String>,
    pub platform_triple: Option<String>,
    pub profile: Option<String>,
    pub harness: Option<String>,
    pub toolchain: Option<String>,
    pub native_packages: Option<Vec<String>>,
    pub source_dir: Option<PathBuf>,
    pub image_repository: Option<String>,
    pub output_tag: Option<String>,
    pub keep_build_env: Option<bool>,
    pub verify_minimal: Option<bool>,
    pub installer: InstallerSection,
    pub fuzz_tool: FuzzToolSection,
}

impl FileConfig {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml { path: path.to_path_buf(),
                                                                 source })
    }

    /// Valida y produce la configuración del pipeline.
    pub fn resolve(self) -> Result<PipelineConfig, ConfigError> {
        let mut b = PipelineConfig::builder();
        if let Some(v) = self.base_image {
            b = b.base_image(BaseImage::parse(&v)?);
        }
        if let Some(v) = self.source_root {
            b = b.source_root(v.parse::<SourceRoot>()?);
        }
        if let Some(v) = self.fuzz_target_dir {
            b = b.fuzz_target_dir(v.parse::<FuzzTargetDir>()?);
        }
        if let Some(v) = self.platform_triple {
            b = b.platform_triple(v.parse::<PlatformTriple>()?);
        }
        if let Some(v) = self.profile {
            b = b.profile(v.parse::<BuildProfile>()?);
        }
        if let Some(v) = self.harness {
            b = b.harness_name(v.parse::<HarnessName>()?);
        }
        if let Some(v) = self.toolchain {
            b = b.toolchain(v.parse::<ToolchainChannel>()?);
        }
        if let Some(installer) = resolve_installer(self.installer)? {
            b = b.installer(installer);
        }
        let tool_default = FuzzTool::default();
        b = b.fuzz_tool(FuzzTool { krate: self.fuzz_tool.krate.unwrap_or(tool_default.krate),
                                   version: self.fuzz_tool.version });
        if let Some(v) = self.native_packages {
            b = b.native_packages(v);
        }
        if let Some(v) = self.source_dir {
            b = b.source_dir(v);
        }
        if let Some(v) = self.image_repository {
            b = b.image_repository(v);
        }
        if let Some(v) = self.output_tag {
            b = b.output_tag(Some(ImageTag::parse(&v)?));
        }
        if let Some(v) = self.keep_build_env {
            b = b.keep_build_env(v);
        }
        if let Some(v) = self.verify_minimal {
            b = b.verify_minimal(v);
        }
        Ok(b.build()?)
    }
}

fn resolve_installer(section: InstallerSection) -> Result<Option<InstallerSource>, DomainError> {
    let default = InstallerSource::default();
    let url = section.url.unwrap_or_else(|| default.url().to_string());
    match (section.sha256, section.min_tls) {
        (Some(sha), _) => InstallerSource::checksummed(&url, &sha).map(Some),
        (None, Some(tls)) => InstallerSource::remote_script(&url, tls.parse::<TlsVersion>()?).map(Some),
        (None, None) if url != default.url() => InstallerSource::remote_script(&url, TlsVersion::default()).map(Some),
        (None, None) => Ok(None),
    }
}

/// Variables de entorno reconocidas.
pub const ENV_VARS: [&str; 11] = ["FORGE_BASE_IMAGE",
                                  "FORGE_SOURCE_ROOT",
                                  "FORGE_FUZZ_TARGET_DIR",
                                  "FORGE_PLATFORM_TRIPLE",
                                  "FORGE_PROFILE",
                                  "FORGE_HARNESS",
                                  "FORGE_TOOLCHAIN",
                                  "FORGE_SOURCE_DIR",
                                  "FORGE_OUTPUT_TAG",
                                  "FORGE_INSTALLER_URL",
                                  "FORGE_INSTALLER_SHA256"];

/// Aplica las variables `FORGE_*` encima de los valores del archivo.
///
/// Cada valor se comprueba aquí para que el error nombre la variable que lo
/// trajo; la validación cruzada ocurre después en `resolve`.
pub fn apply_env_overrides(cfg: &mut FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
    for var in ENV_VARS {
        let Some(raw) = lookup(var) else { continue };
        let value = raw.trim().to_string();
        debug!("config override from {var}");
        let checked = match var {
            "FORGE_BASE_IMAGE" => BaseImage::parse(&value).map(|_| ()),
            "FORGE_SOURCE_ROOT" => value.parse::<SourceRoot>().map(|_| ()),
            "FORGE_FUZZ_TARGET_DIR" => value.parse::<FuzzTargetDir>().map(|_| ()),
            "FORGE_PLATFORM_TRIPLE" => value.parse::<PlatformTriple>().map(|_| ()),
            "FORGE_PROFILE" => value.parse::<BuildProfile>().map(|_| ()),
            "FORGE_HARNESS" => value.parse::<HarnessName>().map(|_| ()),
            "FORGE_TOOLCHAIN" => value.parse::<ToolchainChannel>().map(|_| ()),
            "FORGE_OUTPUT_TAG" => ImageTag::parse(&value).map(|_| ()),
            _ if value.is_empty() => Err(DomainError::ValidationError("empty value".into())),
            _ => Ok(()),
        };
        if let Err(e) = checked {
            return Err(ConfigError::Env { var, message: e.to_string() });
        }
        match var {
            "FORGE_BASE_IMAGE" => cfg.base_image = Some(value),
            "FORGE_SOURCE_ROOT" => cfg.source_root = Some(value),
            "FORGE_FUZZ_TARGET_DIR" => cfg.fuzz_target_dir = Some(value),
            "FORGE_PLATFORM_TRIPLE" => cfg.platform_triple = Some(value),
            "FORGE_PROFILE" => cfg.profile = Some(value),
            "FORGE_HARNESS" => cfg.harness = Some(value),
            "FORGE_TOOLCHAIN" => cfg.toolchain = Some(value),
            "FORGE_SOURCE_DIR" => cfg.source_dir = Some(PathBuf::from(value)),
            "FORGE_OUTPUT_TAG" => cfg.output_tag = Some(value),
            "FORGE_INSTALLER_URL" => cfg.installer.url = Some(value),
            _ => cfg.installer.sha256 = Some(value),
        }
    }
    Ok(())
}

fn process_env(var: &str) -> Option<String> {
    env::var(var).ok()
}

/// Lee el archivo (si hay) y aplica el entorno del proceso, sin validar aún.
pub fn load_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    if let Some(dotenv) = DOTENV.as_ref() {
        debug!("loaded environment from {}", dotenv.display());
    }
    let mut cfg = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(),
                                                                                    source })?;
            FileConfig::from_toml(path, &text)?
        }
        None => FileConfig::default(),
    };
    apply_env_overrides(&mut cfg, process_env)?;
    Ok(cfg)
}

pub fn load(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    load_file_config(path)?.resolve()
}
