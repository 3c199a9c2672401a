//! Configuración completa del pipeline.
//!
//! Todo el estado que antes era implícito (imagen base, rutas, triple,
//! perfil, canal, instalador) queda enumerado aquí. Sólo se obtiene un
//! `PipelineConfig` a través de `PipelineConfig::builder()`, que valida.
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::image::validate_repository;
use crate::{BaseImage, BuildProfile, DomainError, FuzzTargetDir, FuzzTool, HarnessLocator, HarnessName, ImageTag,
            InstallerSource, PlatformTriple, SourceRoot, ToolchainChannel};

pub const DEFAULT_NATIVE_PACKAGES: [&str; 3] = ["cmake", "clang", "curl"];
pub const DEFAULT_IMAGE_REPOSITORY: &str = "fuzzforge";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    base_image: BaseImage,
    source_root: SourceRoot,
    fuzz_target_dir: FuzzTargetDir,
    platform_triple: PlatformTriple,
    profile: BuildProfile,
    harness_name: HarnessName,
    toolchain: ToolchainChannel,
    installer: InstallerSource,
    fuzz_tool: FuzzTool,
    native_packages: Vec<String>,
    source_dir: PathBuf,
    image_repository: String,
    output_tag: Option<ImageTag>,
    keep_build_env: bool,
    verify_minimal: bool,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder { inner: PipelineConfig::default() }
    }

    /// Revisa invariantes que cruzan campos o que los tipos no cubren.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.native_packages.iter().any(|p| !valid_package_name(p)) {
            return Err(DomainError::invalid(format!("invalid native package list {:?}", self.native_packages)));
        }
        // sin generador ni compilador de C/C++ no compilan las dependencias nativas
        if self.native_packages.is_empty() {
            return Err(DomainError::invalid("native package list must not be empty"));
        }
        if matches!(self.installer, InstallerSource::RemoteScript { .. })
           && !self.native_packages.iter().any(|p| p == "curl")
        {
            return Err(DomainError::invalid("the remote-script installer needs 'curl' among the native packages"));
        }
        validate_repository(&self.image_repository)?;
        self.installer.validate()?;
        self.fuzz_tool.validate()?;
        if self.source_dir.as_os_str().is_empty() {
            return Err(DomainError::invalid("source dir must not be empty"));
        }
        if let Some(tag) = &self.output_tag {
            if tag.as_str() == self.base_image.to_string() {
                return Err(DomainError::invalid("output tag must differ from the base image"));
            }
        }
        Ok(())
    }

    pub fn locator(&self) -> HarnessLocator {
        HarnessLocator::new(self.source_root.clone(),
                            self.fuzz_target_dir.clone(),
                            self.platform_triple.clone(),
                            self.profile,
                            self.harness_name.clone())
    }

    pub fn base_image(&self) -> &BaseImage {
        &self.base_image
    }
    pub fn source_root(&self) -> &SourceRoot {
        &self.source_root
    }
    pub fn fuzz_target_dir(&self) -> &FuzzTargetDir {
        &self.fuzz_target_dir
    }
    pub fn platform_triple(&self) -> &PlatformTriple {
        &self.platform_triple
    }
    pub fn profile(&self) -> BuildProfile {
        self.profile
    }
    pub fn harness_name(&self) -> &HarnessName {
        &self.harness_name
    }
    pub fn toolchain(&self) -> ToolchainChannel {
        self.toolchain
    }
    pub fn installer(&self) -> &InstallerSource {
        &self.installer
    }
    pub fn fuzz_tool(&self) -> &FuzzTool {
        &self.fuzz_tool
    }
    pub fn native_packages(&self) -> &[String] {
        &self.native_packages
    }
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
    pub fn image_repository(&self) -> &str {
        &self.image_repository
    }
    pub fn output_tag(&self) -> Option<&ImageTag> {
        self.output_tag.as_ref()
    }
    pub fn keep_build_env(&self) -> bool {
        self.keep_build_env
    }
    pub fn verify_minimal(&self) -> bool {
        self.verify_minimal
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig { base_image: BaseImage::default(),
                         source_root: SourceRoot::default(),
                         fuzz_target_dir: FuzzTargetDir::default(),
                         platform_triple: PlatformTriple::default(),
                         profile: BuildProfile::Release,
                         harness_name: HarnessName::default(),
                         toolchain: ToolchainChannel::default(),
                         installer: InstallerSource::default(),
                         fuzz_tool: FuzzTool::default(),
                         native_packages: DEFAULT_NATIVE_PACKAGES.iter().map(|p| p.to_string()).collect(),
                         source_dir: PathBuf::from("."),
                         image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
                         output_tag: None,
                         keep_build_env: false,
                         verify_minimal: true }
    }
}

fn valid_package_name(name: &str) -> bool {
    !name.is_empty()
    && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
    && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
}

/// Builder de `PipelineConfig`. Los setters reciben valores ya tipados; la
/// validación cruzada ocurre en `build`.
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    inner: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn base_image(mut self, v: BaseImage) -> Self {
        self.inner.base_image = v;
        self
    }
    pub fn source_root(mut self, v: SourceRoot) -> Self {
        self.inner.source_root = v;
        self
    }
    pub fn fuzz_target_dir(mut self, v: FuzzTargetDir) -> Self {
        self.inner.fuzz_target_dir = v;
        self
    }
    pub fn platform_triple(mut self, v: PlatformTriple) -> Self {
        self.inner.platform_triple = v;
        self
    }
    pub fn profile(mut self, v: BuildProfile) -> Self {
        self.inner.profile = v;
        self
    }
    pub fn harness_name(mut self, v: HarnessName) -> Self {
        self.inner.harness_name = v;
        self
    }
    pub fn toolchain(mut self, v: ToolchainChannel) -> Self {
        self.inner.toolchain = v;
        self
    }
    pub fn installer(mut self, v: InstallerSource) -> Self {
        self.inner.installer = v;
        self
    }
    pub fn fuzz_tool(mut self, v: FuzzTool) -> Self {
        self.inner.fuzz_tool = v;
        self
    }
    pub fn native_packages<I, S>(mut self, v: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.inner.native_packages = v.into_iter().map(Into::into).collect();
        self
    }
    pub fn source_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.inner.source_dir = v.into();
        self
    }
    pub fn image_repository(mut self, v: impl Into<String>) -> Self {
        self.inner.image_repository = v.into();
        self
    }
    pub fn output_tag(mut self, v: Option<ImageTag>) -> Self {
        self.inner.output_tag = v;
        self
    }
    pub fn keep_build_env(mut self, v: bool) -> Self {
        self.inner.keep_build_env = v;
        self
    }
    pub fn verify_minimal(mut self, v: bool) -> Self {
        self.inner.verify_minimal = v;
        self
    }

    pub fn build(self) -> Result<PipelineConfig, DomainError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}
