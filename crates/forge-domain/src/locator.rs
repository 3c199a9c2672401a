//! Ubicación determinista del harness compilado.
//!
//! El locator se calcula una sola vez a partir de la configuración y lo
//! consumen tanto la etapa de compilación (ruta de salida) como la de
//! empaquetado (ruta de origen de la copia), de modo que ambas no pueden
//! divergir.
use serde::{Deserialize, Serialize};

use crate::{BuildProfile, FuzzTargetDir, HarnessName, PlatformTriple, SourceRoot};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HarnessLocator {
    source_root: SourceRoot,
    fuzz_target_dir: FuzzTargetDir,
    platform_triple: PlatformTriple,
    profile: BuildProfile,
    harness_name: HarnessName,
}

impl HarnessLocator {
    pub fn new(source_root: SourceRoot,
               fuzz_target_dir: FuzzTargetDir,
               platform_triple: PlatformTriple,
               profile: BuildProfile,
               harness_name: HarnessName)
               -> Self {
        Self { source_root,
               fuzz_target_dir,
               platform_triple,
               profile,
               harness_name }
    }

    /// Directorio del fuzz target dentro del entorno de build.
    pub fn fuzz_dir(&self) -> String {
        self.source_root.join(&self.fuzz_target_dir)
    }

    /// `<root>/<dir>/target/<triple>/<profile>/<name>`
    pub fn artifact_path(&self) -> String {
        format!("{}/target/{}/{}/{}",
                self.fuzz_dir(),
                self.platform_triple,
                self.profile.dir_name(),
                self.harness_name)
    }

    /// Ruta del harness en la imagen runtime: siempre la raíz.
    pub fn runtime_path(&self) -> String {
        format!("/{}", self.harness_name)
    }

    pub fn harness_name(&self) -> &HarnessName {
        &self.harness_name
    }

    pub fn platform_triple(&self) -> &PlatformTriple {
        &self.platform_triple
    }

    pub fn profile(&self) -> BuildProfile {
        self.profile
    }

    pub fn source_root(&self) -> &SourceRoot {
        &self.source_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_locator_matches_published_layout() {
        let loc = HarnessLocator::new(SourceRoot::default(),
                                      FuzzTargetDir::default(),
                                      PlatformTriple::default(),
                                      BuildProfile::Release,
                                      HarnessName::default());
        assert_eq!(loc.artifact_path(),
                   "/libsignal/rust/protocol/fuzz/target/x86_64-unknown-linux-gnu/release/interaction");
        assert_eq!(loc.runtime_path(), "/interaction");
        assert_eq!(loc.fuzz_dir(), "/libsignal/rust/protocol/fuzz");
    }
}
