use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

/// Raíz absoluta del árbol fuente dentro del entorno de build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceRoot(String);

impl SourceRoot {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim().trim_end_matches('/');
        if !raw.trim().starts_with('/') {
            return Err(DomainError::invalid(format!("source root '{raw}' must be an absolute path")));
        }
        if trimmed.is_empty() {
            return Err(DomainError::invalid("source root must not be the filesystem root"));
        }
        check_components(&trimmed[1..], "source root")?;
        Ok(SourceRoot(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Une un subdirectorio relativo a la raíz.
    pub fn join(&self, dir: &FuzzTargetDir) -> String {
        format!("{}/{}", self.0, dir.as_str())
    }
}

impl Default for SourceRoot {
    fn default() -> Self {
        SourceRoot("/libsignal".into())
    }
}

/// Subdirectorio (relativo a la raíz) que contiene el fuzz target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FuzzTargetDir(String);

impl FuzzTargetDir {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if raw.starts_with('/') {
            return Err(DomainError::invalid(format!("fuzz target dir '{raw}' must be relative to the source root")));
        }
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(DomainError::invalid("fuzz target dir must not be empty"));
        }
        check_components(trimmed, "fuzz target dir")?;
        Ok(FuzzTargetDir(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FuzzTargetDir {
    fn default() -> Self {
        FuzzTargetDir("rust/protocol/fuzz".into())
    }
}

fn check_components(path: &str, what: &str) -> Result<(), DomainError> {
    for comp in path.split('/') {
        match comp {
            "" => return Err(DomainError::invalid(format!("{what} '{path}' has an empty component"))),
            "." | ".." => return Err(DomainError::invalid(format!("{what} '{path}' must not contain '{comp}'"))),
            // el COPY del runtime no va entre comillas: nada que docker expanda
            c if !c.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')) => {
                return Err(DomainError::invalid(format!("{what} '{path}' may only contain [A-Za-z0-9._-] components")))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Triple de plataforma (`arch-vendor-os[-abi]`) que ubica la salida del build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformTriple(String);

impl PlatformTriple {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('-').collect();
        if raw.is_empty() || parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(DomainError::invalid(format!("platform triple '{raw}' must look like arch-vendor-os[-abi]")));
        }
        if !raw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')) {
            return Err(DomainError::invalid(format!("platform triple '{raw}' contains invalid characters")));
        }
        Ok(PlatformTriple(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn arch(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }
}

impl Default for PlatformTriple {
    fn default() -> Self {
        PlatformTriple("x86_64-unknown-linux-gnu".into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    #[default]
    Release,
    Debug,
}

impl BuildProfile {
    /// Directorio bajo `target/<triple>/` donde cargo deja la salida.
    pub fn dir_name(self) -> &'static str {
        match self {
            BuildProfile::Release => "release",
            BuildProfile::Debug => "debug",
        }
    }

    /// Flag de `cargo fuzz build` que selecciona el perfil.
    pub fn fuzz_flag(self) -> &'static str {
        match self {
            BuildProfile::Release => "--release",
            BuildProfile::Debug => "--dev",
        }
    }
}

impl FromStr for BuildProfile {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "release" => Ok(BuildProfile::Release),
            "debug" | "dev" => Ok(BuildProfile::Debug),
            other => Err(DomainError::invalid(format!("unknown build profile '{other}'"))),
        }
    }
}

/// Nombre del ejecutable del harness. Es un nombre de archivo, nunca una ruta.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HarnessName(String);

impl HarnessName {
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if raw.contains('/') || raw.contains('\\') {
            return Err(DomainError::invalid(format!("harness name '{raw}' must not contain path separators")));
        }
        if raw.is_empty()
           || raw.starts_with('-')
           || !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::invalid(format!("invalid harness name '{raw}'")));
        }
        Ok(HarnessName(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HarnessName {
    fn default() -> Self {
        HarnessName("interaction".into())
    }
}

macro_rules! string_newtype_impls {
    ($($ty:ident),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl FromStr for $ty {
                type Err = DomainError;
                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    $ty::new(s)
                }
            }

            impl TryFrom<String> for $ty {
                type Error = DomainError;
                fn try_from(value: String) -> Result<Self, Self::Error> {
                    $ty::new(&value)
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    value.0
                }
            }
        )*
    };
}

string_newtype_impls!(SourceRoot, FuzzTargetDir, PlatformTriple, HarnessName);

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
