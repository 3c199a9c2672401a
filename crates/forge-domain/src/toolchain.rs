//! Toolchain del lenguaje, su instalador y la herramienta de fuzzing.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

/// Canal del toolchain. `cargo fuzz` necesita flags inestables, por eso sólo
/// se admite nightly, flotante (`date: None`) o fijado a una fecha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ToolchainChannel {
    Nightly { date: Option<NaiveDate> },
}

impl ToolchainChannel {
    pub fn nightly() -> Self {
        ToolchainChannel::Nightly { date: None }
    }

    pub fn pinned(date: NaiveDate) -> Self {
        ToolchainChannel::Nightly { date: Some(date) }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            ToolchainChannel::Nightly { date } => *date,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.date().is_some()
    }
}

impl Default for ToolchainChannel {
    fn default() -> Self {
        ToolchainChannel::nightly()
    }
}

impl fmt::Display for ToolchainChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date() {
            Some(d) => write!(f, "nightly-{}", d.format("%Y-%m-%d")),
            None => f.write_str("nightly"),
        }
    }
}

impl FromStr for ToolchainChannel {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "nightly" {
            return Ok(ToolchainChannel::nightly());
        }
        let date = s.strip_prefix("nightly-").ok_or_else(|| {
                                                  DomainError::invalid(format!("toolchain channel '{s}' is not a nightly channel"))
                                              })?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| DomainError::invalid(format!("invalid nightly date in '{s}': {e}")))?;
        Ok(ToolchainChannel::pinned(date))
    }
}

impl TryFrom<String> for ToolchainChannel {
    type Error = DomainError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ToolchainChannel> for String {
    fn from(value: ToolchainChannel) -> Self {
        value.to_string()
    }
}

/// Versión mínima de TLS exigida al descargar el instalador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TlsVersion {
    #[default]
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.3")]
    V1_3,
}

impl TlsVersion {
    pub fn curl_flag(self) -> &'static str {
        match self {
            TlsVersion::V1_2 => "--tlsv1.2",
            TlsVersion::V1_3 => "--tlsv1.3",
        }
    }
}

impl FromStr for TlsVersion {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.2" => Ok(TlsVersion::V1_2),
            "1.3" => Ok(TlsVersion::V1_3),
            other => Err(DomainError::invalid(format!("unsupported minimum TLS version '{other}'"))),
        }
    }
}

/// Origen del instalador del toolchain.
///
/// `RemoteScript` descarga y ejecuta un script remoto confiando sólo en TLS.
/// `Checksummed` fija el digest sha256 del instalador; el motor de build
/// rechaza un archivo que no coincida.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallerSource {
    RemoteScript { url: String, min_tls: TlsVersion },
    Checksummed { url: String, sha256: String },
}

impl InstallerSource {
    pub fn remote_script(url: &str, min_tls: TlsVersion) -> Result<Self, DomainError> {
        Ok(InstallerSource::RemoteScript { url: https_url(url)?,
                                           min_tls })
    }

    pub fn checksummed(url: &str, sha256: &str) -> Result<Self, DomainError> {
        let digest = sha256.trim().to_ascii_lowercase();
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::invalid(format!("installer sha256 '{sha256}' must be 64 hex characters")));
        }
        Ok(InstallerSource::Checksummed { url: https_url(url)?,
                                          sha256: digest })
    }

    pub fn url(&self) -> &str {
        match self {
            InstallerSource::RemoteScript { url, .. } | InstallerSource::Checksummed { url, .. } => url,
        }
    }

    /// Etiqueta auditable del nivel de confianza del instalador.
    pub fn trust_label(&self) -> String {
        match self {
            InstallerSource::RemoteScript { .. } => "remote-script".to_string(),
            InstallerSource::Checksummed { sha256, .. } => format!("sha256:{sha256}"),
        }
    }

    /// Revalida un valor construido a mano o deserializado.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            InstallerSource::RemoteScript { url, .. } => https_url(url).map(|_| ()),
            InstallerSource::Checksummed { url, sha256 } => InstallerSource::checksummed(url, sha256).map(|_| ()),
        }
    }
}

impl Default for InstallerSource {
    fn default() -> Self {
        InstallerSource::RemoteScript { url: "https://sh.rustup.rs".into(),
                                        min_tls: TlsVersion::V1_2 }
    }
}

fn https_url(url: &str) -> Result<String, DomainError> {
    let url = url.trim();
    match url.strip_prefix("https://") {
        Some(rest) if !rest.is_empty() && !rest.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') => {
            Ok(url.to_string())
        }
        _ => Err(DomainError::invalid(format!("installer url '{url}' must be a well-formed https:// url"))),
    }
}

/// Herramienta de build de harnesses, instalada como subcomando de cargo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuzzTool {
    pub krate: String,
    pub version: Option<String>,
}

impl FuzzTool {
    pub fn pinned(version: &str) -> Result<Self, DomainError> {
        let version = version.trim();
        if version.is_empty() || !version.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')) {
            return Err(DomainError::invalid(format!("invalid fuzz tool version '{version}'")));
        }
        Ok(FuzzTool { version: Some(version.to_string()),
                      ..FuzzTool::default() })
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.krate.is_empty() || !self.krate.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(DomainError::invalid(format!("invalid fuzz tool crate '{}'", self.krate)));
        }
        match &self.version {
            Some(v) => FuzzTool::pinned(v).map(|_| ()),
            None => Ok(()),
        }
    }
}

impl Default for FuzzTool {
    fn default() -> Self {
        FuzzTool { krate: "cargo-fuzz".into(),
                   version: None }
    }
}
