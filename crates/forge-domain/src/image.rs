//! Referencias a imágenes de contenedor.
//!
//! `BaseImage` es la imagen de sistema operativo compartida por la etapa de
//! build y la imagen runtime. Debe estar fijada (tag explícito o digest): un
//! nombre sin tag o con `latest` no identifica una versión concreta del SO.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

/// Parte que fija la versión de una imagen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageReference {
    Tag(String),
    Digest(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseImage {
    repository: String,
    reference: ImageReference,
}

impl BaseImage {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::invalid("base image must not be empty"));
        }
        if let Some((repo, digest)) = raw.split_once('@') {
            validate_repository(repo)?;
            validate_digest(digest)?;
            return Ok(BaseImage { repository: repo.to_string(),
                                  reference: ImageReference::Digest(digest.to_ascii_lowercase()) });
        }
        let (repo, tag) = split_tag(raw);
        validate_repository(repo)?;
        let tag = tag.ok_or_else(|| DomainError::invalid(format!("base image '{raw}' must carry an explicit tag or digest")))?;
        validate_tag(tag)?;
        if tag == "latest" {
            return Err(DomainError::invalid(format!("base image '{raw}' must not use the floating 'latest' tag")));
        }
        Ok(BaseImage { repository: repo.to_string(),
                       reference: ImageReference::Tag(tag.to_string()) })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }
}

impl Default for BaseImage {
    fn default() -> Self {
        BaseImage { repository: "ubuntu".into(),
                    reference: ImageReference::Tag("20.04".into()) }
    }
}

impl fmt::Display for BaseImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            ImageReference::Tag(t) => write!(f, "{}:{}", self.repository, t),
            ImageReference::Digest(d) => write!(f, "{}@{}", self.repository, d),
        }
    }
}

impl FromStr for BaseImage {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BaseImage::parse(s)
    }
}

impl TryFrom<String> for BaseImage {
    type Error = DomainError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        BaseImage::parse(&value)
    }
}

impl From<BaseImage> for String {
    fn from(value: BaseImage) -> Self {
        value.to_string()
    }
}

/// Tag con el que se publica una imagen producida (`repo[:tag]`).
/// A diferencia de `BaseImage`, un tag de salida puede omitir la versión.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageTag(String);

impl ImageTag {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if raw.contains('@') {
            return Err(DomainError::invalid(format!("output tag '{raw}' must not contain a digest")));
        }
        let (repo, tag) = split_tag(raw);
        validate_repository(repo)?;
        if let Some(tag) = tag {
            validate_tag(tag)?;
        }
        Ok(ImageTag(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ImageTag {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageTag::parse(s)
    }
}

impl TryFrom<String> for ImageTag {
    type Error = DomainError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        ImageTag::parse(&value)
    }
}

impl From<ImageTag> for String {
    fn from(value: ImageTag) -> Self {
        value.0
    }
}

// El tag es lo que sigue al último ':' posterior al último '/'; un ':' antes
// de una '/' es el puerto del registry.
fn split_tag(raw: &str) -> (&str, Option<&str>) {
    let last_slash = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
    match raw[last_slash..].rfind(':') {
        Some(i) => (&raw[..last_slash + i], Some(&raw[last_slash + i + 1..])),
        None => (raw, None),
    }
}

/// Valida un nombre de repositorio (`[registry[:port]/]path/name`).
pub fn validate_repository(repo: &str) -> Result<(), DomainError> {
    if repo.is_empty() {
        return Err(DomainError::invalid("image repository must not be empty"));
    }
    let components: Vec<&str> = repo.split('/').collect();
    for (idx, comp) in components.iter().enumerate() {
        if comp.is_empty() {
            return Err(DomainError::invalid(format!("image repository '{repo}' has an empty path component")));
        }
        let registry = idx == 0 && components.len() > 1;
        let ok = comp.chars().all(|c| {
                                  c.is_ascii_lowercase()
                                  || c.is_ascii_digit()
                                  || matches!(c, '.' | '_' | '-')
                                  || (registry && (c == ':' || c.is_ascii_uppercase()))
                              });
        if !ok {
            return Err(DomainError::invalid(format!("image repository '{repo}' contains invalid characters")));
        }
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), DomainError> {
    let valid_chars = tag.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if tag.is_empty() || tag.len() > 128 || !valid_chars || tag.starts_with(['.', '-']) {
        return Err(DomainError::invalid(format!("invalid image tag '{tag}'")));
    }
    Ok(())
}

fn validate_digest(digest: &str) -> Result<(), DomainError> {
    let hex = digest.strip_prefix("sha256:")
                    .ok_or_else(|| DomainError::invalid(format!("unsupported image digest '{digest}'")))?;
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DomainError::invalid(format!("malformed sha256 image digest '{digest}'")));
    }
    Ok(())
}
