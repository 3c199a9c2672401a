use thiserror::Error;

/// Error del dominio: cualquier valor de configuración inválido.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DomainError::ValidationError(msg.into())
    }
}
