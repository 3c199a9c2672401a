//! Constantes del motor core.
//!
//! `ENGINE_VERSION` forma parte del input de todos los fingerprints: cambiarlo
//! invalida los fingerprints previos aunque la definición y los artifacts no
//! cambien.

/// Versión lógica del motor. Mantener estable mientras no haya cambios
/// incompatibles en el cálculo de fingerprints.
pub const ENGINE_VERSION: &str = "forge-1";
