// [crates/cms-domain/src/error.rs]
/*!
 * Taxonomía de errores soberana del núcleo de coordinación.
 * Cada componente (C1-C7) propaga una de estas variantes; la frontera
 * HTTP/WS decide el código de estado o la razón `connect_error` a partir
 * de ella. Ningún componente intenta recuperarse del fallo de otro.
 */

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Login, verificación de token de agente, o código MFA incorrectos.
    #[error("invalid credential")]
    InvalidCredential,

    /// El refresh token presentado no tiene el formato `selector.secret`.
    #[error("malformed refresh token")]
    MalformedToken,

    /// El secreto no coincide con el verificador almacenado: robo/reuso.
    #[error("refresh token reuse detected")]
    ReuseDetected,

    /// El selector existe pero la fila ha expirado.
    #[error("refresh token expired")]
    Expired,

    /// El selector no corresponde a ninguna fila viva.
    #[error("unknown refresh token")]
    Unknown,

    /// Autenticado pero sin autorización para el recurso solicitado.
    #[error("access denied")]
    AccessDenied,

    /// El recurso solicitado no existe.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflicto de unicidad (posición ocupada, username duplicado, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Violación de una restricción de entrada.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// El agente objetivo no tiene ninguna sesión viva.
    #[error("agent is not connected")]
    AgentOffline,

    /// Fallo inesperado (persistencia, aleatoriedad agotada, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Mensaje uniforme para el envelope `{status:"error", message}` expuesto
    /// en acks de comando y respuestas HTTP de error.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::InvalidCredential => "Invalid credentials".to_string(),
            CoreError::MalformedToken => "Malformed token".to_string(),
            CoreError::ReuseDetected => "Refresh token reuse detected".to_string(),
            CoreError::Expired => "Token expired".to_string(),
            CoreError::Unknown => "Unknown token".to_string(),
            CoreError::AccessDenied => "Access denied".to_string(),
            CoreError::NotFound(what) => format!("Not found: {what}"),
            CoreError::Conflict(what) => format!("Conflict: {what}"),
            CoreError::ValidationFailed(what) => format!("Validation failed: {what}"),
            CoreError::AgentOffline => "Agent is not connected".to_string(),
            CoreError::Internal(_) => "Internal error".to_string(),
        }
    }
}
