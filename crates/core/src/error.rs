//! Error model for the authorization engine.

use thiserror::Error;

/// Result type used across the engine.
pub type DomainResult<T> = Result<T, DomainError>;

/// Engine-level error.
///
/// Authorization *decisions* are never reported through this type: a denied
/// check is an ordinary return value. These variants cover structural failures
/// that a caller has to branch on (bad input, missing rows, storage outages).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown resource, role, template or module.
    #[error("not found: {0}")]
    NotFound(String),

    /// Role still in use, duplicate unique key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A value failed validation (missing name, malformed level, bad rule).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A check said "no" and the calling convention needs it as an error.
    #[error("insufficient permission: '{required}' required on '{resource}'")]
    AuthorizationDenied { resource: String, required: String },

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn denied(resource: impl Into<String>, required: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            resource: resource.into(),
            required: required.into(),
        }
    }

    /// HTTP-equivalent status for transports wrapping the engine.
    pub fn status_code(&self) -> u16 {
        match self {
            DomainError::NotFound(_) => 404,
            DomainError::Conflict(_) => 409,
            DomainError::Validation(_) => 400,
            DomainError::AuthorizationDenied { .. } => 403,
            DomainError::Storage(_) => 503,
        }
    }
}
