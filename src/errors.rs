use std::path::PathBuf;

use crate::models::role::RoleKind;

pub type AuthzResult<T> = Result<T, AuthzError>;

/// Errors surfaced to the administration caller.
#[derive(thiserror::Error, Debug)]
pub enum AuthzError {
    #[error("duplicate {kind} role: {name}")]
    DuplicateName { kind: RoleKind, name: String },
    #[error("{kind} role not found: {name}")]
    NotFound { kind: RoleKind, name: String },
    #[error("unknown permission: {0}")]
    UnknownPermission(String),
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl AuthzError {
    pub fn duplicate(kind: RoleKind, name: impl Into<String>) -> Self {
        Self::DuplicateName { kind, name: name.into() }
    }

    pub fn not_found(kind: RoleKind, name: impl Into<String>) -> Self {
        Self::NotFound { kind, name: name.into() }
    }

    pub fn unknown_permission(permission: impl Into<String>) -> Self {
        Self::UnknownPermission(permission.into())
    }

    pub fn unknown_subject(subject: impl Into<String>) -> Self {
        Self::UnknownSubject(subject.into())
    }

    pub fn invalid_role(message: impl Into<String>) -> Self {
        Self::InvalidRole(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Failures of the durable representation. Never raised by `check`.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("malformed configuration at `{path}`: {message}")]
    Malformed { path: String, message: String },
    #[error("invalid {kind} role record: {reason}")]
    InvalidRecord { kind: RoleKind, reason: String },
    #[error("failed to encode configuration")]
    Encode(#[source] serde_json::Error),
    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed { path: path.into(), message: message.into() }
    }

    pub fn invalid_record(kind: RoleKind, reason: impl Into<String>) -> Self {
        Self::InvalidRecord { kind, reason: reason.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

