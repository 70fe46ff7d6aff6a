use scopegate_core::CoreError;
use std::fmt;
use thiserror::Error;

/// Single error enum for all policy engine operations.
///
/// Every variant is local and recoverable: the call that produced it had no
/// effect on the store, registry, or policy it was invoked on.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role already exists: {0}")]
    DuplicateRole(String),

    #[error("invalid policy document: {0}")]
    InvalidDocument(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminator for PolicyError variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyErrorKind {
    InvalidScope,
    UnknownRole,
    DuplicateRole,
    InvalidDocument,
    SerializationError,
    Config,
    Io,
}

impl PolicyError {
    pub fn kind(&self) -> PolicyErrorKind {
        match self {
            PolicyError::InvalidScope(_) => PolicyErrorKind::InvalidScope,
            PolicyError::UnknownRole(_) => PolicyErrorKind::UnknownRole,
            PolicyError::DuplicateRole(_) => PolicyErrorKind::DuplicateRole,
            PolicyError::InvalidDocument(_) => PolicyErrorKind::InvalidDocument,
            PolicyError::SerializationError(_) => PolicyErrorKind::SerializationError,
            PolicyError::Config(_) => PolicyErrorKind::Config,
            PolicyError::Io(_) => PolicyErrorKind::Io,
        }
    }
}

impl fmt::Display for PolicyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyErrorKind::InvalidScope => write!(f, "InvalidScope"),
            PolicyErrorKind::UnknownRole => write!(f, "UnknownRole"),
            PolicyErrorKind::DuplicateRole => write!(f, "DuplicateRole"),
            PolicyErrorKind::InvalidDocument => write!(f, "InvalidDocument"),
            PolicyErrorKind::SerializationError => write!(f, "SerializationError"),
            PolicyErrorKind::Config => write!(f, "Config"),
            PolicyErrorKind::Io => write!(f, "Io"),
        }
    }
}

impl From<CoreError> for PolicyError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidScope(msg) => PolicyError::InvalidScope(msg),
        }
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(e: serde_json::Error) -> Self {
        PolicyError::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for PolicyError {
    fn from(e: toml::de::Error) -> Self {
        PolicyError::Config(format!("TOML parse error: {}", e))
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
