use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
