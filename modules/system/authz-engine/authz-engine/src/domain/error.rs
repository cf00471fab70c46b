//! Domain errors for the authz engine.

use authz_engine_sdk::AuthzError;

/// Internal domain errors.
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error(transparent)]
    Authz(#[from] AuthzError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for DomainError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<DomainError> for AuthzError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Authz(inner) => inner,
            DomainError::InvalidConfig(reason) => {
                Self::Internal(format!("invalid configuration: {reason}"))
            }
            DomainError::AlreadyRunning(what) => Self::Internal(format!("{what} is already running")),
            DomainError::Internal(reason) => Self::Internal(reason),
        }
    }
}
