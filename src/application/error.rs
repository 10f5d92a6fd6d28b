use thiserror::Error;

use crate::{
    application::{indexer::IndexError, query::QueryError, repos::RepoError, router::DispatchError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Top-level error surfaced by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) | AppError::Domain(DomainError::Validation { .. }) => 2,
            AppError::Infra(_) | AppError::Repo(_) => 3,
            AppError::Index(_) | AppError::Dispatch(_) | AppError::Query(_) => 4,
            AppError::Unexpected(_) => 1,
        }
    }
}
