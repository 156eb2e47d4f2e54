use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::{media::MediaBatchError, repos::RepoError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Failure categories visible to callers of the ingestion and query services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    ValidationFailed,
    UnsupportedMedia,
    NotFound,
    EmptyResult,
    DuplicateNumber,
    InternalFault,
}

/// Coarse class a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    BadInput,
    NotFound,
    ServerFault,
}

impl ErrorKind {
    pub fn outcome(self) -> Outcome {
        match self {
            ErrorKind::InvalidArgument
            | ErrorKind::ValidationFailed
            | ErrorKind::UnsupportedMedia => Outcome::BadInput,
            ErrorKind::NotFound | ErrorKind::EmptyResult => Outcome::NotFound,
            ErrorKind::DuplicateNumber | ErrorKind::InternalFault => Outcome::ServerFault,
        }
    }

    pub fn is_retryable(self) -> bool {
        self.outcome() == Outcome::ServerFault
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::UnsupportedMedia => "unsupported_media",
            ErrorKind::NotFound => "not_found",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::DuplicateNumber => "duplicate_number",
            ErrorKind::InternalFault => "internal_fault",
        }
    }
}

impl From<&RepoError> for ErrorKind {
    fn from(err: &RepoError) -> Self {
        match err {
            RepoError::NotFound => ErrorKind::NotFound,
            RepoError::Empty => ErrorKind::EmptyResult,
            RepoError::Duplicate { .. } => ErrorKind::DuplicateNumber,
            RepoError::InvalidNumber(_)
            | RepoError::InvalidId(_)
            | RepoError::InvalidStatus(_)
            | RepoError::InvalidInput { .. } => ErrorKind::InvalidArgument,
            RepoError::Persistence(_) | RepoError::Timeout => ErrorKind::InternalFault,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{operation} failed: {source}")]
    Repo {
        operation: &'static str,
        source: RepoError,
    },
    #[error(transparent)]
    Media(#[from] MediaBatchError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn repo(operation: &'static str, source: RepoError) -> Self {
        Self::Repo { operation, source }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                ErrorKind::ValidationFailed
            }
            AppError::Domain(DomainError::InvalidArgument { .. }) | AppError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            AppError::Repo { source, .. } => ErrorKind::from(source),
            AppError::Media(batch) => batch.kind(),
            AppError::Infra(_) | AppError::Unexpected(_) => ErrorKind::InternalFault,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.kind().outcome()
    }
}
