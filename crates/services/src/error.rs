//! Shared error types for the services crate.

use serde::Serialize;
use thiserror::Error;

use progress_core::model::{CourseId, UserId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the progress engine's write path.
///
/// Any variant aborts the enclosing unit of work; nothing it wrote is kept.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("transaction failed: {0}")]
    Transaction(#[from] StorageError),
}

impl From<ProgressError> for CleanupError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::UserNotFound(id) => CleanupError::UserNotFound(id),
            ProgressError::CourseNotFound(id) => CleanupError::CourseNotFound(id),
            ProgressError::Transaction(e) => CleanupError::Transaction(e),
        }
    }
}

/// Errors emitted by `ProgressCleanup`. Only hard steps produce them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CleanupError {
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("transaction failed: {0}")]
    Transaction(#[from] StorageError),
}

/// Errors emitted by `ProfileProjector`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `TokenVerifier` implementations and bearer parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,
    #[error("invalid credential")]
    InvalidCredential,
}

/// Errors surfaced at the request edge, each with an HTTP-equivalent status.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Auth(#[from] AuthError),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("database error")]
    Transaction(#[source] StorageError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Auth(_) => 401,
            ApiError::Validation(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Transaction(_) => 500,
        }
    }

    /// Structured body returned to the caller alongside `status`.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            message: self.to_string(),
        }
    }
}

impl From<ProgressError> for ApiError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::UserNotFound(_) | ProgressError::CourseNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ProgressError::Transaction(e) => ApiError::Transaction(e),
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::UserNotFound(_) | ProfileError::CourseNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ProfileError::Storage(e) => ApiError::Transaction(e),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(err.to_string())
    }
}

/// Error payload shape shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
