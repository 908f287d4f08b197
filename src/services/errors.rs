use thiserror::Error;

use crate::backup::BackupError;
use crate::embedding::EmbeddingError;
use crate::repository::errors::RepositoryError;

/// Errors surfaced by the service layer to the HTTP handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    /// Well-formed request with values outside the accepted domain.
    #[error("{0}")]
    Validation(String),

    /// Malformed input such as an undecodable image or a path escape.
    #[error("{0}")]
    BadRequest(String),

    /// The database pool is closed or unreachable.
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Backup error: {0}")]
    Backup(BackupError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ServiceError::NotFound(err.to_string()),
            RepositoryError::ConnectionError(message) => ServiceError::Unavailable(message),
            other => ServiceError::Repository(other),
        }
    }
}

impl From<BackupError> for ServiceError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            BackupError::InvalidFileName(_) => ServiceError::BadRequest(err.to_string()),
            BackupError::Repository(inner) => ServiceError::from(inner),
            other => ServiceError::Backup(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn connection_errors_become_unavailable() {
        let err = ServiceError::from(RepositoryError::ConnectionError("closed".into()));
        assert!(matches!(err, ServiceError::Unavailable(msg) if msg == "closed"));
    }

    #[test]
    fn missing_backup_becomes_not_found() {
        let err = ServiceError::from(BackupError::NotFound(PathBuf::from("/b/x.dump")));
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(err.to_string(), "Backup file not found: /b/x.dump");
    }

    #[test]
    fn invalid_backup_name_becomes_bad_request() {
        let err = ServiceError::from(BackupError::InvalidFileName("../x".into()));
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[test]
    fn repository_errors_inside_backups_are_unwrapped() {
        let err = ServiceError::from(BackupError::Repository(RepositoryError::ConnectionError(
            "down".into(),
        )));
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }
}
