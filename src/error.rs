//! Loader errors
//!
//! Every failure surfaced by the loader is one [`LoaderError`]. Warehouse and
//! staging failures are wrapped in [`LoaderError::Storage`] together with the
//! step that was running, and always reach the caller after the batch's
//! transaction was rolled back.

use crate::database::DatabaseError;
use crate::staging::StagingError;
use crate::validation::ValidationError;

/// Underlying cause of a storage failure
#[derive(Debug, thiserror::Error)]
pub enum StorageCause {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Error type for loader operations
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// The batch cannot be loaded into the existing table (not retryable)
    #[error("Schema incompatibility: {0}")]
    SchemaIncompatibility(String),

    /// Invalid identifier, missing key value or missing configuration
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// DDL, DML, staging or bulk-load failure (retryable per batch)
    #[error("Storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageCause,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for loader operations
pub type LoaderResult<T> = Result<T, LoaderError>;

impl LoaderError {
    pub fn storage(context: impl Into<String>, source: impl Into<StorageCause>) -> Self {
        LoaderError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether replaying the same batch may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoaderError::Storage { .. })
    }
}

impl From<StagingError> for LoaderError {
    fn from(error: StagingError) -> Self {
        match error {
            StagingError::Validation(validation) => LoaderError::Validation(validation),
            other => LoaderError::storage("staging rows", other),
        }
    }
}

/// Attach the running step to warehouse and staging failures
pub trait StorageContext<T> {
    fn context(self, context: impl FnOnce() -> String) -> LoaderResult<T>;
}

impl<T> StorageContext<T> for Result<T, DatabaseError> {
    fn context(self, context: impl FnOnce() -> String) -> LoaderResult<T> {
        self.map_err(|e| LoaderError::storage(context(), e))
    }
}

impl<T> StorageContext<T> for Result<T, StagingError> {
    fn context(self, context: impl FnOnce() -> String) -> LoaderResult<T> {
        self.map_err(|e| match e {
            StagingError::Validation(validation) => LoaderError::Validation(validation),
            other => LoaderError::storage(context(), other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_storage_error_keeps_cause() {
        let result: Result<(), DatabaseError> =
            Err(DatabaseError::QueryFailed("boom".to_string()));
        let error = result.context(|| "creating table cats".to_string()).unwrap_err();

        assert!(error.is_retryable());
        assert_eq!(
            error.to_string(),
            "Storage error while creating table cats: Query failed: boom"
        );
        assert!(error.source().is_some());
    }

    #[test]
    fn test_staging_validation_stays_validation() {
        let error: LoaderError =
            StagingError::Validation(ValidationError::MissingConfig("s3 bucket")).into();
        assert!(matches!(
            error,
            LoaderError::Validation(ValidationError::MissingConfig(_))
        ));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_staging_failure_is_storage() {
        let result: Result<(), StagingError> = Err(StagingError::UploadFailed("denied".to_string()));
        let error = result.context(|| "staging cats".to_string()).unwrap_err();
        assert!(matches!(
            error,
            LoaderError::Storage {
                source: StorageCause::Staging(_),
                ..
            }
        ));
    }
}
