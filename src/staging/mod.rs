//! Object staging for bulk loads
//!
//! The warehouse only ingests data through bulk-load statements reading from
//! addressable blob storage. A stager takes the encoded rows of one batch,
//! writes them under a fresh unique key and returns where the warehouse can
//! fetch them, plus the credentials it needs to do so.
//!
//! ## Stagers
//!
//! - [`LocalStager`] - files in a local directory, read by the embedded DuckDB warehouse
//! - [`S3Stager`] - objects in an S3 bucket, read by Redshift `COPY` (feature `s3`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use target_redshift::staging::{LocalStager, ObjectStager};
//!
//! let stager = LocalStager::new("/tmp/staging", "loads/")?;
//! let object = stager.stage(b"1,Tom\n".to_vec(), "cats__").await?;
//! println!("staged at {}", object.location);
//! ```

pub mod encode;
#[cfg(feature = "native-fs")]
mod local;
#[cfg(feature = "s3")]
mod s3;

use async_trait::async_trait;
use uuid::Uuid;

use crate::validation::ValidationError;

pub use encode::{NULL_MARKER, encode_rows};
#[cfg(feature = "native-fs")]
pub use local::LocalStager;
#[cfg(feature = "s3")]
pub use s3::{S3Stager, S3StagingConfig};

/// Error type for staging operations
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// Rows could not be encoded
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// Upload to blob storage failed
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Required staging configuration is missing or invalid
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type for staging operations
pub type StagingResult<T> = Result<T, StagingError>;

/// Transient credentials the warehouse uses to read staged objects
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AccessCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token;
        self
    }

    /// Credential string in the form accepted by `COPY ... CREDENTIALS`
    pub fn to_copy_credentials(&self) -> String {
        let mut credentials = format!(
            "aws_access_key_id={};aws_secret_access_key={}",
            self.access_key_id, self.secret_access_key
        );
        if let Some(token) = &self.session_token {
            credentials.push_str(";token=");
            credentials.push_str(token);
        }
        credentials
    }
}

impl std::fmt::Debug for AccessCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"****")
            .field("session_token", &self.session_token.as_ref().map(|_| "****"))
            .finish()
    }
}

/// A durably written object, ready to be bulk-loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    /// Bucket or directory holding the object
    pub container: String,
    /// Object key, unique per batch
    pub key: String,
    /// Address the warehouse reads from (`s3://bucket/key` or an absolute path)
    pub location: String,
}

/// Blob storage the warehouse can bulk-load from
#[async_trait(?Send)]
pub trait ObjectStager: Send + Sync {
    /// Durably write `body` under a fresh key starting with `key_prefix`
    ///
    /// The configured prefix of the stager is prepended to `key_prefix`, and a
    /// random UUID is appended, so a key is never reused.
    async fn stage(&self, body: Vec<u8>, key_prefix: &str) -> StagingResult<StagedObject>;

    /// Credentials to embed in the bulk-load statement, if the warehouse needs any
    fn credentials(&self) -> Option<AccessCredentials>;

    /// Stager type name ("local" or "s3")
    fn stager_type(&self) -> &'static str;
}

/// Build a unique object key: `<configured prefix><key prefix><uuid>`
pub fn object_key(configured_prefix: &str, key_prefix: &str) -> String {
    format!("{}{}{}", configured_prefix, key_prefix, Uuid::new_v4().simple())
}
