//! S3 stager
//!
//! Uploads staged objects to an S3 bucket for Redshift `COPY`. The client is
//! built from the shared AWS configuration, with optional region, custom
//! endpoint and path-style addressing for S3-compatible stores.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use super::{AccessCredentials, ObjectStager, StagedObject, StagingError, StagingResult, object_key};
use crate::validation::ValidationError;

/// Connection settings for the S3 stager
#[derive(Debug, Clone, Default)]
pub struct S3StagingConfig {
    pub bucket: Option<String>,
    /// Prefix prepended to every object key
    pub key_prefix: String,
    pub region: Option<String>,
    /// Custom endpoint (S3-compatible stores)
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Static credentials; when absent the default provider chain is used
    pub credentials: Option<AccessCredentials>,
}

/// Stager writing objects into an S3 bucket
pub struct S3Stager {
    client: Client,
    bucket: String,
    key_prefix: String,
    credentials: Option<AccessCredentials>,
}

impl S3Stager {
    /// Build the client from the shared AWS configuration
    ///
    /// A missing bucket is a validation error.
    pub async fn new(config: S3StagingConfig) -> StagingResult<Self> {
        let bucket = config
            .bucket
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or(ValidationError::MissingConfig("s3 bucket"))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                credentials.session_token.clone(),
                None,
                "target-redshift",
            ));
        }
        let shared_config = loader.load().await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        let client = Client::from_conf(s3_builder.build());

        info!("S3 stager created for bucket: {}", bucket);

        Ok(Self {
            client,
            bucket,
            key_prefix: config.key_prefix,
            credentials: config.credentials,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait(?Send)]
impl ObjectStager for S3Stager {
    async fn stage(&self, body: Vec<u8>, key_prefix: &str) -> StagingResult<StagedObject> {
        let key = object_key(&self.key_prefix, key_prefix);
        let size = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StagingError::UploadFailed(format!("s3://{}/{}: {}", self.bucket, key, e)))?;

        debug!("Staged {} bytes at s3://{}/{}", size, self.bucket, key);

        Ok(StagedObject {
            container: self.bucket.clone(),
            location: format!("s3://{}/{}", self.bucket, key),
            key,
        })
    }

    fn credentials(&self) -> Option<AccessCredentials> {
        self.credentials.clone()
    }

    fn stager_type(&self) -> &'static str {
        "s3"
    }
}
