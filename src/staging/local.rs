//! Local directory stager
//!
//! Writes staged objects as files below a directory. Used with the embedded
//! DuckDB warehouse, which bulk-loads straight from the filesystem.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{AccessCredentials, ObjectStager, StagedObject, StagingError, StagingResult, object_key};

/// Stager writing objects into a local directory
#[derive(Debug, Clone)]
pub struct LocalStager {
    directory: PathBuf,
    key_prefix: String,
}

impl LocalStager {
    /// Create a stager rooted at `directory`
    ///
    /// The directory is made absolute so that staged locations can be
    /// dereferenced independently of the warehouse's working directory. It is
    /// created lazily on the first `stage` call.
    pub fn new(directory: impl AsRef<Path>, key_prefix: impl Into<String>) -> StagingResult<Self> {
        let directory = std::path::absolute(directory.as_ref())
            .map_err(|e| StagingError::IoError(format!("{}: {}", directory.as_ref().display(), e)))?;
        Ok(Self {
            directory,
            key_prefix: key_prefix.into(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait(?Send)]
impl ObjectStager for LocalStager {
    async fn stage(&self, body: Vec<u8>, key_prefix: &str) -> StagingResult<StagedObject> {
        let key = object_key(&self.key_prefix, key_prefix);
        let path = self.directory.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StagingError::IoError(format!("{}: {}", parent.display(), e)))?;
        }

        let size = body.len();
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StagingError::IoError(format!("{}: {}", path.display(), e)))?;

        debug!("Staged {} bytes at {}", size, path.display());

        Ok(StagedObject {
            container: self.directory.display().to_string(),
            key,
            location: path.display().to_string(),
        })
    }

    fn credentials(&self) -> Option<AccessCredentials> {
        None
    }

    fn stager_type(&self) -> &'static str {
        "local"
    }
}
