use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum BackendConfigError {
    #[error("failed to open backend config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode backend config {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Credentials and key layout of the OSS bucket artifacts are pushed to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket_name: String,
    /// Key prefix for bootstraps, stored without a trailing `/`
    pub meta_prefix: String,
    /// Key prefix for blobs, stored without a trailing `/`
    pub blob_prefix: String,
}

impl BackendConfig {
    pub fn load(path: &Path) -> Result<Self, BackendConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| BackendConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| BackendConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(content)?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.meta_prefix = self.meta_prefix.trim_end_matches('/').to_string();
        self.blob_prefix = self.blob_prefix.trim_end_matches('/').to_string();
        self
    }

    /// `oss://` URI of `key` stored under `prefix` in this bucket.
    pub fn remote_uri(&self, prefix: &str, key: &str) -> String {
        if prefix.is_empty() {
            format!("oss://{}/{}", self.bucket_name, key)
        } else {
            format!("oss://{}/{}/{}", self.bucket_name, prefix, key)
        }
    }
}
