use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::PushError;

const OUTPUT_JSON: &str = "output.json";

/// Blob list written by the image builder next to its outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobManifest {
    #[serde(default)]
    pub blobs: Vec<String>,
}

/// Directory holding a build's bootstrap, blob and `output.json`
#[derive(Debug, Clone)]
pub struct Artifact {
    output_dir: PathBuf,
}

impl Artifact {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, PushError> {
        let output_dir = output_dir.into();
        if output_dir.as_os_str().is_empty() {
            return Err(PushError::MissingOutputDir);
        }
        if !output_dir.exists() {
            return Err(PushError::OutputDirNotFound(output_dir));
        }
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    pub fn bootstrap_path(&self, meta: &str) -> PathBuf {
        self.output_dir.join(meta)
    }

    pub fn blob_file_path(&self, blob: &str) -> PathBuf {
        self.output_dir.join(blob)
    }

    pub fn output_json_path(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_JSON)
    }

    pub async fn blob_manifest(&self) -> Result<BlobManifest, PushError> {
        let path = self.output_json_path();
        let content = tokio::fs::read(&path)
            .await
            .map_err(|source| PushError::Io { path, source })?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Hash of the first blob in the manifest; it names the blob object.
    pub async fn blob_hash(&self) -> Result<String, PushError> {
        self.blob_manifest()
            .await?
            .blobs
            .into_iter()
            .next()
            .ok_or(PushError::InvalidBlobManifest)
    }
}
