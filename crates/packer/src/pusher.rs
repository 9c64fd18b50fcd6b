//! Upload of a built bootstrap and blob to OSS
//!
//! Bootstraps are stored under their own file name, blobs under the hash the
//! builder recorded in `output.json`. Each kind lives beneath its configured
//! key prefix.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::prefix::PrefixStore;
use object_store::ObjectStore;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::{Artifact, BackendConfig};

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("output directory is required")]
    MissingOutputDir,
    #[error("output directory {} does not exist", .0.display())]
    OutputDirNotFound(PathBuf),
    #[error("blob manifest lists no blobs")]
    InvalidBlobManifest,
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode blob manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Files to push, relative to the artifact's output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub meta: String,
    pub blob: String,
}

/// Remote locations of the pushed files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResult {
    pub remote_meta: String,
    pub remote_blob: String,
}

#[derive(Debug)]
pub struct Pusher {
    artifact: Artifact,
    config: BackendConfig,
    meta_backend: Arc<dyn ObjectStore>,
    blob_backend: Arc<dyn ObjectStore>,
}

impl Pusher {
    /// Connect to the bucket described by `config`.
    pub fn new(artifact: Artifact, config: BackendConfig) -> Result<Self, PushError> {
        let bucket: Arc<dyn ObjectStore> = Arc::new(oss_bucket(&config)?);
        Ok(Self::with_bucket(artifact, config, bucket.clone(), bucket))
    }

    /// Push through caller-provided stores; keys are still placed under the
    /// configured prefixes.
    pub fn with_bucket(
        artifact: Artifact,
        config: BackendConfig,
        meta_bucket: Arc<dyn ObjectStore>,
        blob_bucket: Arc<dyn ObjectStore>,
    ) -> Self {
        let meta_backend = Arc::new(PrefixStore::new(meta_bucket, config.meta_prefix.as_str()));
        let blob_backend = Arc::new(PrefixStore::new(blob_bucket, config.blob_prefix.as_str()));
        Self {
            artifact,
            config,
            meta_backend,
            blob_backend,
        }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub async fn push(&self, req: &PushRequest) -> Result<PushResult, PushError> {
        info!("start to push meta and blob to remote backend");
        let blob_hash = self.artifact.blob_hash().await?;
        info!(hash = %blob_hash, "got blob hash");

        upload(
            &self.meta_backend,
            &req.meta,
            &self.artifact.bootstrap_path(&req.meta),
        )
        .await?;
        upload(
            &self.blob_backend,
            &blob_hash,
            &self.artifact.blob_file_path(&req.blob),
        )
        .await?;

        Ok(PushResult {
            remote_meta: self.config.remote_uri(&self.config.meta_prefix, &req.meta),
            remote_blob: self.config.remote_uri(&self.config.blob_prefix, &blob_hash),
        })
    }
}

async fn upload(store: &Arc<dyn ObjectStore>, key: &str, file: &Path) -> Result<(), PushError> {
    let io_err = |source| PushError::Io {
        path: file.to_path_buf(),
        source,
    };

    let mut reader = tokio::fs::File::open(file).await.map_err(io_err)?;
    let mut writer = BufWriter::new(store.clone(), key.into());
    let size = tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(io_err)?;
    writer.shutdown().await.map_err(io_err)?;

    info!(key, size, "uploaded object");
    Ok(())
}

/// S3-compatible client for an OSS bucket.
///
/// OSS only accepts virtual-hosted style requests, so the bucket goes into
/// the endpoint host.
fn oss_bucket(config: &BackendConfig) -> Result<object_store::aws::AmazonS3, PushError> {
    Ok(AmazonS3Builder::new()
        .with_endpoint(bucket_endpoint(&config.endpoint, &config.bucket_name))
        .with_virtual_hosted_style_request(true)
        .with_bucket_name(&config.bucket_name)
        .with_access_key_id(&config.access_key_id)
        .with_secret_access_key(&config.access_key_secret)
        .build()?)
}

fn bucket_endpoint(endpoint: &str, bucket: &str) -> String {
    let (scheme, host) = match endpoint.split_once("://") {
        Some((scheme, host)) => (scheme, host),
        None => ("https", endpoint),
    };
    format!("{}://{}.{}", scheme, bucket, host.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_endpoint() {
        assert_eq!(
            bucket_endpoint("oss-cn-hangzhou.aliyuncs.com", "b"),
            "https://b.oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(
            bucket_endpoint("http://localhost:9000/", "b"),
            "http://b.localhost:9000"
        );
    }

    #[test]
    fn test_real_backend_builds_without_network() {
        let temp = tempfile::tempdir().unwrap();
        let config = BackendConfig {
            endpoint: "mock.aliyuncs.com".to_string(),
            access_key_id: "id".to_string(),
            access_key_secret: "secret".to_string(),
            bucket_name: "testbucket".to_string(),
            ..Default::default()
        };
        let pusher = Pusher::new(Artifact::new(temp.path()).unwrap(), config).unwrap();
        assert_eq!(pusher.artifact().output_dir(), temp.path());
    }
}
