//! S3-compatible object store client.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::SdkConfig;
use tracing::{debug, info};
use tvid_models::AssetRef;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{move_file, remove_file};
use crate::store::{download_path, ArtifactStore};

/// Object store reachable through the S3 API (GCS interop, R2, S3).
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store").finish_non_exhaustive()
    }
}

impl S3Store {
    /// Create a client from configuration.
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        config.check()?;

        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(id, secret, None, None, "tvid-storage")),
            _ => {
                let shared: SdkConfig = aws_config::defaults(BehaviorVersion::latest()).load().await;
                Builder::from(&shared)
            }
        };

        builder = builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Create from `STORAGE_*` environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(&StorageConfig::from_env()?).await
    }

    /// Upload a file.
    pub async fn upload_file(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} to {}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}/{}", path.display(), bucket, key);
        Ok(())
    }

    /// Download an object to a file.
    pub async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()> {
        debug!("Downloading {}/{} to {}", bucket, key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(format!("{bucket}/{key}"))
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;

        info!("Downloaded {}/{} to {}", bucket, key, path.display());
        Ok(())
    }

    /// Delete an object.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        debug!("Deleting {}/{}", bucket, key);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for S3Store {
    async fn fetch(&self, source: &AssetRef, dest_dir: &Path) -> StorageResult<PathBuf> {
        match source {
            AssetRef::Local(path) if path.exists() => Ok(path.clone()),
            AssetRef::Local(path) => Err(StorageError::not_found(path.display().to_string())),
            AssetRef::Object { bucket, key, .. } => {
                let dest = download_path(dest_dir, key);
                self.download_file(bucket, key, &dest).await?;
                Ok(dest)
            }
        }
    }

    async fn put(
        &self,
        local: &Path,
        target: &AssetRef,
        content_type: &str,
    ) -> StorageResult<AssetRef> {
        match target {
            AssetRef::Local(path) => move_file(local, path).await?,
            AssetRef::Object { bucket, key, .. } => {
                self.upload_file(local, bucket, key, content_type).await?
            }
        }
        Ok(target.clone())
    }

    async fn delete(&self, target: &AssetRef) -> StorageResult<()> {
        match target {
            AssetRef::Local(path) => remove_file(path).await,
            AssetRef::Object { bucket, key, .. } => self.delete_object(bucket, key).await,
        }
    }
}
